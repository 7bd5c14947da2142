//! crawld: local-first web-crawl job server

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crawld::config::Config;
use crawld::server::HttpServer;

#[derive(Parser)]
#[command(name = "crawld")]
#[command(about = "Local-first web-crawl job server with plugin pipelines")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "crawld.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the job server
    Serve {
        /// Override the configured listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => init(&path),
        Commands::Serve { listen } => {
            let mut config = if cli.config.exists() {
                Config::load(&cli.config)?
            } else {
                Config::default()
            };
            if let Some(listen) = listen {
                config.http.listen_addr = listen;
                config.validate()?;
            }
            config.logging.init();
            serve(config).await
        }
    }
}

fn init(path: &std::path::Path) -> Result<()> {
    let target = path.join("crawld.toml");
    if target.exists() {
        anyhow::bail!("{} already exists", target.display());
    }
    std::fs::write(&target, Config::default_toml())?;
    println!("Wrote {}", target.display());
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let app = crawld::bootstrap(&config).await?;
    let server = HttpServer::new(config.http.clone(), app.state.clone());

    // ctrl-c fans out through the shutdown channel to the HTTP server,
    // queue dispatchers, running jobs, and the webhook emitter
    let shutdown = app.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            let _ = shutdown.send(());
        }
    });

    server.run(app.shutdown.subscribe()).await
}

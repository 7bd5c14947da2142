//! HTTP API surface

pub mod handlers;
pub mod routes;
#[allow(clippy::module_inception)]
mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use server::HttpServer;

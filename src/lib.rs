//! crawld: a local-first web-crawl job server
//!
//! Clients submit crawl jobs against a domain and receive webhook callbacks
//! as the crawl progresses, ending with a structured analysis of every
//! visited page. The Playground surface runs plugin pipelines over arbitrary
//! inputs through the same job, queue, event, and webhook machinery.
//!
//! Core pieces:
//! - `job`: job data model, in-memory store, and the FIFO dispatch queue
//! - `events`: typed in-process pub/sub between engines and observers
//! - `plugin`: lifecycle-hook pipeline with per-plugin error isolation
//! - `crawler`: the crawl engine and its page driver, frontier, robots
//!   handling, and rate limiting
//! - `playground`: the input-pipeline engine
//! - `webhook`: filtered, retried event delivery to per-job URLs
//! - `server`: the axum HTTP API

pub mod bootstrap;
pub mod config;
pub mod crawler;
pub mod events;
pub mod job;
pub mod playground;
pub mod plugin;
pub mod server;
pub mod webhook;

pub use bootstrap::{bootstrap, bootstrap_with, App};
pub use config::Config;

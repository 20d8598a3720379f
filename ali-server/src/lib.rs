//! `ali-server` exposes legislative document retrieval and grounded chat over HTTP.
//! It is a thin axum layer over [`ali_rag::RetrievalService`].

pub mod config;
pub mod error;
pub mod protocol;
pub mod rate_limit;
pub mod server;
pub mod telemetry;

pub use config::ServerConfig;
pub use server::{AppState, app_router, run_server};

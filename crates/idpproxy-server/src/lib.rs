//! HTTP front end of the IdP proxy.
//!
//! Serves the metadata generation service under `/metadata` and the social
//! login endpoints under `/social/{service}`. The heavy lifting lives in
//! `idpproxy-auth`; this crate wires configuration, logging and routes.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod state;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{IdpProxyServer, ServerBuilder, build_app, spawn_session_purge};
pub use state::{AppState, StartupError};

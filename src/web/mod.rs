//! Health server (Axum).

pub mod router;
pub mod server;

pub use server::{run_server, HealthServerConfig};

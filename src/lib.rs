//! chatops library root.

pub mod alerts;
pub mod backends;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod insight;
pub mod logging;
pub mod telegram;
pub mod web;

pub use alerts::{AlertPoller, ChatSender};
pub use backends::{AdapterResult, BackendError, ErrorKind};
pub use cli::Cli;
pub use commands::{Dispatcher, Invocation, Registry, Responder};
pub use config::Settings;
pub use context::BackendContext;
pub use error::{Error, Result};
pub use web::run_server;

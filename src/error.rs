//! Error types for chatops.

use thiserror::Error;

use crate::backends::BackendError;
use crate::insight::ProviderError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(s: impl Into<String>) -> Self {
        Error::Config(s.into())
    }
}

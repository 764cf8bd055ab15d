//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The model API key is missing from the environment.
    #[error("no API key: set the {0} environment variable")]
    MissingApiKey(String),

    /// An error occurred in the runtime layer.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    /// A server could not be registered.
    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<runtime::BridgeError> for Error {
    fn from(err: runtime::BridgeError) -> Self {
        Self::Runtime(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

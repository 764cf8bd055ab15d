use thiserror::Error;

use crate::bridge::BridgeError;
use crate::model::ModelError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Mcp(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

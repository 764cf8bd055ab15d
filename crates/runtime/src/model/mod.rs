//! Model protocol types and backends.

pub mod backend;
pub mod errors;
pub mod types;

pub use backend::{OpenAiBackend, OpenAiBackendBuilder};
pub use errors::ModelError;
pub use types::{Backend, Message, ModelRequest, ModelResponse, Reply, Role, ToolCall, Usage};

//! Model backends.

mod openai;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};

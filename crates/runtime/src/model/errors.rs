use thiserror::Error;

/// Errors from model API calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never got a response.
    #[error("network: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("model api returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The response could not be understood.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

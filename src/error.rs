use thiserror::Error;

/// Fatal precondition violations. Data-quality problems inside otherwise
/// well-shaped input are recovered silently and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

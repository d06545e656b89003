//! Wire protocol error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Frame decode failed: {0}")]
    FrameDecode(String),

    #[error("Frame body is not valid UTF-8")]
    NonUtf8Body,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WireResult<T> = Result<T, WireError>;

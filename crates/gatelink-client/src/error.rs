//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Session error: {0}")]
    Session(#[from] gatelink_session::SessionError),
}

pub type AppResult<T> = Result<T, AppError>;

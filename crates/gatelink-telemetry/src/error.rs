//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    InitFailed(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

//! Gateway client application: configuration, token endpoint, demo binary.

pub mod config;
pub mod error;
pub mod token;

pub use config::{AuthConfig, ClientConfig, GatewayConfig, SessionTuning};
pub use error::{AppError, AppResult};
pub use token::RestTokenProvider;

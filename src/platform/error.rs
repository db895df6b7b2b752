//! Crate-wide error type.

use thiserror::Error;

pub type RehearseResult<T> = Result<T, RehearseError>;

#[derive(Debug, Error)]
pub enum RehearseError {
    /// The scenario file could not be parsed or violates the event schema.
    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    /// Harness setup failed (e.g. no subject registered for the command).
    #[error("harness error: {0}")]
    Harness(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

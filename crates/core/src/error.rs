//! Error types shared by the recommendation crates

use thiserror::Error;

/// Errors surfaced by the recommendation subsystem
///
/// Algorithm-level problems (cold start, untrained model, zero norms) never
/// show up here; they degrade to the popularity fallback instead. What is
/// left are failures of the collaborators around the algorithms.
#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecommenderError {
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        RecommenderError::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

impl From<config::ConfigError> for RecommenderError {
    fn from(err: config::ConfigError) -> Self {
        RecommenderError::ConfigurationError {
            message: err.to_string(),
            key: None,
        }
    }
}

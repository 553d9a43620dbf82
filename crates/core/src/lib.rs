//! # Film Recommendation Core
//!
//! Shared building blocks for the film recommendation engine.
//!
//! ## Modules
//!
//! - `models`: Interaction and item records read from the external stores
//! - `error`: Error types and handling
//! - `config`: Layered configuration loading and validation
//! - `telemetry`: Structured logging setup

pub mod config;
pub mod error;
pub mod models;
pub mod telemetry;

pub use config::{
    load_dotenv, EvaluationConfig, LogConfig, LogFormat, MatrixFactorizationConfig,
    NeighborhoodConfig, PopularityConfig, RecommenderConfig, StorageConfig,
};
pub use error::RecommenderError;
pub use models::{Interaction, Item, ItemId, UserId};
pub use telemetry::{init_logging, TelemetryError};

/// Result type alias for recommendation operations
pub type Result<T> = std::result::Result<T, RecommenderError>;

//! Recommendation engine configuration
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config/filmrec.{toml,yaml,json}` file, then environment variables with
//! the `FILMREC` prefix and `__` as the section separator.
//!
//! # Example
//!
//! ```bash
//! export FILMREC__MODEL__FACTORS="16"
//! export FILMREC__EVALUATION__SAMPLE_USERS="500"
//! export FILMREC__STORAGE__MODEL_PATH="/var/lib/filmrec/mf.bin"
//! ```

use crate::error::RecommenderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FILMREC";
const DEFAULT_CONFIG_FILE: &str = "config/filmrec";

/// Top-level configuration for the recommendation engine
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Matrix factorization hyperparameters
    pub model: MatrixFactorizationConfig,

    /// Neighborhood collaborative filtering settings
    pub neighborhood: NeighborhoodConfig,

    /// Popularity fallback settings
    pub popularity: PopularityConfig,

    /// Offline evaluation settings
    pub evaluation: EvaluationConfig,

    /// Model snapshot storage
    pub storage: StorageConfig,

    /// Logging output
    pub logging: LogConfig,
}

/// SGD matrix factorization hyperparameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatrixFactorizationConfig {
    /// Number of latent factors (k)
    pub factors: usize,
    /// Full passes over the training interactions
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 regularization (lambda)
    pub regularization: f64,
    /// Standard deviation of the Gaussian used to initialize factors
    pub init_std_dev: f64,
    /// Fixed RNG seed for reproducible training; random when absent
    pub seed: Option<u64>,
}

impl Default for MatrixFactorizationConfig {
    fn default() -> Self {
        Self {
            factors: 10,
            epochs: 20,
            learning_rate: 0.01,
            regularization: 0.02,
            init_std_dev: 0.1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeighborhoodConfig {
    /// Similar users consulted by user-based recommendations
    pub neighbor_count: usize,
    /// Similar users listed in a recommendation bundle
    pub similar_users_shown: usize,
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            neighbor_count: 20,
            similar_users_shown: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PopularityConfig {
    /// Fixed divisor turning like counts into display scores
    pub score_scale: f64,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self { score_scale: 100.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Upper bound on users evaluated per run
    pub sample_users: usize,
    /// Length of the recommendation list scored per user
    pub k: usize,
    /// SGD epochs used when retraining inside the evaluation loop
    pub epochs: usize,
    /// Seed for user sampling and factor initialization
    pub seed: Option<u64>,
    /// Where the JSON report is written
    pub report_path: PathBuf,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            sample_users: 200,
            k: 5,
            epochs: 10,
            seed: None,
            report_path: PathBuf::from("instance/recommendation_eval.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Binary matrix factorization snapshot
    pub model_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("instance/recommendation_mf.bin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level filter; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl RecommenderConfig {
    /// Load configuration from the default config file location and environment
    pub fn load() -> Result<Self, RecommenderError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, still honoring environment overrides
    pub fn load_from(path: &Path) -> Result<Self, RecommenderError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RecommenderError> {
        let model = &self.model;
        if model.factors == 0 {
            return Err(RecommenderError::config(
                "factors must be greater than 0",
                "model.factors",
            ));
        }
        if model.epochs == 0 {
            return Err(RecommenderError::config(
                "epochs must be greater than 0",
                "model.epochs",
            ));
        }
        if !(model.learning_rate.is_finite() && model.learning_rate > 0.0) {
            return Err(RecommenderError::config(
                format!("learning_rate must be positive, got {}", model.learning_rate),
                "model.learning_rate",
            ));
        }
        if !(model.regularization.is_finite() && model.regularization >= 0.0) {
            return Err(RecommenderError::config(
                format!(
                    "regularization cannot be negative, got {}",
                    model.regularization
                ),
                "model.regularization",
            ));
        }
        if !(model.init_std_dev.is_finite() && model.init_std_dev > 0.0) {
            return Err(RecommenderError::config(
                format!("init_std_dev must be positive, got {}", model.init_std_dev),
                "model.init_std_dev",
            ));
        }

        if self.neighborhood.neighbor_count == 0 {
            return Err(RecommenderError::config(
                "neighbor_count must be greater than 0",
                "neighborhood.neighbor_count",
            ));
        }

        if !(self.popularity.score_scale.is_finite() && self.popularity.score_scale > 0.0) {
            return Err(RecommenderError::config(
                "score_scale must be positive",
                "popularity.score_scale",
            ));
        }

        if self.evaluation.k == 0 {
            return Err(RecommenderError::config(
                "k must be greater than 0",
                "evaluation.k",
            ));
        }
        if self.evaluation.epochs == 0 {
            return Err(RecommenderError::config(
                "epochs must be greater than 0",
                "evaluation.epochs",
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(RecommenderError::config(
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_log_levels.join(", ")
                ),
                "logging.level",
            ));
        }

        Ok(())
    }
}

/// Load .env file if present
///
/// Missing files are ignored; other failures are reported on stderr because
/// logging is not initialized yet at this point.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RecommenderConfig::default();
        assert_eq!(config.model.factors, 10);
        assert_eq!(config.model.epochs, 20);
        assert!((config.model.learning_rate - 0.01).abs() < 1e-12);
        assert!((config.model.regularization - 0.02).abs() < 1e-12);
        assert_eq!(config.neighborhood.neighbor_count, 20);
        assert_eq!(config.evaluation.k, 5);
        assert_eq!(config.evaluation.sample_users, 200);
        assert!((config.popularity.score_scale - 100.0).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_factors() {
        let mut config = RecommenderConfig::default();
        config.model.factors = 0;

        match config.validate().unwrap_err() {
            RecommenderError::ConfigurationError { key, .. } => {
                assert_eq!(key.as_deref(), Some("model.factors"));
            }
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_validation_negative_learning_rate() {
        let mut config = RecommenderConfig::default();
        config.model.learning_rate = -0.5;
        assert!(config.validate().is_err());

        config.model.learning_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_k() {
        let mut config = RecommenderConfig::default();
        config.evaluation.k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = RecommenderConfig::default();
        config.logging.level = "verbose".to_string();

        match config.validate().unwrap_err() {
            RecommenderError::ConfigurationError { message, .. } => {
                assert!(message.contains("Invalid log level"));
            }
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[model]
factors = 16
seed = 42

[evaluation]
k = 10
report_path = "out/report.json"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = RecommenderConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model.factors, 16);
        assert_eq!(config.model.seed, Some(42));
        assert_eq!(config.model.epochs, 20);
        assert_eq!(config.evaluation.k, 10);
        assert_eq!(config.evaluation.report_path, PathBuf::from("out/report.json"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[model]\nepochs = 0").unwrap();

        assert!(RecommenderConfig::load_from(file.path()).is_err());
    }
}

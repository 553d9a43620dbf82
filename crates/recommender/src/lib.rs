//! Film recommendation engine
//!
//! Collaborative filtering over user-film interactions:
//! - user-based neighbors by cosine similarity of preference vectors
//! - item-based neighbors by Jaccard similarity of liking users
//! - matrix factorization trained with SGD, persisted as a snapshot
//!
//! Every path falls back to the most liked films when it has nothing to
//! say about a user. [`EvaluationHarness`] compares the three offline.

pub mod engine;
pub mod evaluation;
pub mod item_similarity;
pub mod matrix_factorization;
pub mod model_storage;
pub mod popularity;
pub mod preference;
pub mod store;
pub mod types;
pub mod user_similarity;

// Re-export key types
pub use engine::{EngineSnapshot, ModelSource, RecommendationEngine};
pub use evaluation::{AlgorithmMetrics, EvaluationHarness, EvaluationReport};
pub use item_similarity::{jaccard_similarity, ItemSimilarityIndex};
pub use matrix_factorization::{
    LatentFactors, MatrixFactorizationModel, ModelState, SgdTrainer, TrainingError, TrainingSet,
};
pub use model_storage::{ModelSnapshot, ModelStorage};
pub use popularity::PopularityFallback;
pub use preference::{PreferenceAggregator, PreferenceData, UserVector};
pub use store::{InMemoryStore, InteractionStore, ItemStore};
pub use types::*;
pub use user_similarity::{cosine_similarity, UserSimilarityIndex};

//! Matrix Factorization trained with Stochastic Gradient Descent
//!
//! Classic regularized funk-SVD: user factors P and item factors Q are
//! learned so that `dot(P[u], Q[i])` approximates the preference score.
//! Epochs walk the training interactions in retrieval order without
//! shuffling, so a fixed seed and a fixed input order reproduce a model
//! exactly.

use crate::model_storage::ModelStorage;
use crate::types::{sort_scored, ScoredItem};
use filmrec_core::{
    Interaction, ItemId, MatrixFactorizationConfig, RecommenderError, UserId,
};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use thiserror::Error;

/// Why a model ended up without usable factors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("no qualifying interactions to train on")]
    NoQualifyingInteractions,

    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    #[error("training diverged to non-finite factors at epoch {epoch}")]
    Diverged { epoch: usize },
}

/// Index-mapped training triples built from qualifying interactions
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
    /// (user_row, item_row, score) in interaction iteration order
    entries: Vec<(usize, usize, f64)>,
}

impl TrainingSet {
    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        let qualifying: Vec<(&Interaction, f64)> = interactions
            .iter()
            .map(|interaction| (interaction, interaction.preference_score()))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        let user_ids: Vec<UserId> = qualifying
            .iter()
            .map(|(i, _)| i.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let item_ids: Vec<ItemId> = qualifying
            .iter()
            .map(|(i, _)| i.item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let user_index = index_map(&user_ids);
        let item_index = index_map(&item_ids);

        let entries = qualifying
            .iter()
            .map(|(i, score)| (user_index[&i.user_id], item_index[&i.item_id], *score))
            .collect();

        Self {
            user_ids,
            item_ids,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }
}

fn index_map(ids: &[i64]) -> HashMap<i64, usize> {
    ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect()
}

/// Trained user and item factor matrices with their id mappings
///
/// Row `i` of the user matrix belongs to `user_ids[i]`, likewise for items.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentFactors {
    user_factors: Array2<f64>,
    item_factors: Array2<f64>,
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
    user_index: HashMap<UserId, usize>,
    item_index: HashMap<ItemId, usize>,
}

impl LatentFactors {
    /// Assemble factors, checking that every row has exactly one id
    pub fn from_parts(
        user_factors: Array2<f64>,
        item_factors: Array2<f64>,
        user_ids: Vec<UserId>,
        item_ids: Vec<ItemId>,
    ) -> Result<Self, RecommenderError> {
        if user_factors.nrows() != user_ids.len() {
            return Err(RecommenderError::Snapshot(format!(
                "user factor rows ({}) do not match user ids ({})",
                user_factors.nrows(),
                user_ids.len()
            )));
        }
        if item_factors.nrows() != item_ids.len() {
            return Err(RecommenderError::Snapshot(format!(
                "item factor rows ({}) do not match item ids ({})",
                item_factors.nrows(),
                item_ids.len()
            )));
        }
        if user_factors.ncols() != item_factors.ncols() {
            return Err(RecommenderError::Snapshot(format!(
                "user factors have k={} but item factors have k={}",
                user_factors.ncols(),
                item_factors.ncols()
            )));
        }

        let user_index = index_map(&user_ids);
        let item_index = index_map(&item_ids);
        if user_index.len() != user_ids.len() || item_index.len() != item_ids.len() {
            return Err(RecommenderError::Snapshot(
                "duplicate ids in factor mapping".to_string(),
            ));
        }

        Ok(Self {
            user_factors,
            item_factors,
            user_ids,
            item_ids,
            user_index,
            item_index,
        })
    }

    /// Number of latent factors (k)
    pub fn factors(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn user_factors(&self) -> &Array2<f64> {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &Array2<f64> {
        &self.item_factors
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    /// Predict affinity for a user-item pair seen during training
    pub fn predict(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        let user_idx = *self.user_index.get(&user_id)?;
        let item_idx = *self.item_index.get(&item_id)?;
        Some(
            self.user_factors
                .row(user_idx)
                .dot(&self.item_factors.row(item_idx)),
        )
    }

    pub fn user_embedding(&self, user_id: UserId) -> Option<Vec<f64>> {
        let idx = *self.user_index.get(&user_id)?;
        Some(self.user_factors.row(idx).to_vec())
    }

    pub fn item_embedding(&self, item_id: ItemId) -> Option<Vec<f64>> {
        let idx = *self.item_index.get(&item_id)?;
        Some(self.item_factors.row(idx).to_vec())
    }

    /// Score every known item for a user, ranked descending
    pub fn score_items(&self, user_id: UserId) -> Option<Vec<ScoredItem>> {
        let user_idx = *self.user_index.get(&user_id)?;
        let scores: Array1<f64> = self.item_factors.dot(&self.user_factors.row(user_idx));

        let mut ranked: Vec<ScoredItem> = self
            .item_ids
            .iter()
            .zip(scores.iter())
            .map(|(&item_id, &score)| ScoredItem { item_id, score })
            .collect();
        sort_scored(&mut ranked);
        Some(ranked)
    }

    fn all_finite(&self) -> bool {
        self.user_factors.iter().all(|v| v.is_finite())
            && self.item_factors.iter().all(|v| v.is_finite())
    }
}

/// SGD trainer for latent factors
pub struct SgdTrainer {
    config: MatrixFactorizationConfig,
}

impl SgdTrainer {
    pub fn new(config: MatrixFactorizationConfig) -> Self {
        Self { config }
    }

    /// Train with the configured seed, or OS entropy when none is set
    pub fn fit(&self, training: &TrainingSet) -> Result<LatentFactors, TrainingError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.fit_with_rng(training, &mut rng)
    }

    pub fn fit_with_rng<R: Rng>(
        &self,
        training: &TrainingSet,
        rng: &mut R,
    ) -> Result<LatentFactors, TrainingError> {
        if training.is_empty() {
            return Err(TrainingError::NoQualifyingInteractions);
        }

        let k = self.config.factors;
        let lr = self.config.learning_rate;
        let reg = self.config.regularization;
        if k == 0 {
            return Err(TrainingError::InvalidHyperparameters(
                "factors must be greater than 0".to_string(),
            ));
        }

        let normal = Normal::new(0.0, self.config.init_std_dev)
            .map_err(|e| TrainingError::InvalidHyperparameters(e.to_string()))?;

        let mut user_factors =
            Array2::<f64>::from_shape_fn((training.num_users(), k), |_| normal.sample(&mut *rng));
        let mut item_factors =
            Array2::<f64>::from_shape_fn((training.num_items(), k), |_| normal.sample(&mut *rng));

        let start = Instant::now();
        for epoch in 0..self.config.epochs {
            for &(u, i, score) in &training.entries {
                let q_i = item_factors.row(i).to_owned();
                let prediction = user_factors.row(u).dot(&q_i);
                let error = score - prediction;

                // P[u] first; the Q[i] step then sees the updated P[u].
                let p_step = &q_i * error - &user_factors.row(u) * reg;
                user_factors.row_mut(u).scaled_add(lr, &p_step);

                let q_step = &user_factors.row(u) * error - &q_i * reg;
                item_factors.row_mut(i).scaled_add(lr, &q_step);
            }

            let loss = Self::compute_loss(training, &user_factors, &item_factors);
            if !loss.is_finite() {
                tracing::warn!(epoch, "SGD training diverged");
                return Err(TrainingError::Diverged { epoch });
            }
            tracing::debug!("SGD epoch {}: loss = {:.4}", epoch, loss);
        }

        let factors = LatentFactors::from_parts(
            user_factors,
            item_factors,
            training.user_ids.clone(),
            training.item_ids.clone(),
        )
        .map_err(|e| TrainingError::InvalidHyperparameters(e.to_string()))?;

        if !factors.all_finite() {
            return Err(TrainingError::Diverged {
                epoch: self.config.epochs,
            });
        }

        tracing::debug!(
            users = training.num_users(),
            items = training.num_items(),
            interactions = training.len(),
            factors = k,
            epochs = self.config.epochs,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Trained matrix factorization model"
        );

        Ok(factors)
    }

    /// Mean squared reconstruction error over the training triples
    fn compute_loss(
        training: &TrainingSet,
        user_factors: &Array2<f64>,
        item_factors: &Array2<f64>,
    ) -> f64 {
        if training.is_empty() {
            return 0.0;
        }
        let total: f64 = training
            .entries
            .iter()
            .map(|&(u, i, score)| {
                let prediction = dot(user_factors.row(u), item_factors.row(i));
                (score - prediction).powi(2)
            })
            .sum();
        total / training.len() as f64
    }
}

fn dot(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.dot(&b)
}

/// Lifecycle state of the model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    Uninitialized,
    Trained(LatentFactors),
    Untrained(TrainingError),
}

/// Matrix factorization recommender with snapshot persistence
#[derive(Debug, Clone)]
pub struct MatrixFactorizationModel {
    config: MatrixFactorizationConfig,
    state: ModelState,
}

impl MatrixFactorizationModel {
    pub fn new(config: MatrixFactorizationConfig) -> Self {
        Self {
            config,
            state: ModelState::Uninitialized,
        }
    }

    pub fn from_factors(config: MatrixFactorizationConfig, factors: LatentFactors) -> Self {
        Self {
            config,
            state: ModelState::Trained(factors),
        }
    }

    /// Load a persisted snapshot, or train from scratch when none is usable
    ///
    /// A missing snapshot triggers training quietly; an unreadable one is
    /// logged before training.
    pub fn load_or_train(
        config: MatrixFactorizationConfig,
        storage: &ModelStorage,
        interactions: &[Interaction],
    ) -> Self {
        match storage.load() {
            Ok(Some(factors)) => {
                if factors.factors() != config.factors {
                    tracing::warn!(
                        snapshot_factors = factors.factors(),
                        configured_factors = config.factors,
                        "Loaded snapshot uses a different factor count than configured"
                    );
                }
                tracing::info!(
                    users = factors.user_ids().len(),
                    items = factors.item_ids().len(),
                    "Loaded matrix factorization snapshot"
                );
                return Self::from_factors(config, factors);
            }
            Ok(None) => {
                tracing::info!(
                    path = %storage.path().display(),
                    "No model snapshot found, training from scratch"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %storage.path().display(),
                    error = %e,
                    "Model snapshot unreadable, training from scratch"
                );
            }
        }

        Self::train(config, Some(storage), interactions)
    }

    /// Train a fresh model; persist it when storage is given
    ///
    /// Persistence failures are logged and leave the in-memory model usable.
    pub fn train(
        config: MatrixFactorizationConfig,
        storage: Option<&ModelStorage>,
        interactions: &[Interaction],
    ) -> Self {
        let training = TrainingSet::from_interactions(interactions);
        let state = match SgdTrainer::new(config.clone()).fit(&training) {
            Ok(factors) => {
                if let Some(storage) = storage {
                    if let Err(e) = storage.save(&factors) {
                        tracing::warn!(
                            path = %storage.path().display(),
                            error = %e,
                            "Failed to persist model snapshot; keeping in-memory model"
                        );
                    }
                }
                ModelState::Trained(factors)
            }
            Err(e) => {
                tracing::warn!(reason = %e, "Matrix factorization left untrained");
                ModelState::Untrained(e)
            }
        };

        Self { config, state }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn config(&self) -> &MatrixFactorizationConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ModelState::Trained(_))
    }

    pub fn factors(&self) -> Option<&LatentFactors> {
        match &self.state {
            ModelState::Trained(factors) => Some(factors),
            _ => None,
        }
    }

    pub fn predict(&self, user_id: UserId, item_id: ItemId) -> Option<f64> {
        self.factors()?.predict(user_id, item_id)
    }

    /// Top unseen items by predicted affinity
    ///
    /// Empty when the model is not trained or the user was not part of
    /// training.
    pub fn recommend(
        &self,
        user_id: UserId,
        exclude: &HashSet<ItemId>,
        top_n: usize,
    ) -> Vec<ScoredItem> {
        let Some(ranked) = self.factors().and_then(|f| f.score_items(user_id)) else {
            return Vec::new();
        };

        ranked
            .into_iter()
            .filter(|scored| !exclude.contains(&scored.item_id))
            .take(top_n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(factors: usize, epochs: usize) -> MatrixFactorizationConfig {
        MatrixFactorizationConfig {
            factors,
            epochs,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn interactions() -> Vec<Interaction> {
        let now = Utc::now();
        vec![
            Interaction::new(2, 20, now).with_like().with_rating(5),
            Interaction::new(1, 10, now).with_like(),
            Interaction::new(1, 20, now).with_rating(4),
            Interaction::new(2, 30, now).with_rating(3),
            Interaction::new(3, 10, now),
        ]
    }

    #[test]
    fn test_training_set_sorted_ids_and_order() {
        let set = TrainingSet::from_interactions(&interactions());

        assert_eq!(set.user_ids, vec![1, 2]);
        assert_eq!(set.item_ids, vec![10, 20, 30]);
        assert_eq!(set.len(), 4);
        // Iteration order is preserved: first entry is user 2 / item 20 / score 8.
        assert_eq!(set.entries[0], (1, 1, 8.0));
    }

    #[test]
    fn test_fit_shapes() {
        let set = TrainingSet::from_interactions(&interactions());
        let factors = SgdTrainer::new(config(4, 5)).fit(&set).unwrap();

        assert_eq!(factors.user_factors().nrows(), 2);
        assert_eq!(factors.user_factors().ncols(), 4);
        assert_eq!(factors.item_factors().nrows(), 3);
        assert_eq!(factors.factors(), 4);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let set = TrainingSet::from_interactions(&interactions());
        let a = SgdTrainer::new(config(6, 10)).fit(&set).unwrap();
        let b = SgdTrainer::new(config(6, 10)).fit(&set).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_training_reduces_loss() {
        let set = TrainingSet::from_interactions(&interactions());
        let mut rng = StdRng::seed_from_u64(11);
        let short = SgdTrainer::new(config(8, 1))
            .fit_with_rng(&set, &mut rng)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let long = SgdTrainer::new(config(8, 300))
            .fit_with_rng(&set, &mut rng)
            .unwrap();

        let short_loss =
            SgdTrainer::compute_loss(&set, short.user_factors(), short.item_factors());
        let long_loss = SgdTrainer::compute_loss(&set, long.user_factors(), long.item_factors());
        assert!(long_loss < short_loss);
    }

    #[test]
    fn test_empty_training_set_is_untrained() {
        let now = Utc::now();
        let model = MatrixFactorizationModel::train(
            config(4, 5),
            None,
            &[Interaction::new(1, 1, now)],
        );

        assert_eq!(
            model.state(),
            &ModelState::Untrained(TrainingError::NoQualifyingInteractions)
        );
        assert!(model.recommend(1, &HashSet::new(), 5).is_empty());
    }

    #[test]
    fn test_divergence_is_untrained() {
        let mut cfg = config(4, 50);
        cfg.learning_rate = 1e6;
        let model = MatrixFactorizationModel::train(cfg, None, &interactions());

        assert!(matches!(
            model.state(),
            ModelState::Untrained(TrainingError::Diverged { .. })
        ));
    }

    #[test]
    fn test_recommend_excludes_and_handles_unknown_user() {
        let model = MatrixFactorizationModel::train(config(4, 20), None, &interactions());
        assert!(model.is_trained());

        let exclude: HashSet<ItemId> = [10, 20].into_iter().collect();
        let recs = model.recommend(1, &exclude, 10);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item_id, 30);

        assert!(model.recommend(999, &HashSet::new(), 10).is_empty());
    }

    #[test]
    fn test_predict_and_embeddings() {
        let model = MatrixFactorizationModel::train(config(4, 20), None, &interactions());
        let factors = model.factors().unwrap();

        let user = factors.user_embedding(1).unwrap();
        let item = factors.item_embedding(20).unwrap();
        let expected: f64 = user.iter().zip(item.iter()).map(|(a, b)| a * b).sum();
        assert!((model.predict(1, 20).unwrap() - expected).abs() < 1e-12);

        assert!(model.predict(999, 20).is_none());
        assert!(model.predict(1, 999).is_none());
    }

    #[test]
    fn test_from_parts_rejects_mismatched_rows() {
        let result = LatentFactors::from_parts(
            Array2::zeros((2, 3)),
            Array2::zeros((1, 3)),
            vec![1],
            vec![10],
        );
        assert!(result.is_err());

        let result = LatentFactors::from_parts(
            Array2::zeros((1, 3)),
            Array2::zeros((1, 4)),
            vec![1],
            vec![10],
        );
        assert!(result.is_err());
    }
}

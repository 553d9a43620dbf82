//! Recommendation engine
//!
//! Serves user-based, item-based and matrix factorization recommendations
//! from one immutable [`EngineSnapshot`]. `reload()` and `retrain()` build a
//! complete new snapshot and swap it in; readers holding the previous
//! `Arc` keep a consistent view until they drop it.

use crate::item_similarity::ItemSimilarityIndex;
use crate::matrix_factorization::MatrixFactorizationModel;
use crate::model_storage::ModelStorage;
use crate::popularity::PopularityFallback;
use crate::preference::{PreferenceAggregator, PreferenceData};
use crate::store::{InteractionStore, ItemStore};
use crate::types::{
    Algorithm, Recommendation, RecommendationBundle, RecommendationSource, ScoredItem, SimilarUser,
};
use crate::user_similarity::UserSimilarityIndex;
use chrono::{DateTime, Utc};
use filmrec_core::{
    Interaction, ItemId, MatrixFactorizationConfig, RecommenderConfig, Result, UserId,
};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// How the matrix factorization model of a new snapshot is obtained
#[derive(Debug, Clone, Copy)]
pub enum ModelSource<'a> {
    /// Use the persisted snapshot when readable, otherwise train and persist
    LoadOrTrain(&'a ModelStorage),
    /// Always train; persist only when storage is given
    Train(Option<&'a ModelStorage>),
}

/// Immutable, fully built recommendation state
pub struct EngineSnapshot {
    preferences: Arc<PreferenceData>,
    user_index: UserSimilarityIndex,
    item_index: ItemSimilarityIndex,
    model: MatrixFactorizationModel,
    built_at: DateTime<Utc>,
}

impl EngineSnapshot {
    pub fn build(
        model_config: &MatrixFactorizationConfig,
        neighbor_count: usize,
        interactions: &[Interaction],
        source: ModelSource<'_>,
    ) -> Self {
        let start = Instant::now();
        let preferences = Arc::new(PreferenceAggregator::aggregate(interactions));
        let user_index = UserSimilarityIndex::build(Arc::clone(&preferences), neighbor_count);
        let item_index = ItemSimilarityIndex::build(Arc::clone(&preferences));

        let model = match source {
            ModelSource::LoadOrTrain(storage) => {
                MatrixFactorizationModel::load_or_train(model_config.clone(), storage, interactions)
            }
            ModelSource::Train(storage) => {
                MatrixFactorizationModel::train(model_config.clone(), storage, interactions)
            }
        };

        tracing::debug!(
            users = preferences.user_count(),
            items = preferences.item_count(),
            mf_trained = model.is_trained(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built recommendation snapshot"
        );

        Self {
            preferences,
            user_index,
            item_index,
            model,
            built_at: Utc::now(),
        }
    }

    /// Snapshot with no data and an uninitialized model
    pub fn empty(model_config: &MatrixFactorizationConfig, neighbor_count: usize) -> Self {
        let preferences = Arc::new(PreferenceData::default());
        Self {
            user_index: UserSimilarityIndex::build(Arc::clone(&preferences), neighbor_count),
            item_index: ItemSimilarityIndex::build(Arc::clone(&preferences)),
            preferences,
            model: MatrixFactorizationModel::new(model_config.clone()),
            built_at: Utc::now(),
        }
    }

    pub fn preferences(&self) -> &PreferenceData {
        &self.preferences
    }

    pub fn user_index(&self) -> &UserSimilarityIndex {
        &self.user_index
    }

    pub fn item_index(&self) -> &ItemSimilarityIndex {
        &self.item_index
    }

    pub fn model(&self) -> &MatrixFactorizationModel {
        &self.model
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Raw ranked candidates from one algorithm, without any fallback
    pub fn candidates(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        exclude: &HashSet<ItemId>,
        top_n: usize,
    ) -> Vec<ScoredItem> {
        match algorithm {
            Algorithm::UserBased => self.user_index.recommend(user_id, exclude, top_n),
            Algorithm::ItemBased => self.item_index.recommend(user_id, exclude, top_n),
            Algorithm::MatrixFactorization => self.model.recommend(user_id, exclude, top_n),
        }
    }
}

/// Recommendation service over read-only interaction and item stores
pub struct RecommendationEngine {
    config: RecommenderConfig,
    interactions: Arc<dyn InteractionStore>,
    items: Arc<dyn ItemStore>,
    storage: ModelStorage,
    popularity: PopularityFallback,
    snapshot: RwLock<Arc<EngineSnapshot>>,
}

impl RecommendationEngine {
    /// Create an engine with an empty snapshot; call `reload()` to build one
    pub fn new(
        config: RecommenderConfig,
        interactions: Arc<dyn InteractionStore>,
        items: Arc<dyn ItemStore>,
    ) -> Self {
        let storage = ModelStorage::new(config.storage.model_path.clone());
        let popularity = PopularityFallback::new(&config.popularity);
        let snapshot = EngineSnapshot::empty(&config.model, config.neighborhood.neighbor_count);

        Self {
            config,
            interactions,
            items,
            storage,
            popularity,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Create an engine and build its first snapshot
    pub fn open(
        config: RecommenderConfig,
        interactions: Arc<dyn InteractionStore>,
        items: Arc<dyn ItemStore>,
    ) -> Result<Self> {
        let engine = Self::new(config, interactions, items);
        engine.reload()?;
        Ok(engine)
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn storage(&self) -> &ModelStorage {
        &self.storage
    }

    /// Rebuild the similarity indices and load (or train) the model
    ///
    /// Concurrent `reload()`/`retrain()` calls are last-writer-wins: the
    /// snapshot that finishes building last is served, even if it read an
    /// older view of the interaction store.
    pub fn reload(&self) -> Result<()> {
        self.rebuild(ModelSource::LoadOrTrain(&self.storage))
    }

    /// Rebuild the similarity indices and train the model from scratch
    ///
    /// Same last-writer-wins behavior as `reload()`.
    pub fn retrain(&self) -> Result<()> {
        self.rebuild(ModelSource::Train(Some(&self.storage)))
    }

    fn rebuild(&self, source: ModelSource<'_>) -> Result<()> {
        let interactions = self.interactions.all_interactions()?;
        let snapshot = EngineSnapshot::build(
            &self.config.model,
            self.config.neighborhood.neighbor_count,
            &interactions,
            source,
        );

        tracing::info!(
            users = snapshot.preferences().user_count(),
            items = snapshot.preferences().item_count(),
            mf_trained = snapshot.model().is_trained(),
            "Recommendation snapshot ready"
        );

        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
        Ok(())
    }

    /// Current snapshot; stays valid across concurrent reloads
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Top-N recommendations for a user
    ///
    /// Users without a qualifying interaction, and algorithms that produce
    /// no candidates, are served the popularity list instead. Items the user
    /// already interacted with are never returned.
    pub fn recommend(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let history = self.interactions.interactions_for_user(user_id)?;
        let seen: HashSet<ItemId> = history.iter().map(|i| i.item_id).collect();

        if !history.iter().any(Interaction::is_qualifying) {
            tracing::debug!(user_id, %algorithm, "No qualifying history, using popularity");
            return self.popularity.top_popular_excluding(self.items.as_ref(), &seen, top_n);
        }

        let snapshot = self.snapshot();
        let candidates = snapshot.candidates(user_id, algorithm, &seen, top_n);
        if candidates.is_empty() {
            tracing::debug!(user_id, %algorithm, "No candidates, using popularity");
            return self.popularity.top_popular_excluding(self.items.as_ref(), &seen, top_n);
        }

        let source = RecommendationSource::from(algorithm);
        let mut recommendations = Vec::with_capacity(candidates.len());
        for scored in candidates {
            match self.items.item(scored.item_id)? {
                Some(item) => recommendations.push(Recommendation {
                    item,
                    score: scored.score,
                    source,
                }),
                None => tracing::debug!(item_id = scored.item_id, "Skipping item missing from store"),
            }
        }

        if recommendations.is_empty() {
            return self.popularity.top_popular_excluding(self.items.as_ref(), &seen, top_n);
        }

        Ok(recommendations)
    }

    /// Recommendations plus the context shown alongside them
    pub fn recommendation_bundle(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        top_n: usize,
    ) -> Result<RecommendationBundle> {
        let recommendations = self.recommend(user_id, algorithm, top_n)?;
        let snapshot = self.snapshot();
        let preferences = snapshot.preferences();

        Ok(RecommendationBundle {
            user_id,
            algorithm,
            recommendations,
            similar_users: snapshot
                .user_index()
                .similar_users_detailed(user_id, self.config.neighborhood.similar_users_shown),
            total_users: preferences.user_count(),
            user_interaction_count: preferences.user_vector(user_id).map_or(0, |v| v.len()),
        })
    }

    pub fn similar_users(&self, user_id: UserId, top_n: usize) -> Vec<SimilarUser> {
        self.snapshot()
            .user_index()
            .similar_users_detailed(user_id, top_n)
    }

    /// Items most often liked by the same users, resolved through the item store
    pub fn similar_items(&self, item_id: ItemId, top_n: usize) -> Result<Vec<Recommendation>> {
        let snapshot = self.snapshot();
        let mut similar = Vec::new();
        for (other_id, similarity) in snapshot.item_index().similar_items(item_id, top_n) {
            if let Some(item) = self.items.item(other_id)? {
                similar.push(Recommendation {
                    item,
                    score: similarity,
                    source: RecommendationSource::ItemBased,
                });
            }
        }
        Ok(similar)
    }
}

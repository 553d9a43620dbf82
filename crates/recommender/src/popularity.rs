//! Popularity fallback
//!
//! Serves the most liked films whenever a personalized path has nothing
//! to offer a user.

use crate::store::ItemStore;
use crate::types::{Recommendation, RecommendationSource};
use filmrec_core::{ItemId, PopularityConfig, Result};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct PopularityFallback {
    score_scale: f64,
}

impl PopularityFallback {
    pub fn new(config: &PopularityConfig) -> Self {
        Self {
            score_scale: config.score_scale,
        }
    }

    /// Most liked items, ties by ascending id, scored `like_count / score_scale`
    pub fn top_popular(&self, items: &dyn ItemStore, top_n: usize) -> Result<Vec<Recommendation>> {
        self.top_popular_excluding(items, &HashSet::new(), top_n)
    }

    /// Like `top_popular`, skipping items in `exclude`
    pub fn top_popular_excluding(
        &self,
        items: &dyn ItemStore,
        exclude: &HashSet<ItemId>,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        if top_n == 0 {
            return Ok(Vec::new());
        }

        let mut popular = items.most_liked(top_n.saturating_add(exclude.len()))?;
        popular.retain(|item| !exclude.contains(&item.id));
        popular.sort_by(|a, b| b.like_count.cmp(&a.like_count).then(a.id.cmp(&b.id)));
        popular.truncate(top_n);

        tracing::debug!(count = popular.len(), "Serving popularity fallback");

        Ok(popular
            .into_iter()
            .map(|item| Recommendation {
                score: f64::from(item.like_count) / self.score_scale,
                item,
                source: RecommendationSource::Popularity,
            })
            .collect())
    }
}

impl Default for PopularityFallback {
    fn default() -> Self {
        Self::new(&PopularityConfig::default())
    }
}

//! Item-based collaborative filtering
//!
//! Jaccard similarity between the sets of users who positively interacted
//! with each item. Unlike the user-based path, recommendation scores here
//! are plain weighted sums with no normalization step.

use crate::preference::PreferenceData;
use crate::types::{by_similarity_desc, ScoreAccumulator, ScoredItem};
use filmrec_core::{ItemId, UserId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// `|A ∩ B| / |A ∪ B|`, zero for an empty union
pub fn jaccard_similarity(a: &HashSet<UserId>, b: &HashSet<UserId>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|user| large.contains(user)).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Precomputed item-item similarity table
pub struct ItemSimilarityIndex {
    preferences: Arc<PreferenceData>,
    /// Positive neighbors per item, most similar first
    neighbors: HashMap<ItemId, Vec<(ItemId, f64)>>,
}

impl ItemSimilarityIndex {
    pub fn build(preferences: Arc<PreferenceData>) -> Self {
        let start = Instant::now();
        let items = preferences.sorted_item_ids();
        let sets = preferences.item_user_sets();

        let neighbors: HashMap<ItemId, Vec<(ItemId, f64)>> = items
            .par_iter()
            .map(|&item_id| {
                let users = &sets[&item_id];
                let mut row: Vec<(ItemId, f64)> = items
                    .iter()
                    .filter(|&&other_id| other_id != item_id)
                    .filter_map(|&other_id| {
                        let similarity = jaccard_similarity(users, &sets[&other_id]);
                        (similarity > 0.0).then_some((other_id, similarity))
                    })
                    .collect();
                row.sort_by(by_similarity_desc);
                (item_id, row)
            })
            .collect();

        tracing::debug!(
            items = items.len(),
            pairs = neighbors.values().map(Vec::len).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built item similarity index"
        );

        Self {
            preferences,
            neighbors,
        }
    }

    pub fn similarity(&self, a: ItemId, b: ItemId) -> f64 {
        if a == b {
            return 0.0;
        }
        match (self.preferences.item_users(a), self.preferences.item_users(b)) {
            (Some(users_a), Some(users_b)) => jaccard_similarity(users_a, users_b),
            _ => 0.0,
        }
    }

    /// Items most often co-liked with `item_id`
    pub fn similar_items(&self, item_id: ItemId, top_n: usize) -> Vec<(ItemId, f64)> {
        self.neighbors
            .get(&item_id)
            .map(|row| row.iter().take(top_n).copied().collect())
            .unwrap_or_default()
    }

    /// Score items similar to what the user already liked
    ///
    /// `score[other] += similarity(item, other) · user_score(item)` over all
    /// of the user's items. Empty when the user is unknown or nothing
    /// qualifies.
    pub fn recommend(
        &self,
        user_id: UserId,
        exclude: &HashSet<ItemId>,
        top_n: usize,
    ) -> Vec<ScoredItem> {
        let Some(own) = self.preferences.user_vector(user_id) else {
            return Vec::new();
        };

        let mut scores = ScoreAccumulator::new();
        for (item_id, user_score) in own.iter() {
            let Some(row) = self.neighbors.get(&item_id) else {
                continue;
            };
            for &(other_id, similarity) in row {
                if own.contains(other_id) || exclude.contains(&other_id) {
                    continue;
                }
                scores.add(other_id, similarity * user_score);
            }
        }

        scores.into_ranked(top_n)
    }

    pub fn item_count(&self) -> usize {
        self.neighbors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::PreferenceAggregator;
    use chrono::Utc;
    use filmrec_core::Interaction;

    fn set(users: &[UserId]) -> HashSet<UserId> {
        users.iter().copied().collect()
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert_eq!(jaccard_similarity(&set(&[1, 2, 3]), &set(&[1, 2, 3])), 1.0);
        assert_eq!(jaccard_similarity(&set(&[1, 2]), &set(&[3, 4])), 0.0);
        assert_eq!(jaccard_similarity(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap_is_symmetric() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4, 5]);
        assert!((jaccard_similarity(&a, &b) - 2.0 / 5.0).abs() < 1e-12);
        assert_eq!(jaccard_similarity(&a, &b), jaccard_similarity(&b, &a));
    }

    #[test]
    fn test_recommend_weights_by_user_score_without_normalizing() {
        let now = Utc::now();
        let interactions = vec![
            // user 1 rated item 10 with 4
            Interaction::new(1, 10, now).with_rating(4),
            // users 2 and 3 connect item 10 to 11, only user 3 to 12
            Interaction::new(2, 10, now).with_like(),
            Interaction::new(2, 11, now).with_like(),
            Interaction::new(3, 10, now).with_like(),
            Interaction::new(3, 11, now).with_like(),
            Interaction::new(3, 12, now).with_like(),
        ];
        let index =
            ItemSimilarityIndex::build(Arc::new(PreferenceAggregator::aggregate(&interactions)));

        let recs = index.recommend(1, &HashSet::new(), 10);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item_id, 11);
        assert_eq!(recs[1].item_id, 12);

        let sim_11 = index.similarity(10, 11);
        let sim_12 = index.similarity(10, 12);
        assert!((recs[0].score - sim_11 * 4.0).abs() < 1e-12);
        assert!((recs[1].score - sim_12 * 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_similar_items_and_unknown_item() {
        let now = Utc::now();
        let interactions = vec![
            Interaction::new(1, 10, now).with_like(),
            Interaction::new(1, 11, now).with_like(),
        ];
        let index =
            ItemSimilarityIndex::build(Arc::new(PreferenceAggregator::aggregate(&interactions)));

        assert_eq!(index.similar_items(10, 5), vec![(11, 1.0)]);
        assert!(index.similar_items(99, 5).is_empty());
        assert!(index.recommend(42, &HashSet::new(), 5).is_empty());
    }
}

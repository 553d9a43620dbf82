//! Preference aggregation
//!
//! Turns raw interaction records into per-user preference vectors and
//! per-item sets of interacting users. Both neighborhood indices are built
//! from this output.

use filmrec_core::{Interaction, ItemId, UserId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One user's preference score per item, iterated in ascending item order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserVector {
    scores: BTreeMap<ItemId, f64>,
}

impl UserVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the score for an item; non-positive or non-finite scores are ignored
    pub fn insert(&mut self, item_id: ItemId, score: f64) -> bool {
        if !(score.is_finite() && score > 0.0) {
            return false;
        }
        self.scores.insert(item_id, score);
        true
    }

    pub fn get(&self, item_id: ItemId) -> Option<f64> {
        self.scores.get(&item_id).copied()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.scores.contains_key(&item_id)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.scores.iter().map(|(&item_id, &score)| (item_id, score))
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.scores.keys().copied()
    }

    /// L2 norm over the whole vector
    pub fn norm(&self) -> f64 {
        self.scores.values().map(|s| s * s).sum::<f64>().sqrt()
    }

    /// Number of items both vectors contain
    pub fn common_items(&self, other: &UserVector) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.item_ids().filter(|item| large.contains(*item)).count()
    }
}

impl FromIterator<(ItemId, f64)> for UserVector {
    fn from_iter<I: IntoIterator<Item = (ItemId, f64)>>(iter: I) -> Self {
        let mut vector = UserVector::new();
        for (item_id, score) in iter {
            vector.insert(item_id, score);
        }
        vector
    }
}

/// Aggregated preferences for every user and item with a qualifying interaction
#[derive(Debug, Clone, Default)]
pub struct PreferenceData {
    user_vectors: HashMap<UserId, UserVector>,
    item_users: HashMap<ItemId, HashSet<UserId>>,
}

impl PreferenceData {
    pub fn user_vector(&self, user_id: UserId) -> Option<&UserVector> {
        self.user_vectors.get(&user_id)
    }

    pub fn item_users(&self, item_id: ItemId) -> Option<&HashSet<UserId>> {
        self.item_users.get(&item_id)
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user_vectors.contains_key(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.user_vectors.len()
    }

    pub fn item_count(&self) -> usize {
        self.item_users.len()
    }

    pub fn user_vectors(&self) -> &HashMap<UserId, UserVector> {
        &self.user_vectors
    }

    pub fn item_user_sets(&self) -> &HashMap<ItemId, HashSet<UserId>> {
        &self.item_users
    }

    /// User ids in ascending order
    pub fn sorted_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_vectors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Item ids in ascending order
    pub fn sorted_item_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.item_users.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

pub struct PreferenceAggregator;

impl PreferenceAggregator {
    /// Build preference vectors and item-user sets from all interactions
    ///
    /// Interactions scoring zero contribute nothing. When a (user, item)
    /// pair repeats, the later qualifying record wins.
    pub fn aggregate(interactions: &[Interaction]) -> PreferenceData {
        let mut data = PreferenceData::default();

        for interaction in interactions {
            let score = interaction.preference_score();
            if score <= 0.0 {
                continue;
            }

            data.user_vectors
                .entry(interaction.user_id)
                .or_default()
                .insert(interaction.item_id, score);
            data.item_users
                .entry(interaction.item_id)
                .or_default()
                .insert(interaction.user_id);
        }

        tracing::debug!(
            users = data.user_count(),
            items = data.item_count(),
            interactions = interactions.len(),
            "Aggregated preferences"
        );

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_zero_score_interactions_are_excluded() {
        let now = Utc::now();
        let interactions = vec![
            Interaction::new(1, 10, now).with_like(),
            Interaction::new(1, 11, now),
            Interaction::new(2, 11, now).with_review(""),
        ];

        let data = PreferenceAggregator::aggregate(&interactions);

        assert_eq!(data.user_count(), 1);
        assert!(!data.contains_user(2));
        assert!(data.item_users(11).is_none());
        assert_eq!(data.user_vector(1).unwrap().len(), 1);
        assert_eq!(data.user_vector(1).unwrap().get(10), Some(3.0));
    }

    #[test]
    fn test_item_user_sets() {
        let now = Utc::now();
        let interactions = vec![
            Interaction::new(1, 10, now).with_rating(4),
            Interaction::new(2, 10, now).with_like(),
            Interaction::new(2, 12, now).with_review("loved it"),
        ];

        let data = PreferenceAggregator::aggregate(&interactions);
        let users = data.item_users(10).unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.contains(&1) && users.contains(&2));
        assert_eq!(data.sorted_item_ids(), vec![10, 12]);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let now = Utc::now();
        let interactions = vec![
            Interaction::new(1, 10, now).with_rating(2),
            Interaction::new(1, 10, now).with_like().with_rating(5),
        ];

        let data = PreferenceAggregator::aggregate(&interactions);
        assert_eq!(data.user_vector(1).unwrap().get(10), Some(8.0));
    }

    #[test]
    fn test_user_vector_norm_and_common_items() {
        let a: UserVector = vec![(1, 3.0), (2, 4.0)].into_iter().collect();
        let b: UserVector = vec![(2, 1.0), (3, 1.0)].into_iter().collect();

        assert!((a.norm() - 5.0).abs() < 1e-12);
        assert_eq!(a.common_items(&b), 1);
        assert_eq!(b.common_items(&a), 1);
    }

    #[test]
    fn test_user_vector_ignores_invalid_scores() {
        let mut vector = UserVector::new();
        assert!(!vector.insert(1, 0.0));
        assert!(!vector.insert(2, -1.0));
        assert!(!vector.insert(3, f64::NAN));
        assert!(vector.is_empty());
    }
}

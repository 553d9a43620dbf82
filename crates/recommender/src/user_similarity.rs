//! User-based collaborative filtering
//!
//! Cosine similarity between users' preference vectors, precomputed into an
//! immutable neighbor table. Norms always cover each user's *entire* vector,
//! not only the items the two users share, so pairs whose overlap is small
//! relative to their overall activity score lower.

use crate::preference::{PreferenceData, UserVector};
use crate::types::{by_similarity_desc, ScoreAccumulator, ScoredItem, SimilarUser};
use filmrec_core::{ItemId, UserId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Cosine similarity between two users
///
/// Dot product over common items divided by the product of the full-vector
/// norms. Zero when nothing is shared or either norm is zero.
pub fn cosine_similarity(a: &UserVector, b: &UserVector) -> f64 {
    cosine_with_norms(a, a.norm(), b, b.norm())
}

fn cosine_with_norms(a: &UserVector, norm_a: f64, b: &UserVector, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut shared = 0usize;
    let mut dot = 0.0;
    for (item_id, score) in small.iter() {
        if let Some(other) = large.get(item_id) {
            dot += score * other;
            shared += 1;
        }
    }

    if shared == 0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Precomputed user-user similarity table
pub struct UserSimilarityIndex {
    preferences: Arc<PreferenceData>,
    /// Positive neighbors per user, most similar first
    neighbors: HashMap<UserId, Vec<(UserId, f64)>>,
    neighbor_count: usize,
}

impl UserSimilarityIndex {
    /// Build the full pairwise table; O(U² · items per user)
    pub fn build(preferences: Arc<PreferenceData>, neighbor_count: usize) -> Self {
        let start = Instant::now();
        let users = preferences.sorted_user_ids();
        let norms: HashMap<UserId, f64> = preferences
            .user_vectors()
            .iter()
            .map(|(&user_id, vector)| (user_id, vector.norm()))
            .collect();
        let vectors = preferences.user_vectors();

        let neighbors: HashMap<UserId, Vec<(UserId, f64)>> = users
            .par_iter()
            .map(|&user_id| {
                let vector = &vectors[&user_id];
                let norm = norms[&user_id];
                let mut row: Vec<(UserId, f64)> = users
                    .iter()
                    .filter(|&&other_id| other_id != user_id)
                    .filter_map(|&other_id| {
                        let similarity =
                            cosine_with_norms(vector, norm, &vectors[&other_id], norms[&other_id]);
                        (similarity > 0.0).then_some((other_id, similarity))
                    })
                    .collect();
                row.sort_by(by_similarity_desc);
                (user_id, row)
            })
            .collect();

        tracing::debug!(
            users = users.len(),
            pairs = neighbors.values().map(Vec::len).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built user similarity index"
        );

        Self {
            preferences,
            neighbors,
            neighbor_count,
        }
    }

    pub fn similarity(&self, a: UserId, b: UserId) -> f64 {
        match (
            self.preferences.user_vector(a),
            self.preferences.user_vector(b),
        ) {
            (Some(va), Some(vb)) if a != b => cosine_similarity(va, vb),
            _ => 0.0,
        }
    }

    /// Most similar users with positive similarity, at most `top_n`
    pub fn similar_users(&self, user_id: UserId, top_n: usize) -> Vec<(UserId, f64)> {
        self.neighbors
            .get(&user_id)
            .map(|row| row.iter().take(top_n).copied().collect())
            .unwrap_or_default()
    }

    /// Similar users annotated with how many items they share with `user_id`
    pub fn similar_users_detailed(&self, user_id: UserId, top_n: usize) -> Vec<SimilarUser> {
        let Some(own) = self.preferences.user_vector(user_id) else {
            return Vec::new();
        };

        self.similar_users(user_id, top_n)
            .into_iter()
            .map(|(other_id, similarity)| SimilarUser {
                user_id: other_id,
                similarity,
                common_interactions: self
                    .preferences
                    .user_vector(other_id)
                    .map(|other| own.common_items(other))
                    .unwrap_or(0),
            })
            .collect()
    }

    /// Score unseen items from the neighbors' preferences
    ///
    /// Every contribution `similarity · neighbor_score` also adds
    /// `similarity` to one denominator shared by all candidates, so the
    /// final scores are comparable within a list but are not per-item
    /// weighted averages. Returns an empty list when there is nothing to
    /// recommend; the caller decides on a fallback.
    pub fn recommend(
        &self,
        user_id: UserId,
        exclude: &HashSet<ItemId>,
        top_n: usize,
    ) -> Vec<ScoredItem> {
        let Some(own) = self.preferences.user_vector(user_id) else {
            return Vec::new();
        };

        let neighbors = self.similar_users(user_id, self.neighbor_count);
        if neighbors.is_empty() {
            return Vec::new();
        }

        let mut scores = ScoreAccumulator::new();
        let mut total_similarity = 0.0;

        for (neighbor_id, similarity) in neighbors {
            let Some(neighbor) = self.preferences.user_vector(neighbor_id) else {
                continue;
            };
            for (item_id, score) in neighbor.iter() {
                if own.contains(item_id) || exclude.contains(&item_id) || score <= 0.0 {
                    continue;
                }
                scores.add(item_id, similarity * score);
                total_similarity += similarity;
            }
        }

        if scores.is_empty() {
            return Vec::new();
        }

        scores.into_ranked_scaled(total_similarity, top_n)
    }

    pub fn user_count(&self) -> usize {
        self.neighbors.len()
    }
}

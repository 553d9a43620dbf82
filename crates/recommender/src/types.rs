//! Shared recommendation types

use filmrec_core::{Item, ItemId, UserId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Recommendation algorithm selectable by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    UserBased,
    ItemBased,
    MatrixFactorization,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::UserBased,
        Algorithm::ItemBased,
        Algorithm::MatrixFactorization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::UserBased => "user_based",
            Algorithm::ItemBased => "item_based",
            Algorithm::MatrixFactorization => "matrix_factorization",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "user_based" | "user" => Ok(Algorithm::UserBased),
            "item_based" | "item" => Ok(Algorithm::ItemBased),
            "matrix_factorization" | "mf" => Ok(Algorithm::MatrixFactorization),
            other => Err(format!(
                "unknown algorithm '{}', expected one of: user_based, item_based, matrix_factorization",
                other
            )),
        }
    }
}

/// Where a recommendation list actually came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    UserBased,
    ItemBased,
    MatrixFactorization,
    Popularity,
}

impl From<Algorithm> for RecommendationSource {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::UserBased => RecommendationSource::UserBased,
            Algorithm::ItemBased => RecommendationSource::ItemBased,
            Algorithm::MatrixFactorization => RecommendationSource::MatrixFactorization,
        }
    }
}

/// Candidate item id with its algorithm score, before item resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
}

/// Recommendation resolved against the item store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item: Item,
    pub score: f64,
    pub source: RecommendationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarUser {
    pub user_id: UserId,
    pub similarity: f64,
    /// Items both users have a qualifying interaction with
    pub common_interactions: usize,
}

/// Everything the presentation layer shows on a recommendations page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationBundle {
    pub user_id: UserId,
    pub algorithm: Algorithm,
    pub recommendations: Vec<Recommendation>,
    pub similar_users: Vec<SimilarUser>,
    pub total_users: usize,
    pub user_interaction_count: usize,
}

/// Per-item score accumulation keyed by item id
///
/// Deltas must be finite; a NaN or infinite contribution is dropped so it
/// cannot poison the ranking.
#[derive(Debug, Clone, Default)]
pub struct ScoreAccumulator {
    scores: HashMap<ItemId, f64>,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item_id: ItemId, delta: f64) {
        if !delta.is_finite() {
            tracing::warn!(item_id, delta, "Dropping non-finite score contribution");
            return;
        }
        *self.scores.entry(item_id).or_insert(0.0) += delta;
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn get(&self, item_id: ItemId) -> Option<f64> {
        self.scores.get(&item_id).copied()
    }

    /// Rank descending, divide every score by `divisor`, keep the first `top_n`
    pub fn into_ranked_scaled(self, divisor: f64, top_n: usize) -> Vec<ScoredItem> {
        let mut ranked: Vec<ScoredItem> = self
            .scores
            .into_iter()
            .map(|(item_id, score)| ScoredItem {
                item_id,
                score: if divisor > 0.0 { score / divisor } else { 0.0 },
            })
            .collect();
        sort_scored(&mut ranked);
        ranked.truncate(top_n);
        ranked
    }

    pub fn into_ranked(self, top_n: usize) -> Vec<ScoredItem> {
        self.into_ranked_scaled(1.0, top_n)
    }
}

/// Sort by score descending, ties by ascending item id
pub fn sort_scored(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

/// Descending similarity with ascending id as the tie-break
pub(crate) fn by_similarity_desc<K: Ord>(a: &(K, f64), b: &(K, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_round_trip_through_str() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert_eq!("mf".parse::<Algorithm>().unwrap(), Algorithm::MatrixFactorization);
        assert_eq!("item-based".parse::<Algorithm>().unwrap(), Algorithm::ItemBased);
        assert!("svd".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_accumulator_ranks_with_id_tie_break() {
        let mut acc = ScoreAccumulator::new();
        acc.add(3, 1.0);
        acc.add(1, 1.0);
        acc.add(2, 0.5);
        acc.add(2, 1.5);

        let ranked = acc.into_ranked(10);
        let ids: Vec<ItemId> = ranked.iter().map(|s| s.item_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!((ranked[0].score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_accumulator_drops_non_finite() {
        let mut acc = ScoreAccumulator::new();
        acc.add(1, f64::NAN);
        acc.add(2, f64::INFINITY);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_scaled_ranking_truncates() {
        let mut acc = ScoreAccumulator::new();
        acc.add(1, 4.0);
        acc.add(2, 2.0);
        acc.add(3, 1.0);

        let ranked = acc.into_ranked_scaled(2.0, 2);
        assert_eq!(ranked.len(), 2);
        assert!((ranked[0].score - 2.0).abs() < 1e-12);
        assert!((ranked[1].score - 1.0).abs() < 1e-12);
    }
}

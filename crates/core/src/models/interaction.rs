//! User-item interaction records
//!
//! Interactions are owned by the external interaction store. The
//! recommendation crates only read them and derive preference scores.

use crate::error::RecommenderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ItemId = i64;

const LIKE_WEIGHT: f64 = 3.0;
const REVIEW_WEIGHT: f64 = 1.0;

/// A single user's recorded engagement with one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    #[serde(default)]
    pub liked: bool,
    /// Star rating, 1..=5
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub review_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: UserId, item_id: ItemId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            item_id,
            liked: false,
            rating: None,
            review_text: None,
            created_at,
        }
    }

    pub fn with_like(mut self) -> Self {
        self.liked = true;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_review(mut self, text: impl Into<String>) -> Self {
        self.review_text = Some(text.into());
        self
    }

    /// True when the review text is present and not blank
    pub fn has_review(&self) -> bool {
        self.review_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }

    /// Preference score: 3 for a like, plus the rating, plus 1 for a review
    pub fn preference_score(&self) -> f64 {
        let mut score = 0.0;
        if self.liked {
            score += LIKE_WEIGHT;
        }
        if let Some(rating) = self.rating {
            score += f64::from(rating);
        }
        if self.has_review() {
            score += REVIEW_WEIGHT;
        }
        score
    }

    /// Whether this interaction carries any preference signal at all
    pub fn is_qualifying(&self) -> bool {
        self.preference_score() > 0.0
    }

    pub fn validate(&self) -> Result<(), RecommenderError> {
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(RecommenderError::InvalidInteraction(format!(
                    "rating {} for user {} on item {} is outside 1..=5",
                    rating, self.user_id, self.item_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_preference_score_components() {
        assert_eq!(Interaction::new(1, 1, at()).preference_score(), 0.0);
        assert_eq!(Interaction::new(1, 1, at()).with_like().preference_score(), 3.0);
        assert_eq!(Interaction::new(1, 1, at()).with_rating(4).preference_score(), 4.0);
        assert_eq!(
            Interaction::new(1, 1, at())
                .with_like()
                .with_rating(5)
                .with_review("great")
                .preference_score(),
            9.0
        );
    }

    #[test]
    fn test_blank_review_does_not_count() {
        let interaction = Interaction::new(1, 1, at()).with_review("   ");
        assert!(!interaction.has_review());
        assert!(!interaction.is_qualifying());
    }

    #[test]
    fn test_validate_rating_range() {
        assert!(Interaction::new(1, 1, at()).with_rating(5).validate().is_ok());
        assert!(Interaction::new(1, 1, at()).with_rating(0).validate().is_err());
        assert!(Interaction::new(1, 1, at()).with_rating(6).validate().is_err());
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let json = r#"{"user_id": 7, "item_id": 3, "created_at": "2024-01-01T12:00:00Z"}"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert!(!interaction.liked);
        assert_eq!(interaction.rating, None);
        assert_eq!(interaction.preference_score(), 0.0);
    }
}

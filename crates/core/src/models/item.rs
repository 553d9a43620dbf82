//! Catalog item records as exposed by the external item store

use super::interaction::ItemId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Persisted aggregate like counter maintained by the item store
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default)]
    pub rating_sum: u32,
}

impl Item {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            genre: None,
            year: None,
            like_count: 0,
            rating_count: 0,
            rating_sum: 0,
        }
    }

    pub fn with_like_count(mut self, like_count: u32) -> Self {
        self.like_count = like_count;
        self
    }

    /// Mean star rating, 0.0 when nobody rated the item
    pub fn average_rating(&self) -> f64 {
        if self.rating_count > 0 {
            f64::from(self.rating_sum) / f64::from(self.rating_count)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating() {
        let mut item = Item::new(1, "Stalker");
        assert_eq!(item.average_rating(), 0.0);

        item.rating_count = 10;
        item.rating_sum = 45;
        assert!((item.average_rating() - 4.5).abs() < 1e-9);
    }
}

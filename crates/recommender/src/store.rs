//! Read-only views of the external interaction and item stores
//!
//! The recommendation engine never owns persistence. Hosts plug in their
//! own implementations of these traits; `InMemoryStore` serves tests, the
//! CLI, and the evaluation harness.

use filmrec_core::{Interaction, Item, ItemId, RecommenderError, Result, UserId};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub trait InteractionStore: Send + Sync {
    /// Every interaction, in the store's natural retrieval order
    fn all_interactions(&self) -> Result<Vec<Interaction>>;

    /// Interactions of one user, read fresh from the store
    fn interactions_for_user(&self, user_id: UserId) -> Result<Vec<Interaction>>;
}

pub trait ItemStore: Send + Sync {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Items with the highest persisted like counts
    fn most_liked(&self, limit: usize) -> Result<Vec<Item>>;
}

/// Interaction and item store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    interactions: Vec<Interaction>,
    items: HashMap<ItemId, Item>,
}

impl InMemoryStore {
    pub fn new(interactions: Vec<Interaction>, items: Vec<Item>) -> Result<Self> {
        for interaction in &interactions {
            interaction.validate()?;
        }
        let items = items.into_iter().map(|item| (item.id, item)).collect();
        Ok(Self {
            interactions,
            items,
        })
    }

    /// Load JSON array exports of both stores
    pub fn from_json_files(interactions_path: &Path, items_path: &Path) -> Result<Self> {
        let interactions: Vec<Interaction> = read_json(interactions_path)?;
        let items: Vec<Item> = read_json(items_path)?;
        tracing::info!(
            interactions = interactions.len(),
            items = items.len(),
            "Loaded store exports"
        );
        Self::new(interactions, items)
    }

    pub fn push_interaction(&mut self, interaction: Interaction) -> Result<()> {
        interaction.validate()?;
        self.interactions.push(interaction);
        Ok(())
    }

    pub fn upsert_item(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        RecommenderError::Store(format!("failed to open {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

impl InteractionStore for InMemoryStore {
    fn all_interactions(&self) -> Result<Vec<Interaction>> {
        Ok(self.interactions.clone())
    }

    fn interactions_for_user(&self, user_id: UserId) -> Result<Vec<Interaction>> {
        Ok(self
            .interactions
            .iter()
            .filter(|interaction| interaction.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl ItemStore for InMemoryStore {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.items.get(&item_id).cloned())
    }

    fn most_liked(&self, limit: usize) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| b.like_count.cmp(&a.like_count).then(a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }
}

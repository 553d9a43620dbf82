//! Domain records read from the external stores

pub mod interaction;
pub mod item;

pub use interaction::{Interaction, ItemId, UserId};
pub use item::Item;

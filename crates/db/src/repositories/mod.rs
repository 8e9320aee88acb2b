//! In-memory adapters for the recommender's store ports.

pub mod memory;

pub use memory::{InMemoryInteractionStore, InMemoryProductCatalog};

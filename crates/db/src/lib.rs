pub mod fixtures;
pub mod repositories;

pub use fixtures::{demo_dataset, Dataset, FixtureError};
pub use repositories::{InMemoryInteractionStore, InMemoryProductCatalog};

pub mod interaction;
pub mod product;

pub use interaction::{InteractionRecord, InteractionType, UserId, UserInteractionVector};
pub use product::{CategoryId, ProductAttributes, ProductId};

pub mod item;
pub mod message;

pub use item::{group_by_category, ExtractedItem, ItemCategory};
pub use message::{ExtractionState, Message, Sender};

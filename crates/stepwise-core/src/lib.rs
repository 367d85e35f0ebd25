pub mod ai;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod events;
pub mod extraction;
pub mod ids;
pub mod models;
pub mod streaming;
pub mod tracing_setup;
pub mod transcript;

// Re-export the types front ends touch most at crate root
pub use config::CoreConfig;
pub use conversation::{Conversation, ConversationError, TurnOutcome};
pub use events::ConversationEvent;
pub use extraction::ExtractionMode;
pub use models::{ExtractedItem, ExtractionState, ItemCategory, Message, Sender};

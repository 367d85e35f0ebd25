use crate::models::Message;

/// Change notifications for front ends. Every variant carries an owned
/// snapshot so receivers never borrow conversation state.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    MessageAdded(Message),
    /// Text, extraction state or items of an existing message changed
    MessageUpdated(Message),
    /// The item panel moved to another message, or closed (`None`)
    PanelChanged(Option<String>),
}

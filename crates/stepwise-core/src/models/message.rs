use serde::{Deserialize, Serialize};

use super::ExtractedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// Extraction lifecycle of one message.
///
/// `None -> Extractable -> Extracting -> {HasItems | NoItems}`, then
/// `HasItems -> Accepted` on bulk accept, or `HasItems -> NoItems` once every
/// item has been declined. Inline extraction jumps from `None` straight to
/// `HasItems`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionState {
    #[default]
    None,
    Extractable,
    Extracting,
    HasItems,
    NoItems,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    /// Local wall-clock time the message was created (HH:MM)
    pub timestamp: String,
    pub extraction: ExtractionState,
    /// Pending items awaiting accept/decline. Empty unless `extraction` is `HasItems`.
    pub extracted_items: Vec<ExtractedItem>,
    /// Set when the turn that produced this message failed
    pub failed: bool,
}

impl Message {
    pub fn new(id: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender,
            text: text.into(),
            timestamp: chrono::Local::now().format("%H:%M").to_string(),
            extraction: ExtractionState::None,
            extracted_items: Vec::new(),
            failed: false,
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Sender::User, text)
    }

    pub fn ai(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Sender::Ai, text)
    }

    pub fn is_ai(&self) -> bool {
        self.sender == Sender::Ai
    }

    pub fn is_extraction_loading(&self) -> bool {
        self.extraction == ExtractionState::Extracting
    }

    pub fn is_extractable(&self) -> bool {
        self.extraction == ExtractionState::Extractable
    }

    pub fn items_accepted(&self) -> bool {
        self.extraction == ExtractionState::Accepted
    }

    pub fn has_pending_items(&self) -> bool {
        self.extraction == ExtractionState::HasItems && !self.extracted_items.is_empty()
    }

    /// Store the result of an extraction run.
    pub(crate) fn set_items(&mut self, items: Vec<ExtractedItem>) {
        self.extraction = if items.is_empty() {
            ExtractionState::NoItems
        } else {
            ExtractionState::HasItems
        };
        self.extracted_items = items;
    }

    /// Hand over every pending item and mark the message accepted.
    /// Returns nothing unless the message currently has items.
    pub(crate) fn take_items_for_accept(&mut self) -> Vec<ExtractedItem> {
        if self.extraction != ExtractionState::HasItems {
            return Vec::new();
        }
        self.extraction = ExtractionState::Accepted;
        std::mem::take(&mut self.extracted_items)
    }

    /// Remove one pending item. Removing the last one leaves the message in
    /// `NoItems`.
    pub(crate) fn decline_item(&mut self, item_id: &str) -> Option<ExtractedItem> {
        if self.extraction != ExtractionState::HasItems {
            return None;
        }
        let index = self.extracted_items.iter().position(|i| i.id == item_id)?;
        let removed = self.extracted_items.remove(index);
        if self.extracted_items.is_empty() {
            self.extraction = ExtractionState::NoItems;
        }
        Some(removed)
    }
}

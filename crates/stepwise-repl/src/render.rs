use std::collections::HashMap;
use std::io::{self, Write};

use stepwise_core::{ConversationEvent, ExtractionState, Message, Sender};

use crate::format::{extraction_hint, message_header, render_items_panel};
use crate::{DIM, RED, RESET};

/// Prints conversation events as they arrive.
///
/// Keeps the latest snapshot of every message so streamed replies can be
/// printed as suffixes and panels rendered from the event alone.
#[derive(Default)]
pub(crate) struct EventPrinter {
    snapshots: HashMap<String, Message>,
    /// Bytes of each message's text already written to stdout
    printed: HashMap<String, usize>,
    streaming: Option<String>,
}

impl EventPrinter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle(&mut self, event: &ConversationEvent) {
        match event {
            ConversationEvent::MessageAdded(message) => self.on_added(message),
            ConversationEvent::MessageUpdated(message) => self.on_updated(message),
            ConversationEvent::PanelChanged(Some(id)) => {
                if let Some(message) = self.snapshots.get(id).cloned() {
                    self.end_stream();
                    println!("\n{}", render_items_panel(&message));
                }
            }
            ConversationEvent::PanelChanged(None) => {}
        }
        let _ = io::stdout().flush();
    }

    fn on_added(&mut self, message: &Message) {
        self.end_stream();
        self.snapshots.insert(message.id.clone(), message.clone());
        // User input is already on screen
        if message.sender == Sender::User {
            return;
        }
        println!("{}", message_header(message));
        if message.failed || message.id.starts_with("error") {
            println!("{RED}{}{RESET}", message.text);
            return;
        }
        print!("{}", message.text);
        self.printed.insert(message.id.clone(), message.text.len());
        self.streaming = Some(message.id.clone());
    }

    fn on_updated(&mut self, message: &Message) {
        let previous = self.snapshots.insert(message.id.clone(), message.clone());
        let printed = self.printed.get(&message.id).copied().unwrap_or(0);

        if message.failed {
            self.end_stream();
            println!("{RED}{}{RESET}", message.text);
            self.printed.insert(message.id.clone(), message.text.len());
            return;
        }

        if message.text.len() > printed && message.text.is_char_boundary(printed) {
            print!("{}", &message.text[printed..]);
            self.printed.insert(message.id.clone(), message.text.len());
        }

        let previous_state = previous.map(|m| m.extraction).unwrap_or_default();
        if previous_state != message.extraction {
            self.end_stream();
            let found_nothing = previous_state == ExtractionState::Extracting
                && message.extraction == ExtractionState::NoItems;
            if found_nothing {
                println!("{DIM}No action items found.{RESET}");
            } else if message.extraction != ExtractionState::Accepted {
                // Accepting reports its own count
                if let Some(hint) = extraction_hint(message) {
                    println!("{hint}");
                }
            }
        }
    }

    /// Terminate a reply that is still being written on the current line.
    pub(crate) fn end_stream(&mut self) {
        if self.streaming.take().is_some() {
            println!();
        }
    }
}

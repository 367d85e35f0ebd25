use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::Instrument;

use crate::ai::{ChatSession, ModelError, StructuredGenerator};
use crate::constants::{
    AI_GREETING, GREETING_MESSAGE_ID, INIT_ERROR_MESSAGE_ID, INIT_ERROR_TEXT, TURN_FAILURE_TEXT,
};
use crate::events::ConversationEvent;
use crate::extraction::{classify_calls, ExtractionMode, OnDemandExtractor};
use crate::ids::IdGenerator;
use crate::models::{ExtractedItem, ExtractionState, Message};
use crate::streaming::{StreamAccumulator, TurnTranscript};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("A reply is still streaming")]
    TurnInFlight,

    #[error("Chat session is not available")]
    SessionUnavailable,

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Message {0} has nothing to extract")]
    NotExtractable(String),

    #[error("On-demand extraction is not configured")]
    ExtractorUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply streamed to completion into this message
    Completed { message_id: String },
    /// The turn failed; this message carries the failure text
    Failed { message_id: String },
}

impl TurnOutcome {
    pub fn message_id(&self) -> &str {
        match self {
            TurnOutcome::Completed { message_id } | TurnOutcome::Failed { message_id } => {
                message_id
            }
        }
    }
}

/// Tags an on-demand extraction with where it came from, so its result can
/// be matched back to the message and dropped if it went stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTicket {
    pub message_id: String,
    seq: u64,
    turn: u64,
}

/// Marks a turn as in flight until dropped, so a `send_message` future that
/// is cancelled mid-stream does not lock the conversation.
struct TurnGuard(Arc<AtomicBool>);

impl TurnGuard {
    fn begin(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag.clone())
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One chat with the assistant: messages, pending and accepted items, and
/// the single open item panel.
///
/// All mutation happens through `&mut self`, so callers serialize user
/// actions by construction. The only work that runs outside is the on-demand
/// extraction request, which re-enters through [`Conversation::finish_extraction`].
pub struct Conversation {
    messages: Vec<Message>,
    accepted: Vec<ExtractedItem>,
    panel: Option<String>,
    session: Option<Arc<dyn ChatSession>>,
    mode: ExtractionMode,
    extractor: Option<OnDemandExtractor>,
    ids: Arc<IdGenerator>,
    /// Incremented for every user turn
    turn: u64,
    in_flight: Arc<AtomicBool>,
    extraction_seq: u64,
    /// Message id -> sequence number of its outstanding extraction
    pending_extractions: HashMap<String, u64>,
    events: Option<UnboundedSender<ConversationEvent>>,
}

impl Conversation {
    /// Start a conversation from the outcome of session creation. A failed
    /// session leaves a single error message and disables sending.
    pub fn new(session: Result<Arc<dyn ChatSession>, ModelError>, mode: ExtractionMode) -> Self {
        let ids = Arc::new(IdGenerator::new());
        let (session, first_message) = match session {
            Ok(session) => (Some(session), Message::ai(GREETING_MESSAGE_ID, AI_GREETING)),
            Err(e) => {
                tracing::error!("Failed to initialize chat session: {}", e);
                (None, Message::ai(INIT_ERROR_MESSAGE_ID, INIT_ERROR_TEXT))
            }
        };

        Self {
            messages: vec![first_message],
            accepted: Vec::new(),
            panel: None,
            session,
            mode,
            extractor: None,
            ids,
            turn: 0,
            in_flight: Arc::new(AtomicBool::new(false)),
            extraction_seq: 0,
            pending_extractions: HashMap::new(),
            events: None,
        }
    }

    /// Attach the generator used for on-demand extraction. Has no effect on
    /// an inline conversation.
    pub fn with_extractor(mut self, generator: Arc<dyn StructuredGenerator>) -> Self {
        if self.mode == ExtractionMode::OnDemand {
            self.extractor = Some(OnDemandExtractor::new(generator, self.ids.clone()));
        }
        self
    }

    /// Receive change events from now on. A new subscription replaces the
    /// previous one.
    pub fn subscribe(&mut self) -> UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn latest_ai_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_ai())
    }

    pub fn accepted_items(&self) -> &[ExtractedItem] {
        &self.accepted
    }

    /// Message whose item panel is open, if any
    pub fn open_panel(&self) -> Option<&str> {
        self.panel.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.ids.session_id()
    }

    /// Extractor handle for running a request outside the conversation
    pub fn extractor(&self) -> Option<OnDemandExtractor> {
        self.extractor.clone()
    }

    /// Send user text and stream the assistant's reply into a new message.
    ///
    /// Stream failures are not errors here: they end up as a failed message
    /// in the conversation and a [`TurnOutcome::Failed`].
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome, ConversationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        if self.is_loading() {
            return Err(ConversationError::TurnInFlight);
        }
        let Some(session) = self.session.clone() else {
            tracing::error!("Chat session not initialized");
            return Err(ConversationError::SessionUnavailable);
        };

        self.set_panel(None);
        self.turn += 1;
        let user_id = self.ids.next_id("user");
        self.push_message(Message::user(user_id, text));

        let _turn = TurnGuard::begin(&self.in_flight);
        let outcome = self.run_turn(session.as_ref(), text).await;
        Ok(outcome)
    }

    async fn run_turn(&mut self, session: &dyn ChatSession, text: &str) -> TurnOutcome {
        tracing::debug!(chat_id = %self.ids.session_id(), turn = self.turn, "sending message");

        let stream = match session.send_message_stream(text).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Error sending message: {}", e);
                let error_id = self.ids.next_id("error");
                let mut message = Message::ai(&error_id, TURN_FAILURE_TEXT);
                message.failed = true;
                self.push_message(message);
                return TurnOutcome::Failed { message_id: error_id };
            }
        };

        let ai_id = self.ids.next_id("ai");
        self.push_message(Message::ai(&ai_id, ""));
        let index = self.messages.len() - 1;

        // Calls logged while draining carry the chat id
        let span = tracing::debug_span!(
            "reply",
            chat_id = %self.ids.session_id(),
            message_id = %ai_id
        );
        let messages = &mut self.messages;
        let events = &self.events;
        let drained = StreamAccumulator::drain(stream, |text| {
            let message = &mut messages[index];
            message.text = text.to_string();
            emit(events, ConversationEvent::MessageUpdated(message.clone()));
        })
        .instrument(span)
        .await;

        match drained {
            Ok(transcript) => {
                self.finish_turn(index, transcript);
                TurnOutcome::Completed { message_id: ai_id }
            }
            Err(e) => {
                tracing::error!("Error while streaming reply: {}", e);
                let message = &mut self.messages[index];
                message.text = TURN_FAILURE_TEXT.to_string();
                message.failed = true;
                let snapshot = message.clone();
                emit(&self.events, ConversationEvent::MessageUpdated(snapshot));
                TurnOutcome::Failed { message_id: ai_id }
            }
        }
    }

    fn finish_turn(&mut self, index: usize, transcript: TurnTranscript) {
        let TurnTranscript { text, calls } = transcript;
        let mut open_panel = false;
        {
            let message = &mut self.messages[index];
            message.text = text;
            match self.mode {
                ExtractionMode::Inline => {
                    let items = classify_calls(&calls, &self.ids);
                    tracing::debug!(calls = calls.len(), items = items.len(), "inline extraction");
                    if !items.is_empty() {
                        message.set_items(items);
                        open_panel = true;
                    }
                }
                ExtractionMode::OnDemand => {
                    if !message.text.trim().is_empty() {
                        message.extraction = ExtractionState::Extractable;
                    }
                }
            }
        }

        let snapshot = self.messages[index].clone();
        emit(&self.events, ConversationEvent::MessageUpdated(snapshot));
        if open_panel {
            let id = self.messages[index].id.clone();
            self.set_panel(Some(id));
        }
    }

    /// Move every pending item of a message into the accepted collection and
    /// close the panel. Returns how many items moved; repeating the call
    /// moves nothing.
    pub fn accept_all(&mut self, message_id: &str) -> Result<usize, ConversationError> {
        let message = self.message_mut(message_id)?;
        let items = message.take_items_for_accept();
        let count = items.len();
        let snapshot = (count > 0).then(|| message.clone());

        self.accepted.extend(items);
        if let Some(snapshot) = snapshot {
            emit(&self.events, ConversationEvent::MessageUpdated(snapshot));
        }
        self.set_panel(None);
        Ok(count)
    }

    /// Drop one pending item. Declining the last item closes the panel if it
    /// is open for this message.
    pub fn decline_item(
        &mut self,
        message_id: &str,
        item_id: &str,
    ) -> Result<Option<ExtractedItem>, ConversationError> {
        let message = self.message_mut(message_id)?;
        let Some(removed) = message.decline_item(item_id) else {
            return Ok(None);
        };
        let emptied = message.extraction == ExtractionState::NoItems;
        let snapshot = message.clone();

        emit(&self.events, ConversationEvent::MessageUpdated(snapshot));
        if emptied && self.panel.as_deref() == Some(message_id) {
            self.set_panel(None);
        }
        Ok(Some(removed))
    }

    /// Show the item panel for a message with pending items. Returns whether
    /// the panel is now open for it.
    pub fn show_panel(&mut self, message_id: &str) -> Result<bool, ConversationError> {
        let has_items = self.message_mut(message_id)?.has_pending_items();
        if has_items {
            self.set_panel(Some(message_id.to_string()));
        }
        Ok(has_items)
    }

    pub fn close_panel(&mut self) {
        self.set_panel(None);
    }

    /// Mark an extractable message as extracting and hand out what the
    /// request needs: a ticket and the message transcript.
    pub fn begin_extraction(
        &mut self,
        message_id: &str,
    ) -> Result<(ExtractionTicket, String), ConversationError> {
        if self.extractor.is_none() {
            return Err(ConversationError::ExtractorUnavailable);
        }
        self.extraction_seq += 1;
        let seq = self.extraction_seq;
        let turn = self.turn;

        let message = self.message_mut(message_id)?;
        if !message.is_extractable() {
            return Err(ConversationError::NotExtractable(message_id.to_string()));
        }
        message.extraction = ExtractionState::Extracting;
        let transcript = message.text.clone();
        let snapshot = message.clone();

        self.pending_extractions.insert(message_id.to_string(), seq);
        emit(&self.events, ConversationEvent::MessageUpdated(snapshot));

        let ticket = ExtractionTicket {
            message_id: message_id.to_string(),
            seq,
            turn,
        };
        Ok((ticket, transcript))
    }

    /// Apply an extraction result to the message named by its ticket.
    ///
    /// Results that no longer match the message's outstanding extraction are
    /// discarded. The panel only opens when no new user turn started while
    /// the request was running. Returns whether the result was applied.
    pub fn finish_extraction(
        &mut self,
        ticket: ExtractionTicket,
        items: Vec<ExtractedItem>,
    ) -> bool {
        if self.pending_extractions.get(&ticket.message_id) != Some(&ticket.seq) {
            tracing::debug!(message_id = %ticket.message_id, "discarding stale extraction result");
            return false;
        }
        self.pending_extractions.remove(&ticket.message_id);

        let current_turn = self.turn;
        let Ok(message) = self.message_mut(&ticket.message_id) else {
            return false;
        };
        if message.extraction != ExtractionState::Extracting {
            return false;
        }
        message.set_items(items);
        let has_items = message.has_pending_items();
        let snapshot = message.clone();

        emit(&self.events, ConversationEvent::MessageUpdated(snapshot));
        if has_items && ticket.turn == current_turn {
            self.set_panel(Some(ticket.message_id));
        }
        true
    }

    /// Run on-demand extraction for one message to completion. Returns the
    /// number of items found.
    pub async fn extract(&mut self, message_id: &str) -> Result<usize, ConversationError> {
        let extractor = self
            .extractor
            .clone()
            .ok_or(ConversationError::ExtractorUnavailable)?;
        let (ticket, transcript) = self.begin_extraction(message_id)?;
        let items = extractor.extract(&transcript).await;
        let count = items.len();
        self.finish_extraction(ticket, items);
        Ok(count)
    }

    fn message_mut(&mut self, id: &str) -> Result<&mut Message, ConversationError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ConversationError::UnknownMessage(id.to_string()))
    }

    fn push_message(&mut self, message: Message) {
        emit(&self.events, ConversationEvent::MessageAdded(message.clone()));
        self.messages.push(message);
    }

    fn set_panel(&mut self, panel: Option<String>) {
        if self.panel != panel {
            self.panel = panel;
            emit(&self.events, ConversationEvent::PanelChanged(self.panel.clone()));
        }
    }
}

fn emit(events: &Option<UnboundedSender<ConversationEvent>>, event: ConversationEvent) {
    if let Some(tx) = events {
        // A dropped receiver just means nobody is watching
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{ScriptedGenerator, ScriptedSession, ScriptedTurn};
    use crate::constants::ACTION_POINT_TOOL;
    use crate::models::ItemCategory;
    use crate::streaming::{Fragment, StructuredCall};
    use serde_json::json;

    fn ap(title: &str, tag: &str) -> StructuredCall {
        StructuredCall::new(ACTION_POINT_TOOL, json!({ "title": title, "type": tag }))
    }

    fn inline_conversation(turns: Vec<ScriptedTurn>) -> (Conversation, Arc<ScriptedSession>) {
        let session = ScriptedSession::new(turns);
        let conversation = Conversation::new(Ok(session.clone()), ExtractionMode::Inline);
        (conversation, session)
    }

    fn on_demand_conversation(
        turns: Vec<ScriptedTurn>,
        responses: Vec<Result<serde_json::Value, ModelError>>,
    ) -> Conversation {
        let session = ScriptedSession::new(turns);
        Conversation::new(Ok(session), ExtractionMode::OnDemand)
            .with_extractor(ScriptedGenerator::new(responses))
    }

    fn step_with_items() -> ScriptedTurn {
        Ok(vec![
            Ok(Fragment::text("1. Kickoff:\n")),
            Ok(Fragment::text("- Book room\n")),
            Ok(Fragment::text("- Who attends?")),
            Ok(Fragment::calls(vec![ap("Book room", "TASK"), ap("Who attends?", "QUESTION")])),
        ])
    }

    #[test]
    fn test_greeting_on_session_start() {
        let (conversation, _) = inline_conversation(Vec::new());
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].id, GREETING_MESSAGE_ID);
        assert_eq!(conversation.messages()[0].text, AI_GREETING);
        assert!(conversation.has_session());
    }

    #[tokio::test]
    async fn test_init_failure_disables_sending() {
        let mut conversation =
            Conversation::new(Err(ModelError::MissingApiKey), ExtractionMode::Inline);
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].id, INIT_ERROR_MESSAGE_ID);
        assert_eq!(conversation.messages()[0].text, INIT_ERROR_TEXT);

        let result = conversation.send_message("hello").await;
        assert_eq!(result, Err(ConversationError::SessionUnavailable));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (mut conversation, session) = inline_conversation(Vec::new());
        assert_eq!(
            conversation.send_message("  \n ").await,
            Err(ConversationError::EmptyMessage)
        );
        assert!(session.sent().is_empty());
    }

    #[tokio::test]
    async fn test_inline_turn_streams_and_extracts() {
        let (mut conversation, session) = inline_conversation(vec![step_with_items()]);
        let mut events = conversation.subscribe();

        let outcome = conversation.send_message(" plan a kickoff ").await.unwrap();
        let TurnOutcome::Completed { message_id } = outcome else {
            panic!("expected completed turn");
        };
        assert_eq!(session.sent(), vec!["plan a kickoff".to_string()]);
        assert!(!conversation.is_loading());

        let message = conversation.message(&message_id).unwrap();
        assert_eq!(message.text, "1. Kickoff:\n- Book room\n- Who attends?");
        assert_eq!(message.extraction, ExtractionState::HasItems);
        let items: Vec<_> = message
            .extracted_items
            .iter()
            .map(|i| (i.category, i.text.as_str()))
            .collect();
        assert_eq!(
            items,
            vec![(ItemCategory::Tasks, "Book room"), (ItemCategory::Questions, "Who attends?")]
        );
        assert_eq!(conversation.open_panel(), Some(message_id.as_str()));

        // One update per text fragment, each growing the transcript
        let mut streamed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ConversationEvent::MessageUpdated(m) = event {
                if m.id == message_id && m.extraction == ExtractionState::None {
                    streamed.push(m.text);
                }
            }
        }
        assert_eq!(
            streamed,
            vec![
                "1. Kickoff:\n".to_string(),
                "1. Kickoff:\n- Book room\n".to_string(),
                "1. Kickoff:\n- Book room\n- Who attends?".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_inline_turn_without_valid_calls_stays_none() {
        let (mut conversation, _) = inline_conversation(vec![Ok(vec![
            Ok(Fragment::text("Tell me more about the project.")),
            Ok(Fragment::calls(vec![ap("", "TASK"), ap("Something", "RISK")])),
        ])]);

        let outcome = conversation.send_message("hi").await.unwrap();
        let message = conversation.message(outcome.message_id()).unwrap();
        assert_eq!(message.extraction, ExtractionState::None);
        assert!(message.extracted_items.is_empty());
        assert_eq!(conversation.open_panel(), None);
    }

    #[tokio::test]
    async fn test_send_failure_appends_error_message() {
        let (mut conversation, _) =
            inline_conversation(vec![Err(ModelError::Api { status: 503, body: "busy".into() })]);

        let outcome = conversation.send_message("hello").await.unwrap();
        let TurnOutcome::Failed { message_id } = outcome else {
            panic!("expected failed turn");
        };
        assert!(message_id.starts_with("error-"));
        let messages = conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text, "hello");
        assert_eq!(messages[2].text, TURN_FAILURE_TEXT);
        assert!(messages[2].failed);
        assert!(!conversation.is_loading());
    }

    #[tokio::test]
    async fn test_stream_failure_replaces_partial_transcript() {
        let (mut conversation, _) = inline_conversation(vec![Ok(vec![
            Ok(Fragment::text("1. Half a step")),
            Ok(Fragment::calls(vec![ap("Lost task", "TASK")])),
            Err(ModelError::Transport("reset".into())),
        ])]);

        let outcome = conversation.send_message("go").await.unwrap();
        let TurnOutcome::Failed { message_id } = outcome else {
            panic!("expected failed turn");
        };
        let message = conversation.message(&message_id).unwrap();
        assert_eq!(message.text, TURN_FAILURE_TEXT);
        assert!(message.failed);
        assert!(message.extracted_items.is_empty());
        assert_eq!(message.extraction, ExtractionState::None);
        assert_eq!(conversation.open_panel(), None);
    }

    #[tokio::test]
    async fn test_accept_all_moves_items_once() {
        let (mut conversation, _) = inline_conversation(vec![step_with_items()]);
        let outcome = conversation.send_message("go").await.unwrap();
        let id = outcome.message_id().to_string();

        assert_eq!(conversation.accept_all(&id), Ok(2));
        let accepted: Vec<_> = conversation
            .accepted_items()
            .iter()
            .map(|i| i.text.as_str())
            .collect();
        assert_eq!(accepted, vec!["Book room", "Who attends?"]);
        let message = conversation.message(&id).unwrap();
        assert!(message.items_accepted());
        assert!(message.extracted_items.is_empty());
        assert_eq!(conversation.open_panel(), None);

        assert_eq!(conversation.accept_all(&id), Ok(0));
        assert_eq!(conversation.accepted_items().len(), 2);
    }

    #[tokio::test]
    async fn test_decline_last_item_closes_panel() {
        let (mut conversation, _) = inline_conversation(vec![step_with_items()]);
        let outcome = conversation.send_message("go").await.unwrap();
        let id = outcome.message_id().to_string();
        let item_ids: Vec<String> = conversation
            .message(&id)
            .unwrap()
            .extracted_items
            .iter()
            .map(|i| i.id.clone())
            .collect();

        let removed = conversation.decline_item(&id, &item_ids[0]).unwrap();
        assert_eq!(removed.unwrap().text, "Book room");
        assert_eq!(conversation.open_panel(), Some(id.as_str()));

        assert_eq!(conversation.decline_item(&id, "tasks-999"), Ok(None));

        conversation.decline_item(&id, &item_ids[1]).unwrap();
        let message = conversation.message(&id).unwrap();
        assert_eq!(message.extraction, ExtractionState::NoItems);
        assert!(message.extracted_items.is_empty());
        assert_eq!(conversation.open_panel(), None);
        assert!(conversation.accepted_items().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_is_an_error() {
        let (mut conversation, _) = inline_conversation(Vec::new());
        assert_eq!(
            conversation.accept_all("ai-404"),
            Err(ConversationError::UnknownMessage("ai-404".to_string()))
        );
        assert!(conversation.decline_item("ai-404", "x").is_err());
    }

    #[tokio::test]
    async fn test_next_send_closes_panel() {
        let (mut conversation, _) = inline_conversation(vec![
            step_with_items(),
            Ok(vec![Ok(Fragment::text("Noted."))]),
        ]);
        conversation.send_message("first").await.unwrap();
        assert!(conversation.open_panel().is_some());

        conversation.send_message("second").await.unwrap();
        assert_eq!(conversation.open_panel(), None);
        // The earlier items are still pending and can be shown again
        let first_ai = conversation.messages()[2].id.clone();
        assert_eq!(conversation.show_panel(&first_ai), Ok(true));
        assert_eq!(conversation.open_panel(), Some(first_ai.as_str()));
    }

    #[tokio::test]
    async fn test_on_demand_extraction_flow() {
        let mut conversation = on_demand_conversation(
            vec![Ok(vec![Ok(Fragment::text("Task: buy milk"))])],
            vec![Ok(json!({
                "tasks": ["buy milk"],
                "problems": [],
                "insights": [],
                "questions": []
            }))],
        );

        let outcome = conversation.send_message("groceries").await.unwrap();
        let id = outcome.message_id().to_string();
        assert!(conversation.message(&id).unwrap().is_extractable());
        assert_eq!(conversation.open_panel(), None);

        assert_eq!(conversation.extract(&id).await, Ok(1));
        let message = conversation.message(&id).unwrap();
        assert_eq!(message.extraction, ExtractionState::HasItems);
        assert_eq!(message.extracted_items.len(), 1);
        assert_eq!(message.extracted_items[0].category, ItemCategory::Tasks);
        assert_eq!(message.extracted_items[0].text, "buy milk");
        assert_eq!(conversation.open_panel(), Some(id.as_str()));

        // Extraction runs once per message
        assert_eq!(
            conversation.extract(&id).await,
            Err(ConversationError::NotExtractable(id.clone()))
        );
    }

    #[tokio::test]
    async fn test_on_demand_transport_error_degrades_to_no_items() {
        let mut conversation = on_demand_conversation(
            vec![Ok(vec![Ok(Fragment::text("Task: buy milk"))])],
            vec![Err(ModelError::Transport("offline".into()))],
        );
        let outcome = conversation.send_message("groceries").await.unwrap();
        let id = outcome.message_id().to_string();

        assert_eq!(conversation.extract(&id).await, Ok(0));
        let message = conversation.message(&id).unwrap();
        assert_eq!(message.extraction, ExtractionState::NoItems);
        assert!(!message.is_extraction_loading());
        assert!(!message.is_extractable());
        assert!(!message.failed);
        assert_eq!(conversation.open_panel(), None);
    }

    #[tokio::test]
    async fn test_begin_extraction_reports_loading() {
        let mut conversation = on_demand_conversation(
            vec![Ok(vec![Ok(Fragment::text("1. Plan:"))])],
            Vec::new(),
        );
        let outcome = conversation.send_message("x").await.unwrap();
        let id = outcome.message_id().to_string();

        let (ticket, transcript) = conversation.begin_extraction(&id).unwrap();
        assert_eq!(ticket.message_id, id);
        assert_eq!(transcript, "1. Plan:");
        assert!(conversation.message(&id).unwrap().is_extraction_loading());
        assert_eq!(
            conversation.begin_extraction(&id),
            Err(ConversationError::NotExtractable(id.clone()))
        );
    }

    #[tokio::test]
    async fn test_extraction_result_after_new_turn_keeps_panel_closed() {
        let mut conversation = on_demand_conversation(
            vec![
                Ok(vec![Ok(Fragment::text("Task: buy milk"))]),
                Ok(vec![Ok(Fragment::text("Anything else?"))]),
            ],
            Vec::new(),
        );
        let first = conversation.send_message("one").await.unwrap();
        let first_id = first.message_id().to_string();
        let (ticket, _) = conversation.begin_extraction(&first_id).unwrap();

        conversation.send_message("two").await.unwrap();

        let items = vec![ExtractedItem {
            id: "tasks-x".into(),
            category: ItemCategory::Tasks,
            text: "buy milk".into(),
        }];
        assert!(conversation.finish_extraction(ticket.clone(), items.clone()));
        let message = conversation.message(&first_id).unwrap();
        assert_eq!(message.extracted_items, items);
        assert_eq!(conversation.open_panel(), None);

        // A replayed ticket is stale
        assert!(!conversation.finish_extraction(ticket, Vec::new()));
        assert_eq!(conversation.message(&first_id).unwrap().extracted_items.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_requires_on_demand_mode() {
        let (mut conversation, _) = inline_conversation(vec![Ok(vec![Ok(Fragment::text("hi"))])]);
        assert_eq!(conversation.mode(), ExtractionMode::Inline);
        let outcome = conversation.send_message("x").await.unwrap();
        assert_eq!(
            conversation.extract(outcome.message_id()).await,
            Err(ConversationError::ExtractorUnavailable)
        );

        // with_extractor is ignored for inline conversations
        let session = ScriptedSession::new(Vec::new());
        let conversation = Conversation::new(Ok(session), ExtractionMode::Inline)
            .with_extractor(ScriptedGenerator::new(Vec::new()));
        assert!(conversation.extractor().is_none());
    }

    #[tokio::test]
    async fn test_on_demand_blank_reply_not_extractable() {
        let turns = vec![Ok(vec![Ok(Fragment::text("  "))])];
        let mut conversation = on_demand_conversation(turns, Vec::new());
        let outcome = conversation.send_message("x").await.unwrap();
        let message = conversation.message(outcome.message_id()).unwrap();
        assert_eq!(message.extraction, ExtractionState::None);
    }

    /// First send opens a stream that never yields; later sends reply "ok".
    #[derive(Default)]
    struct StallingSession {
        stalled: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ChatSession for StallingSession {
        async fn send_message_stream(
            &self,
            _message: &str,
        ) -> Result<crate::ai::FragmentStream, ModelError> {
            if self.stalled.swap(true, Ordering::SeqCst) {
                Ok(Box::pin(futures::stream::iter(vec![Ok(Fragment::text("ok"))])))
            } else {
                Ok(Box::pin(futures::stream::pending()))
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_turn_does_not_block_next_send() {
        let session: Arc<dyn ChatSession> = Arc::new(StallingSession::default());
        let mut conversation = Conversation::new(Ok(session), ExtractionMode::Inline);

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            conversation.send_message("first"),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(!conversation.is_loading());

        let outcome = conversation.send_message("second").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(conversation.message(outcome.message_id()).unwrap().text, "ok");
    }
}

//! Scripted model doubles shared by the crate's tests

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{ChatSession, FragmentStream, ModelError, StructuredGenerator};
use crate::streaming::Fragment;

/// Outcome of one scripted turn: either the send fails outright, or it opens
/// a stream that yields the given items in order.
pub(crate) type ScriptedTurn = Result<Vec<Result<Fragment, ModelError>>, ModelError>;

#[derive(Default)]
pub(crate) struct ScriptedSession {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub(crate) fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChatSession for ScriptedSession {
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream, ModelError> {
        self.sent.lock().push(message.to_string());
        let turn = self
            .turns
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted turn left".to_string())))?;
        Ok(Box::pin(futures::stream::iter(turn)))
    }
}

#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<Value, ModelError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(responses: Vec<Result<Value, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate_json(&self, prompt: &str, _schema: &Value) -> Result<Value, ModelError> {
        self.prompts.lock().push(prompt.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted response left".to_string())))
    }
}

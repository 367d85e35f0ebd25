//! Seams to the hosted model service.
//!
//! The conversation core only talks to [`ChatSession`] and
//! [`StructuredGenerator`]; [`GeminiClient`] is the production implementation.

pub mod gemini;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use futures::stream::BoxStream;
use serde_json::{json, Value};

use crate::constants::{ACTION_POINT_TOOL, SYSTEM_PROMPT, TOOL_CALL_POLICY};
use crate::extraction::ExtractionMode;
use crate::streaming::Fragment;

pub use gemini::GeminiClient;

/// Lazy, single-consumer sequence of reply fragments
pub type FragmentStream = BoxStream<'static, Result<Fragment, ModelError>>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream transport error: {0}")]
    Transport(String),
}

/// Function the model may call while generating a reply
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// Parameter schema in the model API's schema dialect
    pub parameters: Value,
}

impl ToolDeclaration {
    /// The action-point tool used for inline extraction
    pub fn action_point() -> Self {
        Self {
            name: ACTION_POINT_TOOL.to_string(),
            description: "Detect and extract all action points from the generated result. \
                Call this when your response contains tasks, problems, insights or questions."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "title": {
                        "type": "STRING",
                        "description": "The text of the action point without emojis or bullet markers."
                    },
                    "type": {
                        "type": "STRING",
                        "enum": ["TASK", "PROBLEM", "QUESTION", "INSIGHTS"],
                        "description": "The type of the action point."
                    }
                },
                "required": ["title", "type"]
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub tools: Vec<ToolDeclaration>,
}

impl SessionOptions {
    /// Inline extraction needs the action-point tool and the tool call policy
    /// in the prompt; on-demand sessions get neither.
    pub fn for_mode(mode: ExtractionMode) -> Self {
        match mode {
            ExtractionMode::Inline => Self {
                system_prompt: format!("{}{}", SYSTEM_PROMPT, TOOL_CALL_POLICY),
                tools: vec![ToolDeclaration::action_point()],
            },
            ExtractionMode::OnDemand => Self {
                system_prompt: SYSTEM_PROMPT.to_string(),
                tools: Vec::new(),
            },
        }
    }
}

/// A multi-turn chat with the model. The session owns its turn history.
#[async_trait::async_trait]
pub trait ChatSession: Send + Sync {
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream, ModelError>;
}

/// One-shot request whose reply is constrained to a JSON schema
#[async_trait::async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError>;
}

pub trait ModelService: Send + Sync {
    fn create_session(&self, options: SessionOptions) -> Result<Arc<dyn ChatSession>, ModelError>;
}

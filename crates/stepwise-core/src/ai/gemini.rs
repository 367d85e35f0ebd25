use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{
    ChatSession, FragmentStream, ModelError, ModelService, SessionOptions, StructuredGenerator,
};
use crate::config::CoreConfig;
use crate::streaming::{Fragment, StructuredCall};

/// Gemini REST API client
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &CoreConfig) -> Result<Self, ModelError> {
        let api_key = config.api_key.clone().ok_or(ModelError::MissingApiKey)?;
        Ok(Self {
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, self.model, method)
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }
        Ok(response)
    }
}

impl ModelService for GeminiClient {
    fn create_session(&self, options: SessionOptions) -> Result<Arc<dyn ChatSession>, ModelError> {
        tracing::debug!(model = %self.model, tools = options.tools.len(), "creating chat session");
        Ok(Arc::new(GeminiSession {
            client: self.clone(),
            options,
            history: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

#[async_trait::async_trait]
impl StructuredGenerator for GeminiClient {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError> {
        let body = json!({
            "contents": [user_content(prompt)],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        });

        let response: Value = self
            .post(&self.endpoint("generateContent"), &body)
            .await?
            .json()
            .await?;
        let text = candidate_text(&response).ok_or_else(|| {
            ModelError::MalformedResponse("no text part in first candidate".to_string())
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

struct GeminiSession {
    client: GeminiClient,
    options: SessionOptions,
    /// Completed turns, oldest first, in the API's `contents` shape
    history: Arc<Mutex<Vec<Value>>>,
}

impl GeminiSession {
    fn request_body(&self, contents: Vec<Value>) -> Value {
        build_request_body(&self.options, contents)
    }
}

#[async_trait::async_trait]
impl ChatSession for GeminiSession {
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream, ModelError> {
        let user_turn = user_content(message);
        let mut contents = self.history.lock().clone();
        contents.push(user_turn.clone());

        let url = format!("{}?alt=sse", self.client.endpoint("streamGenerateContent"));
        let response = self.client.post(&url, &self.request_body(contents)).await?;

        Ok(Box::pin(reply_stream(
            response,
            user_turn,
            self.history.clone(),
        )))
    }
}

/// Decode an SSE reply into fragments. Once the transport closes cleanly the
/// user turn and the reply text are appended to the session history.
///
/// Model turns in the history always carry text: a reply with no visible
/// text (only calls, blocked, or thoughts) leaves the history untouched.
fn reply_stream(
    response: reqwest::Response,
    user_turn: Value,
    history: Arc<Mutex<Vec<Value>>>,
) -> impl Stream<Item = Result<Fragment, ModelError>> + Send {
    try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut reply = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(ModelError::from)?;
            for payload in decoder.push(&chunk) {
                let fragment = decode_payload(&payload)?;
                if let Some(delta) = fragment.text_delta() {
                    reply.push_str(delta);
                }
                yield fragment;
            }
        }
        for payload in decoder.finish() {
            let fragment = decode_payload(&payload)?;
            if let Some(delta) = fragment.text_delta() {
                reply.push_str(delta);
            }
            yield fragment;
        }

        if reply.is_empty() {
            tracing::debug!("reply carried no text, not recorded in session history");
        } else {
            let mut history = history.lock();
            history.push(user_turn);
            history.push(json!({ "role": "model", "parts": [{ "text": reply }] }));
        }
    }
}

fn decode_payload(payload: &str) -> Result<Fragment, ModelError> {
    let value: Value = serde_json::from_str(payload).map_err(ModelError::from)?;
    Ok(fragment_from_response(&value))
}

fn user_content(text: &str) -> Value {
    json!({ "role": "user", "parts": [{ "text": text }] })
}

fn build_request_body(options: &SessionOptions, contents: Vec<Value>) -> Value {
    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": options.system_prompt }] },
        "contents": contents,
    });
    if !options.tools.is_empty() {
        let declarations: Vec<Value> = options
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    body
}

/// Turn one `GenerateContentResponse` into a fragment: text parts become the
/// delta, `functionCall` parts become structured calls.
fn fragment_from_response(response: &Value) -> Fragment {
    let mut fragment = Fragment::default();
    let Some(parts) = response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
    else {
        return fragment;
    };

    let mut text = String::new();
    for part in parts {
        if let Some(delta) = visible_text(part) {
            text.push_str(delta);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(|n| n.as_str()).unwrap_or_default();
            let args = call.get("args").cloned().unwrap_or(Value::Null);
            fragment.calls.push(StructuredCall::new(name, args));
        }
    }
    if !text.is_empty() {
        fragment.text = Some(text);
    }
    fragment
}

fn candidate_text(response: &Value) -> Option<String> {
    let parts = response.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts.iter().filter_map(visible_text).collect();
    (!text.is_empty()).then_some(text)
}

/// Text of a part, unless it is a thought summary
fn visible_text(part: &Value) -> Option<&str> {
    if part.get("thought").and_then(|t| t.as_bool()) == Some(true) {
        return None;
    }
    part.get("text").and_then(|t| t.as_str())
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks survive. Only `data:` fields are
/// kept; each blank line ends an event.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.feed_line(line.trim_end_matches(['\n', '\r']), &mut events);
        }
        events
    }

    fn finish(mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.feed_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn feed_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        if !payload.trim().is_empty() {
            events.push(payload);
        }
    }
}

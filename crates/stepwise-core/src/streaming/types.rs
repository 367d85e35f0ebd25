use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured call emitted by the model alongside its text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredCall {
    #[serde(default)]
    pub name: String,
    /// Arguments as sent by the model. Nothing about their shape is trusted.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl StructuredCall {
    /// Build a call from raw arguments. Non-object arguments are dropped.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }

    /// String argument by key, if present and actually a string
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key)?.as_str()
    }
}

/// One incremental unit of a streamed model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub text: Option<String>,
    pub calls: Vec<StructuredCall>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            calls: Vec::new(),
        }
    }

    pub fn calls(calls: Vec<StructuredCall>) -> Self {
        Self { text: None, calls }
    }

    /// Text delta carried by this fragment, if any. Empty deltas count as none.
    pub fn text_delta(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

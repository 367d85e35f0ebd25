use futures::{Stream, StreamExt};

use super::{Fragment, StructuredCall};
use crate::ai::ModelError;

/// Everything a fully drained reply stream produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnTranscript {
    pub text: String,
    pub calls: Vec<StructuredCall>,
}

/// Accumulates the fragments of one streamed reply.
///
/// Text deltas are concatenated in arrival order; structured calls are
/// collected and only handed out once the stream is finished.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<StructuredCall>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment in. Returns the updated transcript when the fragment
    /// carried text, so the caller can publish it.
    pub fn push(&mut self, fragment: Fragment) -> Option<&str> {
        let Fragment { text, calls } = fragment;
        self.calls.extend(calls);

        match text {
            Some(delta) if !delta.is_empty() => {
                self.text.push_str(&delta);
                Some(self.text.as_str())
            }
            _ => None,
        }
    }

    pub fn finish(self) -> TurnTranscript {
        TurnTranscript {
            text: self.text,
            calls: self.calls,
        }
    }

    /// Drain a fragment stream to completion, calling `on_text` with the full
    /// transcript after every text fragment.
    ///
    /// The first stream error aborts the drain; whatever calls were collected
    /// so far are dropped with the accumulator.
    pub async fn drain<S, F>(stream: S, mut on_text: F) -> Result<TurnTranscript, ModelError>
    where
        S: Stream<Item = Result<Fragment, ModelError>>,
        F: FnMut(&str),
    {
        let mut acc = Self::new();
        futures::pin_mut!(stream);

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            for call in &fragment.calls {
                tracing::debug!(
                    tool = %call.name,
                    args = %serde_json::Value::Object(call.args.clone()),
                    "structured call received"
                );
            }
            if let Some(text) = acc.push(fragment) {
                on_text(text);
            }
        }

        tracing::debug!(
            chars = acc.text.len(),
            calls = acc.calls.len(),
            "reply stream drained"
        );
        Ok(acc.finish())
    }
}

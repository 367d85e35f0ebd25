//! Turning assistant replies into categorized action items

mod inline;
mod on_demand;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use inline::classify_calls;
pub use on_demand::{extraction_schema, ExtractionPayload, OnDemandExtractor};

/// How a conversation extracts items. Fixed for the conversation's lifetime so
/// inline and on-demand results never compete for the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// Classify action-point tool calls emitted during the reply
    #[default]
    Inline,
    /// Run a second structured request when the user asks for it
    OnDemand,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(ExtractionMode::Inline),
            "on-demand" | "ondemand" | "on_demand" => Ok(ExtractionMode::OnDemand),
            other => Err(format!(
                "unknown extraction mode '{}' (expected 'inline' or 'on-demand')",
                other
            )),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Inline => f.write_str("inline"),
            ExtractionMode::OnDemand => f.write_str("on-demand"),
        }
    }
}

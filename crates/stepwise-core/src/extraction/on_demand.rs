use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::{ModelError, StructuredGenerator};
use crate::constants::EXTRACTION_PROMPT;
use crate::ids::IdGenerator;
use crate::models::{ExtractedItem, ItemCategory};

/// Reply shape of the secondary extraction request. All four arrays must be
/// present for the reply to count as valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPayload {
    pub tasks: Vec<String>,
    pub problems: Vec<String>,
    pub insights: Vec<String>,
    pub questions: Vec<String>,
}

impl ExtractionPayload {
    /// Flatten into items in category display order, skipping blank entries.
    pub fn into_items(self, ids: &IdGenerator) -> Vec<ExtractedItem> {
        let groups = [
            (ItemCategory::Tasks, self.tasks),
            (ItemCategory::Problems, self.problems),
            (ItemCategory::Insights, self.insights),
            (ItemCategory::Questions, self.questions),
        ];

        groups
            .into_iter()
            .flat_map(|(category, texts)| {
                texts.into_iter().filter_map(move |text| {
                    let text = text.trim();
                    (!text.is_empty()).then(|| (category, text.to_string()))
                })
            })
            .map(|(category, text)| ExtractedItem {
                id: ids.next_id(category.as_str()),
                category,
                text,
            })
            .collect()
    }
}

/// Response schema sent with the extraction request
pub fn extraction_schema() -> Value {
    let string_array = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "tasks": string_array,
            "problems": string_array,
            "insights": string_array,
            "questions": string_array,
        },
        "required": ["tasks", "problems", "insights", "questions"]
    })
}

/// Runs the secondary structured request for one assistant message.
#[derive(Clone)]
pub struct OnDemandExtractor {
    generator: Arc<dyn StructuredGenerator>,
    ids: Arc<IdGenerator>,
}

impl OnDemandExtractor {
    pub fn new(generator: Arc<dyn StructuredGenerator>, ids: Arc<IdGenerator>) -> Self {
        Self { generator, ids }
    }

    /// Extract items from a transcript. Failures never propagate: a failed
    /// request or an unparseable reply both yield an empty list.
    pub async fn extract(&self, transcript: &str) -> Vec<ExtractedItem> {
        if transcript.trim().is_empty() {
            return Vec::new();
        }
        match self.request(transcript).await {
            Ok(payload) => payload.into_items(&self.ids),
            Err(e) => {
                tracing::warn!("On-demand extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn request(&self, transcript: &str) -> Result<ExtractionPayload, ModelError> {
        let prompt = format!("{}{}", EXTRACTION_PROMPT, transcript);
        let reply = self
            .generator
            .generate_json(&prompt, &extraction_schema())
            .await?;
        Ok(serde_json::from_value(reply)?)
    }
}

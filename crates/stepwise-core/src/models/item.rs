use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Tasks,
    Problems,
    Insights,
    Questions,
}

impl ItemCategory {
    /// Display order used when presenting grouped items
    pub const ALL: [ItemCategory; 4] = [
        ItemCategory::Tasks,
        ItemCategory::Problems,
        ItemCategory::Insights,
        ItemCategory::Questions,
    ];

    /// Map an action-point type tag (TASK, PROBLEM, INSIGHTS, QUESTION) to a
    /// category. Matching ignores case; any other tag maps to nothing.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_uppercase().as_str() {
            "TASK" => Some(ItemCategory::Tasks),
            "PROBLEM" => Some(ItemCategory::Problems),
            "INSIGHTS" => Some(ItemCategory::Insights),
            "QUESTION" => Some(ItemCategory::Questions),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Tasks => "tasks",
            ItemCategory::Problems => "problems",
            ItemCategory::Insights => "insights",
            ItemCategory::Questions => "questions",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ItemCategory::Tasks => "Tasks",
            ItemCategory::Problems => "Problems",
            ItemCategory::Insights => "Insights",
            ItemCategory::Questions => "Questions",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ItemCategory::Tasks => "✅",
            ItemCategory::Problems => "⚠️",
            ItemCategory::Insights => "🎯",
            ItemCategory::Questions => "❓",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub id: String,
    pub category: ItemCategory,
    pub text: String,
}

/// Group items by category in display order, skipping empty categories.
/// Items keep their relative order inside each group.
pub fn group_by_category(items: &[ExtractedItem]) -> Vec<(ItemCategory, Vec<&ExtractedItem>)> {
    ItemCategory::ALL
        .iter()
        .filter_map(|category| {
            let group: Vec<&ExtractedItem> =
                items.iter().filter(|i| i.category == *category).collect();
            (!group.is_empty()).then_some((*category, group))
        })
        .collect()
}

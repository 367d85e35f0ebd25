use crate::constants::ACTION_POINT_TOOL;
use crate::ids::IdGenerator;
use crate::models::{ExtractedItem, ItemCategory};
use crate::streaming::StructuredCall;

/// Classify collected structured calls into items, keeping call order.
///
/// A call yields an item only when `title` and `type` are both non-empty
/// strings and `type` maps to a known category. Everything else is dropped
/// without error.
pub fn classify_calls(calls: &[StructuredCall], ids: &IdGenerator) -> Vec<ExtractedItem> {
    calls
        .iter()
        .filter_map(|call| {
            if call.name != ACTION_POINT_TOOL {
                tracing::debug!(tool = %call.name, "classifying call from unexpected tool");
            }
            let title = call.str_arg("title").map(str::trim).filter(|t| !t.is_empty())?;
            let tag = call.str_arg("type").filter(|t| !t.trim().is_empty())?;
            let Some(category) = ItemCategory::from_tag(tag) else {
                tracing::debug!(tag, "dropping action point with unmapped type");
                return None;
            };
            Some(ExtractedItem {
                id: ids.next_id(category.as_str()),
                category,
                text: title.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ap(title: serde_json::Value, tag: serde_json::Value) -> StructuredCall {
        StructuredCall::new(ACTION_POINT_TOOL, json!({ "title": title, "type": tag }))
    }

    #[test]
    fn test_maps_every_known_tag() {
        let ids = IdGenerator::new();
        let calls = vec![
            ap(json!("Hire designer"), json!("TASK")),
            ap(json!("Budget is tight"), json!("problem")),
            ap(json!("Users want speed"), json!("Insights")),
            ap(json!("Who owns QA?"), json!("question")),
        ];
        let items = classify_calls(&calls, &ids);
        let categories: Vec<_> = items.iter().map(|i| i.category).collect();
        assert_eq!(categories, ItemCategory::ALL.to_vec());
        assert_eq!(items[0].text, "Hire designer");
        assert!(items[0].id.starts_with("tasks-"));
        assert!(items[3].id.starts_with("questions-"));
    }

    #[test]
    fn test_drops_invalid_calls_and_keeps_order() {
        let ids = IdGenerator::new();
        let calls = vec![
            ap(json!("first"), json!("TASK")),
            ap(json!(""), json!("TASK")),
            ap(json!("   "), json!("TASK")),
            ap(json!("no type"), json!(null)),
            ap(json!(12), json!("TASK")),
            ap(json!("bad tag"), json!("INSIGHT")),
            ap(json!("empty tag"), json!("")),
            StructuredCall::new(ACTION_POINT_TOOL, json!({ "title": "missing type" })),
            StructuredCall::new(ACTION_POINT_TOOL, json!("garbage")),
            ap(json!("second"), json!("Question")),
        ];
        let items = classify_calls(&calls, &ids);
        let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_count_matches_valid_calls() {
        let ids = IdGenerator::new();
        let tags = ["TASK", "RISK", "PROBLEM", "Task", "NOTE", "INSIGHTS"];
        let calls: Vec<_> = tags
            .iter()
            .enumerate()
            .map(|(i, tag)| ap(json!(format!("item {}", i)), json!(tag)))
            .collect();
        let expected = tags
            .iter()
            .filter(|t| ItemCategory::from_tag(t).is_some())
            .count();
        assert_eq!(classify_calls(&calls, &ids).len(), expected);
        assert_eq!(expected, 4);
    }

    #[test]
    fn test_item_ids_are_unique() {
        let ids = IdGenerator::new();
        let calls: Vec<_> = (0..5).map(|_| ap(json!("same"), json!("TASK"))).collect();
        let items = classify_calls(&calls, &ids);
        let mut seen: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_title_is_trimmed() {
        let ids = IdGenerator::new();
        let items = classify_calls(&[ap(json!("  Call vendor \n"), json!("TASK"))], &ids);
        assert_eq!(items[0].text, "Call vendor");
    }
}

//! Line-level structure of assistant replies.
//!
//! Replies follow the step format from the system prompt: a numbered step
//! title, emoji-marked category headers, bullet lists and a closing block of
//! suggestions. Front ends render each block differently.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::ItemCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `✅ Tasks:` and friends, with the marker removed
    CategoryHeader { category: ItemCategory, label: String },
    /// `2. **Market research**:` with the number and bold markers removed
    StepTitle(String),
    ListItem(String),
    Rule,
    /// Lines opening with 💬, 📋 or 🏁
    Suggestion(String),
    Paragraph(String),
}

struct Patterns {
    headers: [(ItemCategory, Regex); 4],
    step_title: Regex,
    step_number: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        headers: [
            (ItemCategory::Tasks, header_regex("✅", "tasks?")),
            (ItemCategory::Problems, header_regex("⚠\u{FE0F}?", "problems?")),
            (ItemCategory::Insights, header_regex("🎯", "insights?")),
            (ItemCategory::Questions, header_regex("❓", "questions?")),
        ],
        step_title: Regex::new(r"^\d+\.\s.*:$").unwrap(),
        step_number: Regex::new(r"^\d+\.\s*").unwrap(),
    })
}

fn header_regex(marker: &str, word: &str) -> Regex {
    Regex::new(&format!(r"(?i)^({})\s*({}:.*)$", marker, word)).unwrap()
}

/// Split a reply into display blocks. Blank lines are dropped.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(classify_line)
        .collect()
}

fn classify_line(line: &str) -> Block {
    let patterns = patterns();

    for (category, regex) in &patterns.headers {
        if let Some(caps) = regex.captures(line) {
            return Block::CategoryHeader {
                category: *category,
                label: caps[2].to_string(),
            };
        }
    }

    if patterns.step_title.is_match(line) {
        let title = patterns.step_number.replace(line, "").replace("**", "");
        return Block::StepTitle(title);
    }

    if let Some(item) = line.strip_prefix("- ") {
        return Block::ListItem(item.to_string());
    }

    if line.trim() == "---" {
        return Block::Rule;
    }

    if ["💬", "📋", "🏁"].iter().any(|m| line.starts_with(m)) {
        return Block::Suggestion(line.to_string());
    }

    Block::Paragraph(line.to_string())
}

use stepwise_core::models::group_by_category;
use stepwise_core::transcript::{parse_blocks, Block};
use stepwise_core::{ExtractedItem, ExtractionState, ItemCategory, Message, Sender};

use crate::{BLUE, CYAN, DIM, GREEN, MAGENTA, RED, RESET, WHITE_BOLD, YELLOW};

pub(crate) fn category_color(category: ItemCategory) -> &'static str {
    match category {
        ItemCategory::Tasks => GREEN,
        ItemCategory::Problems => YELLOW,
        ItemCategory::Insights => BLUE,
        ItemCategory::Questions => MAGENTA,
    }
}

/// Header line printed above a message body.
pub(crate) fn message_header(message: &Message) -> String {
    let (color, who) = match message.sender {
        Sender::User => (CYAN, "You"),
        Sender::Ai => (WHITE_BOLD, "Assistant"),
    };
    format!("{color}{who}{RESET} {DIM}{} · {}{RESET}", message.timestamp, message.id)
}

/// Render a finished message, styling assistant replies block by block.
pub(crate) fn render_message(message: &Message) -> String {
    let mut out = message_header(message);
    out.push('\n');

    if message.failed {
        out.push_str(&format!("{RED}{}{RESET}", message.text));
        return out;
    }
    if message.sender == Sender::User {
        out.push_str(&message.text);
        return out;
    }

    let lines: Vec<String> = parse_blocks(&message.text).iter().map(render_block).collect();
    out.push_str(&lines.join("\n"));
    if let Some(hint) = extraction_hint(message) {
        out.push('\n');
        out.push_str(&hint);
    }
    out
}

fn render_block(block: &Block) -> String {
    match block {
        Block::CategoryHeader { category, label } => {
            let color = category_color(*category);
            format!("{color}{} {label}{RESET}", category.marker())
        }
        Block::StepTitle(title) => format!("{WHITE_BOLD}{title}{RESET}"),
        Block::ListItem(item) => format!("  • {item}"),
        Block::Rule => format!("{DIM}{}{RESET}", "─".repeat(40)),
        Block::Suggestion(text) => format!("{CYAN}{text}{RESET}"),
        Block::Paragraph(text) => text.clone(),
    }
}

/// One-line status of a message's extraction, if there is anything to say.
pub(crate) fn extraction_hint(message: &Message) -> Option<String> {
    let hint = match message.extraction {
        ExtractionState::None => return None,
        ExtractionState::Extractable => {
            format!("{DIM}(/extract {} to detect action items){RESET}", message.id)
        }
        ExtractionState::Extracting => format!("{DIM}Extracting action items...{RESET}"),
        ExtractionState::HasItems => format!(
            "{DIM}{} item(s) detected. /items {} to review{RESET}",
            message.extracted_items.len(),
            message.id
        ),
        ExtractionState::NoItems => format!("{DIM}No pending action items.{RESET}"),
        ExtractionState::Accepted => format!("{GREEN}Items accepted.{RESET}"),
    };
    Some(hint)
}

fn render_grouped(items: &[ExtractedItem]) -> String {
    let mut out = String::new();
    for (category, group) in group_by_category(items) {
        let color = category_color(category);
        out.push_str(&format!(
            "{color}{} {} ({}){RESET}\n",
            category.marker(),
            category.title(),
            group.len()
        ));
        for item in group {
            out.push_str(&format!("  • {}  {DIM}[{}]{RESET}\n", item.text, item.id));
        }
    }
    out
}

/// The item panel for one message: pending items grouped by category.
pub(crate) fn render_items_panel(message: &Message) -> String {
    let mut out = format!(
        "{WHITE_BOLD}Detected elements ({}){RESET}\n",
        message.extracted_items.len()
    );
    out.push_str(&render_grouped(&message.extracted_items));
    out.push_str(&format!(
        "{DIM}/accept {id} to keep all · /decline <item-id> {id} to drop one{RESET}",
        id = message.id
    ));
    out
}

pub(crate) fn render_accepted(items: &[ExtractedItem]) -> String {
    if items.is_empty() {
        return format!("{DIM}No accepted items yet.{RESET}");
    }
    let mut out = format!("{WHITE_BOLD}Accepted items ({}){RESET}\n", items.len());
    out.push_str(render_grouped(items).trim_end());
    out
}

pub(crate) fn help_text() -> String {
    [
        format!("{WHITE_BOLD}Commands{RESET}"),
        "  <text>                          send a message".to_string(),
        "  /extract [message-id]           detect action items in a reply".to_string(),
        "  /items [message-id]             show pending items".to_string(),
        "  /accept [message-id]            accept all pending items".to_string(),
        "  /decline <item-id> [message-id] drop one pending item".to_string(),
        "  /accepted                       list accepted items".to_string(),
        "  /show [message-id]              re-render a message".to_string(),
        "  /help                           this help".to_string(),
        "  /quit                           exit".to_string(),
    ]
    .join("\n")
}

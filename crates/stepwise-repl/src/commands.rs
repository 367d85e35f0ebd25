/// A parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Send(String),
    Extract(Option<String>),
    Items(Option<String>),
    Accept(Option<String>),
    Decline {
        item_id: String,
        message_id: Option<String>,
    },
    Accepted,
    Show(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`; anything not starting
/// with `/` is a message for the assistant.
pub(crate) fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let first = parts.next().map(str::to_string);
    let second = parts.next().map(str::to_string);

    let command = match name.as_str() {
        "extract" | "e" => Command::Extract(first),
        "items" | "i" => Command::Items(first),
        "accept" | "a" => Command::Accept(first),
        "decline" | "d" => match first {
            Some(item_id) => Command::Decline {
                item_id,
                message_id: second,
            },
            None => Command::Unknown("usage: /decline <item-id> [message-id]".to_string()),
        },
        "accepted" => Command::Accepted,
        "show" | "s" => Command::Show(first),
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Unknown(format!("unknown command: /{}", other)),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_send() {
        assert_eq!(
            parse_command("  open a bakery  "),
            Some(Command::Send("open a bakery".to_string()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_commands_with_optional_ids() {
        assert_eq!(parse_command("/extract"), Some(Command::Extract(None)));
        assert_eq!(
            parse_command("/accept ai-4"),
            Some(Command::Accept(Some("ai-4".to_string())))
        );
        assert_eq!(parse_command("/ITEMS"), Some(Command::Items(None)));
        assert_eq!(parse_command("/q"), Some(Command::Quit));
    }

    #[test]
    fn test_decline_requires_item() {
        assert_eq!(
            parse_command("/decline tasks-7 ai-4"),
            Some(Command::Decline {
                item_id: "tasks-7".to_string(),
                message_id: Some("ai-4".to_string()),
            })
        );
        assert!(matches!(parse_command("/decline"), Some(Command::Unknown(_))));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("/frobnicate"),
            Some(Command::Unknown("unknown command: /frobnicate".to_string()))
        );
    }
}

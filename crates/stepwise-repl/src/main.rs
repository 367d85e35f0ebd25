mod commands;
mod format;
mod render;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stepwise_core::ai::{
    ChatSession, GeminiClient, ModelError, ModelService, SessionOptions, StructuredGenerator,
};
use stepwise_core::conversation::ExtractionTicket;
use stepwise_core::tracing_setup::init_tracing;
use stepwise_core::{Conversation, ConversationEvent, CoreConfig, ExtractedItem, ExtractionMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use commands::{parse_command, Command};
use format::{help_text, render_accepted, render_items_panel, render_message};
use render::EventPrinter;

pub(crate) const CYAN: &str = "\x1b[36m";
pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const YELLOW: &str = "\x1b[33m";
pub(crate) const BLUE: &str = "\x1b[34m";
pub(crate) const MAGENTA: &str = "\x1b[35m";
pub(crate) const RED: &str = "\x1b[31m";
pub(crate) const WHITE_BOLD: &str = "\x1b[1;37m";
pub(crate) const DIM: &str = "\x1b[2m";
pub(crate) const RESET: &str = "\x1b[0m";

type ExtractionResult = (ExtractionTicket, Vec<ExtractedItem>);

#[derive(Parser, Debug)]
#[command(name = "stepwise-repl")]
#[command(about = "Step-by-step project planning assistant in the terminal")]
struct Args {
    /// API key for the model service (prefer STEPWISE_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Model name, e.g. gemini-2.5-flash
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    api_base: Option<String>,

    /// How action items are detected: inline or on-demand
    #[arg(long)]
    extraction: Option<ExtractionMode>,
}

fn resolve_config(args: &Args) -> CoreConfig {
    let mut config = CoreConfig::from_env();
    if let Some(key) = args.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        config = config.with_api_key(key);
    }
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    if let Some(base) = &args.api_base {
        config = config.with_api_base(base);
    }
    if let Some(mode) = args.extraction {
        config = config.with_extraction_mode(mode);
    }
    config
}

fn build_conversation(config: &CoreConfig) -> Conversation {
    let mode = config.extraction_mode;
    let (session, generator): (
        Result<Arc<dyn ChatSession>, ModelError>,
        Option<Arc<dyn StructuredGenerator>>,
    ) = match GeminiClient::new(config) {
        Ok(client) => {
            let session = client.create_session(SessionOptions::for_mode(mode));
            let generator: Arc<dyn StructuredGenerator> = Arc::new(client);
            (session, Some(generator))
        }
        Err(e) => (Err(e), None),
    };

    let conversation = Conversation::new(session, mode);
    match generator {
        Some(generator) => conversation.with_extractor(generator),
        None => conversation,
    }
}

fn prompt() {
    print!("{CYAN}› {RESET}");
    let _ = io::stdout().flush();
}

fn drain_events(events: &mut UnboundedReceiver<ConversationEvent>, printer: &mut EventPrinter) {
    while let Ok(event) = events.try_recv() {
        printer.handle(&event);
    }
}

/// Send one message and print the reply while it streams.
async fn run_turn(
    conversation: &mut Conversation,
    events: &mut UnboundedReceiver<ConversationEvent>,
    printer: &mut EventPrinter,
    text: &str,
) {
    let send = conversation.send_message(text);
    tokio::pin!(send);
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            Some(event) = events.recv() => printer.handle(&event),
        }
    };
    drain_events(events, printer);
    printer.end_stream();

    if let Err(e) = result {
        println!("{RED}{e}{RESET}");
    }
}

/// Pick the message a command refers to: the explicit id, else the message
/// whose panel is open, else the latest assistant reply.
fn target_message(conversation: &Conversation, explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| conversation.open_panel().map(str::to_string))
        .or_else(|| conversation.latest_ai_message().map(|m| m.id.clone()))
}

fn item_owner(conversation: &Conversation, item_id: &str) -> Option<String> {
    conversation
        .messages()
        .iter()
        .find(|m| m.extracted_items.iter().any(|item| item.id == item_id))
        .map(|m| m.id.clone())
}

fn start_extraction(
    conversation: &mut Conversation,
    message_id: &str,
    results: &UnboundedSender<ExtractionResult>,
) -> Result<(), stepwise_core::ConversationError> {
    let extractor = conversation
        .extractor()
        .ok_or(stepwise_core::ConversationError::ExtractorUnavailable)?;
    let (ticket, transcript) = conversation.begin_extraction(message_id)?;
    let results = results.clone();
    tokio::spawn(async move {
        let items = extractor.extract(&transcript).await;
        let _ = results.send((ticket, items));
    });
    Ok(())
}

/// Handle one command. Returns false when the user asked to quit.
async fn handle_command(
    command: Command,
    conversation: &mut Conversation,
    events: &mut UnboundedReceiver<ConversationEvent>,
    printer: &mut EventPrinter,
    results: &UnboundedSender<ExtractionResult>,
) -> bool {
    match command {
        Command::Quit => return false,
        Command::Send(text) => run_turn(conversation, events, printer, &text).await,
        Command::Help => println!("{}", help_text()),
        Command::Unknown(reason) => println!("{YELLOW}{reason}{RESET} {DIM}(/help){RESET}"),
        Command::Accepted => println!("{}", render_accepted(conversation.accepted_items())),
        Command::Extract(_) if conversation.mode() == ExtractionMode::Inline => {
            println!("{DIM}Inline mode detects items as replies stream.{RESET}");
        }
        Command::Extract(id) => {
            let explicit = id.or_else(|| conversation.latest_ai_message().map(|m| m.id.clone()));
            match explicit {
                Some(id) => {
                    if let Err(e) = start_extraction(conversation, &id, results) {
                        println!("{YELLOW}{e}{RESET}");
                    }
                }
                None => println!("{DIM}Nothing to extract yet.{RESET}"),
            }
        }
        Command::Items(id) => match target_message(conversation, id) {
            Some(id) => match conversation.show_panel(&id) {
                Ok(true) => {
                    if let Some(message) = conversation.message(&id) {
                        println!("{}", render_items_panel(message));
                    }
                }
                Ok(false) => println!("{DIM}No pending items on {id}.{RESET}"),
                Err(e) => println!("{YELLOW}{e}{RESET}"),
            },
            None => println!("{DIM}No messages with items.{RESET}"),
        },
        Command::Accept(id) => match target_message(conversation, id) {
            Some(id) => match conversation.accept_all(&id) {
                Ok(0) => println!("{DIM}Nothing to accept on {id}.{RESET}"),
                Ok(count) => println!("{GREEN}Accepted {count} item(s).{RESET}"),
                Err(e) => println!("{YELLOW}{e}{RESET}"),
            },
            None => println!("{DIM}Nothing to accept.{RESET}"),
        },
        Command::Decline { item_id, message_id } => {
            match message_id.or_else(|| item_owner(conversation, &item_id)) {
                Some(id) => match conversation.decline_item(&id, &item_id) {
                    Ok(Some(item)) => println!("{DIM}Declined: {}{RESET}", item.text),
                    Ok(None) => println!("{DIM}No pending item {item_id} on {id}.{RESET}"),
                    Err(e) => println!("{YELLOW}{e}{RESET}"),
                },
                None => println!("{DIM}No pending item {item_id}.{RESET}"),
            }
        }
        Command::Show(id) => {
            let id = id.or_else(|| conversation.latest_ai_message().map(|m| m.id.clone()));
            match id.as_deref().and_then(|id| conversation.message(id)) {
                Some(message) => println!("{}", render_message(message)),
                None => println!("{DIM}No such message.{RESET}"),
            }
        }
    }
    drain_events(events, printer);
    true
}

async fn run_repl(mut conversation: Conversation) -> Result<()> {
    let mut events = conversation.subscribe();
    let mut printer = EventPrinter::new();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<ExtractionResult>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for message in conversation.messages() {
        println!("{}\n", render_message(message));
    }
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if let Some(command) = parse_command(&line) {
                    let keep_going = handle_command(
                        command,
                        &mut conversation,
                        &mut events,
                        &mut printer,
                        &results_tx,
                    )
                    .await;
                    if !keep_going {
                        break;
                    }
                }
                prompt();
            }
            Some((ticket, items)) = results_rx.recv() => {
                println!();
                conversation.finish_extraction(ticket, items);
                drain_events(&mut events, &mut printer);
                prompt();
            }
        }
    }

    tracing::debug!(session = %conversation.session_id(), "repl exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("stepwise-repl")?;

    let config = resolve_config(&args);
    tracing::info!(model = %config.model, mode = %config.extraction_mode, "starting");

    println!(
        "{WHITE_BOLD}stepwise{RESET} {DIM}{} · {} extraction · /help for commands{RESET}\n",
        config.model, config.extraction_mode
    );

    let conversation = build_conversation(&config);
    run_repl(conversation).await
}

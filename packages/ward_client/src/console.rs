//! Console Front End
//!
//! Thin presentation glue: parses operator input lines and prints render
//! instructions. No synchronization logic lives here: the dispatcher hands
//! over complete instructions and this module only draws them.

use crate::render::RenderEvent;
use crate::store::ChatEntry;

/// Operator actions parsed from one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/select <id>`: focus a conversation.
    Select(String),
    /// `/open <id>`: open a conversation with an active peer.
    Open(String),
    /// Anything that is not a command: send to the selection.
    Send(String),
    Quit,
    Help,
}

/// `None` for blank input; unknown `/` commands map to [`Command::Help`].
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix("/select ") {
        return Some(Command::Select(rest.trim().to_string()));
    }
    if let Some(rest) = line.strip_prefix("/open ") {
        return Some(Command::Open(rest.trim().to_string()));
    }
    match line {
        "/quit" | "/q" => Some(Command::Quit),
        _ if line.starts_with('/') => Some(Command::Help),
        _ => Some(Command::Send(line.to_string())),
    }
}

pub fn print_help() {
    println!("commands:");
    println!("  /select <id>   focus a conversation");
    println!("  /open <id>     open a conversation with an available peer");
    println!("  /quit          exit");
    println!("  anything else  send to the focused conversation");
}

/// Draw one render instruction.
pub fn render(event: &RenderEvent) {
    match event {
        RenderEvent::PresenceChanged { id, online } => {
            println!("* {} is {}", id, if *online { "online" } else { "offline" });
        }
        RenderEvent::EntryAppended { entry } => print_entry(entry),
        RenderEvent::HistoryRedraw { id, entries } => {
            println!("--- {} ---", id);
            if entries.is_empty() {
                println!("  (no messages yet)");
            }
            for entry in entries {
                print_entry(entry);
            }
        }
        RenderEvent::HistoryPending { id } => {
            println!("loading history for {}...", id);
        }
        RenderEvent::PeerAvailable { profile } => {
            println!(
                "* Dr. {} is available ({}) -- /open {}",
                profile.name,
                profile.qualifications.join(", "),
                profile.id
            );
        }
        RenderEvent::PeerRemoved { id } => {
            println!("* {} left", id);
        }
        RenderEvent::ConversationAdded { conversation } => {
            println!(
                "* conversation opened with {} -- /select {}",
                conversation.name, conversation.id
            );
        }
    }
}

fn print_entry(entry: &ChatEntry) {
    if entry.from_self {
        println!("  you> {}", entry.message);
    } else {
        println!("  {}> {}", entry.conversation_id, entry.message);
    }
}

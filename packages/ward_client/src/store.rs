//! Client State Store
//!
//! Owns the conversation roster and the per-conversation history cache. The
//! store is constructed at session start, handed to the dispatcher, and torn
//! down with it; nothing else mutates it. Mutations report whether a visible
//! change occurred so callers can decide whether to notify the renderer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A durable, operator-opened messaging relationship with a peer. Created
/// from the roster or by promoting an active peer; never deleted once opened
/// (disconnects only flip `online`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub online: bool,
}

/// One chat message in a conversation's history sequence.
///
/// `id` and `time` are `None` for a locally-echoed entry the remote side has
/// not acknowledged; there is no later backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: Option<i64>,
    pub conversation_id: String,
    pub message: String,
    pub from_self: bool,
    pub time: Option<String>,
}

impl ChatEntry {
    /// The optimistic entry appended when the operator sends a message.
    pub fn local_echo(conversation_id: &str, message: &str) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
            from_self: true,
            time: None,
        }
    }
}

/// In-memory view of conversations and chat history, keyed by peer id.
#[derive(Debug, Default)]
pub struct StateStore {
    conversations: HashMap<String, Conversation>,
    histories: HashMap<String, Vec<ChatEntry>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a conversation by id. A fresh insert also creates
    /// the empty history sequence, so selecting a brand-new conversation
    /// renders explicit-empty rather than pending.
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        self.histories.entry(conversation.id.clone()).or_default();
        self.conversations
            .insert(conversation.id.clone(), conversation);
    }

    /// Flip a conversation's online flag. Returns `false` when the id is
    /// unknown or the flag already holds the requested value, so callers can
    /// skip redundant UI churn.
    pub fn set_online(&mut self, id: &str, online: bool) -> bool {
        match self.conversations.get_mut(id) {
            Some(c) if c.online != online => {
                c.online = online;
                true
            }
            _ => false,
        }
    }

    /// Append to a conversation's history, creating the sequence if absent.
    /// Histories are append-only after session start.
    pub fn append_entry(&mut self, id: &str, entry: ChatEntry) {
        self.histories.entry(id.to_string()).or_default().push(entry);
    }

    /// Replace a conversation's history wholesale. Session bootstrap only.
    pub fn load_history(&mut self, id: &str, entries: Vec<ChatEntry>) {
        self.histories.insert(id.to_string(), entries);
    }

    /// Remove a conversation and its history sequence entirely. Returns
    /// whether the conversation existed.
    pub fn remove_conversation(&mut self, id: &str) -> bool {
        let existed = self.conversations.remove(id).is_some();
        self.histories.remove(id);
        existed
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// History in arrival order, or `None` when no sequence has been loaded
    /// for this id yet (distinct from a loaded-but-empty sequence).
    pub fn history(&self, id: &str) -> Option<&[ChatEntry]> {
        self.histories.get(id).map(Vec::as_slice)
    }

    /// Number of known conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Conversations in no particular order (the renderer sorts).
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }
}

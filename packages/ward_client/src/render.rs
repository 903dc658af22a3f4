//! Render Instructions
//!
//! Everything the rendering collaborator consumes. Each event is a complete
//! instruction: the consumer draws, it never synchronizes.

use crate::api::PeerProfile;
use crate::store::{ChatEntry, Conversation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// A known conversation changed presence. Emitted only on actual change.
    PresenceChanged { id: String, online: bool },
    /// Append one entry to the visible pane. Emitted for the selected
    /// conversation and for the local echo of an outbound message.
    EntryAppended { entry: ChatEntry },
    /// Clear the pane and redraw this conversation's history in arrival
    /// order. An empty `entries` is an explicit empty state.
    HistoryRedraw {
        id: String,
        entries: Vec<ChatEntry>,
    },
    /// History for this id has not been loaded; show a waiting state, not
    /// an empty one.
    HistoryPending { id: String },
    /// A previously-unseen peer connected and its profile resolved; it can
    /// now be opened by the operator.
    PeerAvailable { profile: PeerProfile },
    /// An unopened peer disconnected and was discarded.
    PeerRemoved { id: String },
    /// An active peer was promoted to a durable conversation.
    ConversationAdded { conversation: Conversation },
}

//! Session Bootstrap
//!
//! Builds the initial state store: one roster fetch, then per-conversation
//! history fetches joined as independent tasks. One failing history fetch
//! degrades that conversation to an empty history; it never aborts the join.

use futures::future::join_all;
use tracing::{info, warn};

use crate::api::{ApiClient, FetchError, RosterConversation, WireEntry};
use crate::config::Role;
use crate::store::{ChatEntry, Conversation, StateStore};

/// Bulk-load the roster and every conversation's history.
pub async fn bootstrap(api: &ApiClient, role: Role) -> Result<StateStore, FetchError> {
    let roster = api.fetch_roster().await?;
    info!(conversations = roster.len(), "roster loaded");

    let fetches = roster.iter().map(|c| {
        let id = c.id.clone();
        async move {
            let result = api.fetch_entries(&id).await;
            (id, result)
        }
    });
    let histories = join_all(fetches).await;

    Ok(build_store(roster, histories, role))
}

/// Assemble the store from fetch results. Kept separate from the I/O so the
/// degradation rules are testable.
fn build_store(
    roster: Vec<RosterConversation>,
    histories: Vec<(String, Result<Vec<WireEntry>, FetchError>)>,
    role: Role,
) -> StateStore {
    let mut store = StateStore::new();
    for c in roster {
        store.upsert_conversation(Conversation {
            id: c.id,
            name: c.name,
            online: c.online_status,
        });
    }
    for (id, result) in histories {
        match result {
            Ok(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|e| wire_entry_to_chat(e, role))
                    .collect();
                store.load_history(&id, entries);
            }
            Err(e) => {
                warn!(peer = %id, "history fetch failed, starting empty: {}", e);
                store.load_history(&id, Vec::new());
            }
        }
    }
    store
}

/// Map a wire history entry into the client model. `from_doctor` on the wire
/// becomes `from_self` relative to the operator's role.
fn wire_entry_to_chat(entry: WireEntry, role: Role) -> ChatEntry {
    ChatEntry {
        id: Some(entry.id),
        conversation_id: entry.conversation_id,
        message: entry.message,
        from_self: entry.from_doctor == role.is_doctor(),
        time: Some(entry.time),
    }
}

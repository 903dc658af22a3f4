//! Frame Dispatcher
//!
//! The protocol state machine. Decoded inbound frames route to state-store
//! mutations and render instructions; operator actions produce outbound wire
//! frames plus the optimistic local echo. Every method runs to completion on
//! the event-loop task, so store mutations never interleave; the single-owner
//! loop is the concurrency mechanism, not locks.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use ward_proto::{ConPayload, DisconPayload, Frame, MsgPayload, OutboundMessage, encode_outbound};

use crate::api::{FetchError, PeerProfile};
use crate::config::Role;
use crate::render::RenderEvent;
use crate::store::{ChatEntry, Conversation, StateStore};

/// Directory work the dispatcher hands off to the lookup worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// Resolve the profile of a newly connected, previously-unseen peer.
    Profile { id: String },
    /// Persist an unopened peer as a durable conversation.
    Promote { id: String },
}

/// Completed directory work, fed back into the event loop by the worker.
#[derive(Debug)]
pub enum LookupResult {
    Profile {
        id: String,
        result: Result<PeerProfile, FetchError>,
    },
    Promote {
        id: String,
        result: Result<(), FetchError>,
    },
}

/// A connected peer the operator has not opened a conversation with.
/// Presence-only: discarded entirely on disconnect, promoted only on
/// explicit operator action.
#[derive(Debug, Default)]
struct PendingPeer {
    profile: Option<PeerProfile>,
    promoting: bool,
}

pub struct Dispatcher {
    store: StateStore,
    role: Role,
    selected: Option<String>,
    pending_peers: HashMap<String, PendingPeer>,
    /// Encoded wire frames for the transport writer.
    outbound: mpsc::Sender<String>,
    /// Instructions for the rendering collaborator.
    render: mpsc::Sender<RenderEvent>,
    /// Directory work for the lookup worker.
    lookups: mpsc::Sender<LookupRequest>,
}

impl Dispatcher {
    pub fn new(
        store: StateStore,
        role: Role,
        outbound: mpsc::Sender<String>,
        render: mpsc::Sender<RenderEvent>,
        lookups: mpsc::Sender<LookupRequest>,
    ) -> Self {
        Self {
            store,
            role,
            selected: None,
            pending_peers: HashMap::new(),
            outbound,
            render,
            lookups,
        }
    }

    /// Read-only view of the synchronized state.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The focused conversation id, if any. Sending requires one.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Route one decoded inbound frame to its handler.
    pub async fn handle(&mut self, frame: Frame) {
        match frame {
            Frame::Connect(body) => self.handle_connect(body).await,
            Frame::Disconnect(body) => self.handle_disconnect(body).await,
            Frame::Message(body) => self.handle_message(body).await,
        }
    }

    async fn handle_connect(&mut self, body: ConPayload) {
        if body.id.trim().is_empty() {
            warn!("dropping connect frame with blank peer id");
            return;
        }
        if self.store.contains(&body.id) {
            self.reconnect_known_peer(&body.id).await;
        } else {
            self.register_new_peer(body.id).await;
        }
    }

    /// A known conversation's peer came back online.
    async fn reconnect_known_peer(&mut self, id: &str) {
        if self.store.set_online(id, true) {
            self.emit(RenderEvent::PresenceChanged {
                id: id.to_string(),
                online: true,
            })
            .await;
        }
    }

    /// A previously-unseen peer connected. Held as presence-only until the
    /// operator opens a conversation; the profile fetch runs decoupled from
    /// frame processing.
    async fn register_new_peer(&mut self, id: String) {
        if self.role.is_doctor() {
            // Doctors only ever talk to peers from their roster.
            debug!(peer = %id, "ignoring connect from unknown peer");
            return;
        }
        if self.pending_peers.contains_key(&id) {
            return;
        }
        self.pending_peers.insert(id.clone(), PendingPeer::default());
        if self
            .lookups
            .send(LookupRequest::Profile { id: id.clone() })
            .await
            .is_err()
        {
            warn!(peer = %id, "lookup worker gone, dropping profile fetch");
        }
    }

    async fn handle_disconnect(&mut self, body: DisconPayload) {
        if self.store.contains(&body.id) {
            // Opened conversations are durable: flip offline, never remove.
            if self.store.set_online(&body.id, false) {
                self.emit(RenderEvent::PresenceChanged {
                    id: body.id,
                    online: false,
                })
                .await;
            }
        } else if self.pending_peers.remove(&body.id).is_some() {
            // Unopened peers are ephemeral presence: discard entirely. A
            // profile fetch still in flight now resolves against a missing
            // entry and is dropped.
            self.emit(RenderEvent::PeerRemoved { id: body.id }).await;
        } else {
            debug!(peer = %body.id, "disconnect for unknown peer");
        }
    }

    async fn handle_message(&mut self, body: MsgPayload) {
        let entry = ChatEntry {
            id: None,
            conversation_id: body.sender_id.clone(),
            message: body.msg,
            from_self: false,
            time: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.store.append_entry(&body.sender_id, entry.clone());
        // Unfocused conversations update silently; the cache has the entry
        // either way.
        if self.selected.as_deref() == Some(body.sender_id.as_str()) {
            self.emit(RenderEvent::EntryAppended { entry }).await;
        }
    }

    /// Operator composed a message. No-ops (not errors) when the target is
    /// not the current selection or the text is blank.
    pub async fn send(&mut self, text: &str, target: &str) {
        if self.selected.as_deref() != Some(target) {
            debug!(peer = %target, "send ignored: target is not the current selection");
            return;
        }
        if text.trim().is_empty() {
            return;
        }
        let outbound = OutboundMessage {
            msg: text.to_string(),
            recvid: target.to_string(),
        };
        let encoded = match encode_outbound(&outbound) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(peer = %target, "failed to encode outbound message: {}", e);
                return;
            }
        };
        // Optimistic echo regardless of delivery: a transport failure leaves
        // the echo in place and only the logs know (accepted divergence).
        if self.outbound.send(encoded).await.is_err() {
            warn!(peer = %target, "transport writer gone, message not sent");
        }
        let entry = ChatEntry::local_echo(target, text);
        self.store.append_entry(target, entry.clone());
        self.emit(RenderEvent::EntryAppended { entry }).await;
    }

    /// Focus a conversation. Emits the full-history redraw (or a pending
    /// signal when no sequence is loaded yet), then records the selection.
    pub async fn select(&mut self, target: &str) {
        if self.selected.as_deref() == Some(target) {
            return;
        }
        match self.store.history(target) {
            Some(entries) => {
                let entries = entries.to_vec();
                self.emit(RenderEvent::HistoryRedraw {
                    id: target.to_string(),
                    entries,
                })
                .await;
            }
            None => {
                self.emit(RenderEvent::HistoryPending {
                    id: target.to_string(),
                })
                .await;
            }
        }
        self.selected = Some(target.to_string());
    }

    /// Operator engages an unopened peer. The promotion must succeed
    /// server-side before the peer becomes a durable conversation.
    pub async fn open_peer(&mut self, id: &str) {
        let Some(pending) = self.pending_peers.get_mut(id) else {
            debug!(peer = %id, "open ignored: no such active peer");
            return;
        };
        if pending.profile.is_none() {
            debug!(peer = %id, "open ignored: profile not resolved yet");
            return;
        }
        if pending.promoting {
            return;
        }
        pending.promoting = true;
        if self
            .lookups
            .send(LookupRequest::Promote { id: id.to_string() })
            .await
            .is_err()
        {
            warn!(peer = %id, "lookup worker gone, dropping promotion");
        }
    }

    /// Directory lookup completed. A result for a peer that disconnected
    /// while the fetch was in flight is discarded, never resurrected.
    pub async fn profile_resolved(&mut self, id: &str, result: Result<PeerProfile, FetchError>) {
        let Some(pending) = self.pending_peers.get_mut(id) else {
            debug!(peer = %id, "discarding profile for peer no longer present");
            return;
        };
        match result {
            Ok(profile) => {
                pending.profile = Some(profile.clone());
                self.emit(RenderEvent::PeerAvailable { profile }).await;
            }
            Err(e) => {
                // The peer stays invisible; degrade by dropping it.
                warn!(peer = %id, "profile lookup failed: {}", e);
                self.pending_peers.remove(id);
            }
        }
    }

    /// Promotion round-trip completed.
    pub async fn promotion_confirmed(&mut self, id: &str, result: Result<(), FetchError>) {
        match result {
            Ok(()) => {
                let Some(pending) = self.pending_peers.remove(id) else {
                    debug!(peer = %id, "discarding promotion for peer no longer present");
                    return;
                };
                let Some(profile) = pending.profile else {
                    warn!(peer = %id, "promotion confirmed without a resolved profile");
                    return;
                };
                let conversation = Conversation {
                    id: id.to_string(),
                    name: profile.name,
                    online: true,
                };
                self.store.upsert_conversation(conversation.clone());
                self.emit(RenderEvent::ConversationAdded { conversation })
                    .await;
            }
            Err(e) => {
                warn!(peer = %id, "promotion failed: {}", e);
                if let Some(pending) = self.pending_peers.get_mut(id) {
                    pending.promoting = false;
                }
            }
        }
    }

    async fn emit(&self, event: RenderEvent) {
        if self.render.send(event).await.is_err() {
            warn!("render consumer gone, dropping instruction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        dispatcher: Dispatcher,
        outbound: mpsc::Receiver<String>,
        render: mpsc::Receiver<RenderEvent>,
        lookups: mpsc::Receiver<LookupRequest>,
    }

    fn harness(role: Role, store: StateStore) -> Harness {
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (render_tx, render_rx) = mpsc::channel(16);
        let (lookup_tx, lookup_rx) = mpsc::channel(16);
        Harness {
            dispatcher: Dispatcher::new(store, role, outbound_tx, render_tx, lookup_tx),
            outbound: outbound_rx,
            render: render_rx,
            lookups: lookup_rx,
        }
    }

    fn store_with(id: &str, online: bool) -> StateStore {
        let mut store = StateStore::new();
        store.upsert_conversation(Conversation {
            id: id.to_string(),
            name: format!("Peer {}", id),
            online,
        });
        store
    }

    fn connect(id: &str) -> Frame {
        Frame::Connect(ConPayload { id: id.to_string() })
    }

    fn disconnect(id: &str) -> Frame {
        Frame::Disconnect(DisconPayload { id: id.to_string() })
    }

    fn message(msg: &str, sender_id: &str) -> Frame {
        Frame::Message(MsgPayload {
            msg: msg.to_string(),
            sender_id: sender_id.to_string(),
        })
    }

    fn profile(id: &str) -> PeerProfile {
        PeerProfile {
            id: id.to_string(),
            name: "Ruth".to_string(),
            email: "ruth@clinic.example".to_string(),
            qualifications: vec!["MD".to_string()],
        }
    }

    fn fetch_failure() -> FetchError {
        FetchError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<RenderEvent>) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_unknown_registers_peer_and_triggers_one_lookup() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher.handle(connect("d-1")).await;

        // No conversation yet, exactly one profile fetch.
        assert!(h.dispatcher.store().is_empty());
        assert_eq!(
            h.lookups.try_recv().ok(),
            Some(LookupRequest::Profile {
                id: "d-1".to_string()
            })
        );
        assert!(h.lookups.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_before_profile_resolves_cancels_promotion() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher.handle(disconnect("d-1")).await;
        drain(&mut h.render);

        h.dispatcher
            .profile_resolved("d-1", Ok(profile("d-1")))
            .await;

        assert!(h.dispatcher.store().is_empty());
        let events = drain(&mut h.render);
        assert!(
            events.is_empty(),
            "late profile must not surface: {:?}",
            events
        );
    }

    #[tokio::test]
    async fn connect_known_offline_flips_online_without_duplicate() {
        let mut h = harness(Role::Doctor, store_with("p-1", false));
        h.dispatcher.handle(connect("p-1")).await;

        assert_eq!(h.dispatcher.store().len(), 1);
        assert!(
            h.dispatcher
                .store()
                .conversation("p-1")
                .is_some_and(|c| c.online)
        );
        match h.render.try_recv() {
            Ok(RenderEvent::PresenceChanged { id, online }) => {
                assert_eq!(id, "p-1");
                assert!(online);
            }
            other => panic!("Expected PresenceChanged, got {:?}", other),
        }

        // Already online: no redundant churn.
        h.dispatcher.handle(connect("p-1")).await;
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_known_flips_offline_and_keeps_conversation() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.handle(disconnect("p-1")).await;

        assert!(h.dispatcher.store().contains("p-1"));
        assert!(
            h.dispatcher
                .store()
                .conversation("p-1")
                .is_some_and(|c| !c.online)
        );
        match h.render.try_recv() {
            Ok(RenderEvent::PresenceChanged { online, .. }) => assert!(!online),
            other => panic!("Expected PresenceChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn doctor_ignores_unknown_connect() {
        let mut h = harness(Role::Doctor, StateStore::new());
        h.dispatcher.handle(connect("stranger")).await;

        assert!(h.dispatcher.store().is_empty());
        assert!(h.lookups.try_recv().is_err());
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_connect_id_is_dropped() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("  ")).await;

        assert!(h.lookups.try_recv().is_err());
        assert!(h.dispatcher.store().is_empty());
    }

    #[tokio::test]
    async fn send_appends_echo_and_encodes_once() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.select("p-1").await;
        drain(&mut h.render);

        h.dispatcher.send("hello", "p-1").await;

        assert_eq!(
            h.outbound.try_recv().ok().as_deref(),
            Some(r#"{"msg":"hello","recvid":"p-1"}"#)
        );
        assert!(h.outbound.try_recv().is_err());

        let history = h.dispatcher.store().history("p-1").unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].from_self);
        assert_eq!(history[0].id, None);
        assert_eq!(history[0].time, None);

        match h.render.try_recv() {
            Ok(RenderEvent::EntryAppended { entry }) => assert_eq!(entry.message, "hello"),
            other => panic!("Expected EntryAppended, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_without_selection_is_noop() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.send("hello", "p-1").await;

        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.dispatcher.store().history("p-1"), Some(&[][..]));
    }

    #[tokio::test]
    async fn send_blank_text_is_noop() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.select("p-1").await;
        drain(&mut h.render);

        h.dispatcher.send("   ", "p-1").await;

        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.dispatcher.store().history("p-1"), Some(&[][..]));
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unselected_target_is_noop() {
        let mut store = store_with("p-1", true);
        store.upsert_conversation(Conversation {
            id: "p-2".to_string(),
            name: "Peer p-2".to_string(),
            online: true,
        });
        let mut h = harness(Role::Doctor, store);
        h.dispatcher.select("p-1").await;
        drain(&mut h.render);

        h.dispatcher.send("hello", "p-2").await;
        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.dispatcher.store().history("p-2"), Some(&[][..]));
    }

    #[tokio::test]
    async fn message_for_unselected_conversation_appends_silently() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.handle(message("hi", "p-1")).await;

        let history = h.dispatcher.store().history("p-1").unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].from_self);
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_for_selected_conversation_renders_once() {
        let mut h = harness(Role::Doctor, store_with("p-1", true));
        h.dispatcher.select("p-1").await;
        drain(&mut h.render);

        h.dispatcher.handle(message("hi", "p-1")).await;

        match h.render.try_recv() {
            Ok(RenderEvent::EntryAppended { entry }) => {
                assert_eq!(entry.message, "hi");
                assert!(!entry.from_self);
                assert!(entry.time.is_some());
            }
            other => panic!("Expected EntryAppended, got {:?}", other),
        }
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn select_redraws_loaded_history_and_signals_pending_otherwise() {
        let mut store = store_with("p-1", true);
        store.append_entry("p-1", ChatEntry::local_echo("p-1", "old"));
        let mut h = harness(Role::Doctor, store);

        h.dispatcher.select("p-1").await;
        match h.render.try_recv() {
            Ok(RenderEvent::HistoryRedraw { id, entries }) => {
                assert_eq!(id, "p-1");
                assert_eq!(entries.len(), 1);
            }
            other => panic!("Expected HistoryRedraw, got {:?}", other),
        }
        assert_eq!(h.dispatcher.selected(), Some("p-1"));

        // Re-selecting the focused conversation does nothing.
        h.dispatcher.select("p-1").await;
        assert!(h.render.try_recv().is_err());

        // No history sequence loaded for this id: pending, not empty.
        h.dispatcher.select("p-9").await;
        match h.render.try_recv() {
            Ok(RenderEvent::HistoryPending { id }) => assert_eq!(id, "p-9"),
            other => panic!("Expected HistoryPending, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn promotion_makes_peer_a_durable_online_conversation() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher
            .profile_resolved("d-1", Ok(profile("d-1")))
            .await;

        match h.render.try_recv() {
            Ok(RenderEvent::PeerAvailable { profile }) => assert_eq!(profile.id, "d-1"),
            other => panic!("Expected PeerAvailable, got {:?}", other),
        }

        h.dispatcher.open_peer("d-1").await;
        assert!(h.lookups.try_recv().is_ok()); // the profile fetch
        assert_eq!(
            h.lookups.try_recv().ok(),
            Some(LookupRequest::Promote {
                id: "d-1".to_string()
            })
        );

        h.dispatcher.promotion_confirmed("d-1", Ok(())).await;

        let store = h.dispatcher.store();
        assert!(store.conversation("d-1").is_some_and(|c| c.online));
        // Promoted conversations render explicit-empty, not pending.
        assert_eq!(store.history("d-1"), Some(&[][..]));
        match h.render.try_recv() {
            Ok(RenderEvent::ConversationAdded { conversation }) => {
                assert_eq!(conversation.name, "Ruth");
            }
            other => panic!("Expected ConversationAdded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_peer_requires_resolved_profile() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        assert!(h.lookups.try_recv().is_ok()); // the profile fetch

        h.dispatcher.open_peer("d-1").await;
        assert!(h.lookups.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_promotion_leaves_peer_unopened_but_retryable() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher
            .profile_resolved("d-1", Ok(profile("d-1")))
            .await;
        h.dispatcher.open_peer("d-1").await;
        drain(&mut h.render);
        while h.lookups.try_recv().is_ok() {}

        h.dispatcher
            .promotion_confirmed("d-1", Err(fetch_failure()))
            .await;
        assert!(h.dispatcher.store().is_empty());

        // The operator can try again.
        h.dispatcher.open_peer("d-1").await;
        assert_eq!(
            h.lookups.try_recv().ok(),
            Some(LookupRequest::Promote {
                id: "d-1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn failed_profile_lookup_drops_the_peer() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher
            .profile_resolved("d-1", Err(fetch_failure()))
            .await;

        assert!(h.render.try_recv().is_err());
        // A later disconnect finds nothing to clean up.
        h.dispatcher.handle(disconnect("d-1")).await;
        assert!(h.render.try_recv().is_err());
    }

    #[tokio::test]
    async fn pending_peer_disconnect_removes_it_with_notice() {
        let mut h = harness(Role::Patient, StateStore::new());
        h.dispatcher.handle(connect("d-1")).await;
        h.dispatcher.handle(disconnect("d-1")).await;

        match h.render.try_recv() {
            Ok(RenderEvent::PeerRemoved { id }) => assert_eq!(id, "d-1"),
            other => panic!("Expected PeerRemoved, got {:?}", other),
        }
    }
}

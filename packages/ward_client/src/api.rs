//! REST Collaborators
//!
//! Request/response calls against the clinic server: the roster and history
//! retrieval consumed at session start, the directory lookup triggered by a
//! new-peer connect, and the promotion call that persists an opened
//! conversation. Every failure maps to [`FetchError`] and degrades the
//! caller; nothing here aborts the dispatcher loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Role;
use crate::dispatch::{LookupRequest, LookupResult};

/// Failure of any external request/response call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Roster entry as the conversation-listing endpoint serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterConversation {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "onlineStatus")]
    pub online_status: bool,
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    conversations: Vec<RosterConversation>,
}

/// History entry in the wire shape the server serializes.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub id: i64,
    pub time: String,
    pub from_doctor: bool,
    pub message: String,
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    entries: Vec<WireEntry>,
}

/// Directory profile for a connected practitioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub qualifications: Vec<String>,
}

/// HTTP client bound to one server and operator role.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    role: Role,
}

impl ApiClient {
    pub fn new(base_url: &str, role: Role) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            role,
        }
    }

    /// Conversations known to the server for this operator.
    pub async fn fetch_roster(&self) -> Result<Vec<RosterConversation>, FetchError> {
        let url = match self.role {
            Role::Doctor => format!("{}/doctor/conversation", self.base_url),
            Role::Patient => format!("{}/patient/conversation", self.base_url),
        };
        let resp = ok_status(self.http.get(&url).send().await?).await?;
        Ok(resp.json::<RosterResponse>().await?.conversations)
    }

    /// Full chat history for one conversation, in arrival order.
    pub async fn fetch_entries(&self, peer_id: &str) -> Result<Vec<WireEntry>, FetchError> {
        let url = match self.role {
            Role::Doctor => format!(
                "{}/doctor/conversation/entries?patId={}",
                self.base_url, peer_id
            ),
            Role::Patient => format!(
                "{}/patient/conversation/entries?docId={}",
                self.base_url, peer_id
            ),
        };
        let resp = ok_status(self.http.get(&url).send().await?).await?;
        Ok(resp.json::<EntriesResponse>().await?.entries)
    }

    /// Directory lookup for a newly connected practitioner.
    ///
    /// The server double-encodes this response: the JSON body is a string
    /// holding the profile object. Kept as-is for wire compatibility.
    pub async fn fetch_profile(&self, id: &str) -> Result<PeerProfile, FetchError> {
        let url = format!("{}/get/doctor/{}", self.base_url, id);
        let resp = ok_status(self.http.get(&url).send().await?).await?;
        let wrapped: String = resp.json().await?;
        Ok(serde_json::from_str(&wrapped)?)
    }

    /// Persist an unopened peer as a durable conversation server-side. Must
    /// succeed before the client treats the peer as durable.
    pub async fn promote_conversation(&self, peer_id: &str) -> Result<(), FetchError> {
        let url = format!("{}/patient/conversation", self.base_url);
        let form = [("id", peer_id)];
        ok_status(self.http.post(&url).form(&form).send().await?).await?;
        Ok(())
    }
}

async fn ok_status(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(FetchError::Status { status, body })
    }
}

/// Drain directory lookups off the event loop and feed the results back in.
/// Runs fully decoupled from frame processing: the dispatcher discards
/// results for peers that disconnected while the call was in flight.
pub async fn run_lookup_worker(
    api: ApiClient,
    mut requests: mpsc::Receiver<LookupRequest>,
    results: mpsc::Sender<LookupResult>,
) {
    while let Some(request) = requests.recv().await {
        let result = match request {
            LookupRequest::Profile { id } => {
                let result = api.fetch_profile(&id).await;
                LookupResult::Profile { id, result }
            }
            LookupRequest::Promote { id } => {
                let result = api.promote_conversation(&id).await;
                LookupResult::Promote { id, result }
            }
        };
        if results.send(result).await.is_err() {
            break;
        }
    }
    debug!("lookup request channel closed, worker stopping");
}

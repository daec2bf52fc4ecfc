//! Response body of the dialogue endpoint.
//!
//! ```json
//! { "ok": true, "reply": "...", "identity": { ... }, "memory": { ... } }
//! ```
//!
//! A denied nudge is `{ "ok": true, "reply": "" }`: render nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use confidant_types::chat::Reply;
use confidant_types::identity::Identity;
use confidant_types::memory::MemoryView;

#[derive(Debug, Serialize)]
pub struct RespondBody {
    pub ok: bool,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client-facing projection of an [`Identity`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBody {
    pub name: Option<String>,
    pub last_topic: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl From<Identity> for IdentityBody {
    fn from(identity: Identity) -> Self {
        Self {
            name: identity.name,
            last_topic: identity.last_topic,
            last_seen_at: identity.last_seen_at,
        }
    }
}

impl RespondBody {
    pub fn failure(error: String) -> Self {
        Self {
            ok: false,
            reply: String::new(),
            identity: None,
            memory: None,
            error: Some(error),
        }
    }
}

impl From<Reply> for RespondBody {
    fn from(reply: Reply) -> Self {
        Self {
            ok: true,
            reply: reply.text,
            identity: reply.identity.map(IdentityBody::from),
            memory: reply.memory,
            error: None,
        }
    }
}

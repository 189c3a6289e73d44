//! Events exchanged over a room socket.
//!
//! Every frame is a JSON object `{"event": "<name>", "args": <payload>}`,
//! where `args` carries the event's positional arguments.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::registry::ConnectionId;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinCall {
    pub path: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "args", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinCall(JoinCall),
    Signal(ConnectionId, Value),
    ChatMessage(String, String),
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "args", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserJoined(ConnectionId, Vec<ConnectionId>),
    ChatMessage(String, String, ConnectionId),
    Signal(ConnectionId, Value),
    UserLeft(#[serde(serialize_with = "single_arg")] ConnectionId),
}

/// Keeps `args` an array for one-argument events too.
fn single_arg<S: Serializer>(id: &ConnectionId, serializer: S) -> Result<S::Ok, S::Error> {
    (id,).serialize(serializer)
}

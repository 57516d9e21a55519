use serde::{Deserialize, Serialize};

/// Transient typing notification carried over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub session_id: String,
    pub user_identifier: String,
    pub is_typing: bool,
}

/// Connection lifecycle of the realtime channel. Owned by the realtime
/// client and mirrored into the store as a display flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

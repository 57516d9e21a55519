use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted, named conversation. Owned by the chat store; the sidebar only
/// ever reads derived views of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
    pub pinned: bool,
    pub tags: Vec<String>,
}

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;

use crate::models::{ChatSession, ConnectionState, Message};

/// Full-screen animation kinds triggered by message-count transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Celebration {
    /// The very first message of a conversation.
    Welcome,
    /// Every fifth message.
    Milestone,
    /// Every tenth message.
    Achievement,
}

/// Derives the celebration for a unique-count transition. Counting multiples
/// of ten as achievements before checking multiples of five, so the bigger
/// reward wins when both match.
pub fn celebration_for(previous: usize, current: usize) -> Option<Celebration> {
    if previous == 0 && current == 1 {
        Some(Celebration::Welcome)
    } else if current > previous && current > 0 && current % 10 == 0 {
        Some(Celebration::Achievement)
    } else if current > previous && current > 0 && current % 5 == 0 {
        Some(Celebration::Milestone)
    } else {
        None
    }
}

/// Single source of truth for the active conversation and the session
/// catalog. Constructed once by the application root and owned by it; every
/// mutation happens on the main loop, so no interior locking is needed.
pub struct ChatStore {
    messages: Vec<Message>,
    sessions: Vec<ChatSession>,
    pub current_session_id: Option<String>,
    pub bot_typing: bool,
    pub loading: bool,
    pub connection: ConnectionState,
    previous_unique_count: usize,
    // Reply ids already counted toward the catalog, across all sessions
    replied_ids: HashSet<String>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            sessions: Vec::new(),
            current_session_id: None,
            bot_typing: false,
            loading: false,
            connection: ConnectionState::Disconnected,
            previous_unique_count: 0,
            replied_ids: HashSet::new(),
        }
    }

    // --- Active message list ---

    /// Raw list, possibly containing duplicate ids from an optimistic append
    /// plus a server echo. Renderers and counters must use
    /// [`unique_messages`](Self::unique_messages) instead.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The message list with duplicate ids removed, keeping the first
    /// occurrence of each id.
    pub fn unique_messages(&self) -> Vec<&Message> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.messages.len());
        let mut unique = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            if !seen.contains(&message.id.as_str()) {
                seen.push(&message.id);
                unique.push(message);
            }
        }
        unique
    }

    pub fn unique_count(&self) -> usize {
        self.unique_messages().len()
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Appends a message and reports the celebration its count transition
    /// earns, if any. Appending a duplicate id is allowed and does not change
    /// the unique count.
    pub fn push_message(&mut self, message: Message) -> Option<Celebration> {
        self.messages.push(message);
        self.roll_celebration()
    }

    /// Replaces the message list wholesale, e.g. when opening a saved
    /// session. Loading history never triggers a celebration.
    pub fn load_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.previous_unique_count = self.unique_count();
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.previous_unique_count = 0;
        self.bot_typing = false;
    }

    fn roll_celebration(&mut self) -> Option<Celebration> {
        let current = self.unique_count();
        let previous = std::mem::replace(&mut self.previous_unique_count, current);
        celebration_for(previous, current)
    }

    /// Applies a bot reply to the active conversation. A reply id seen before
    /// (an HTTP reply echoed again on the topic) appends nothing and leaves
    /// the catalog untouched, so its count rolls forward exactly once per
    /// message. Returns whether the reply was a duplicate plus any celebration
    /// the append earned.
    pub fn push_reply(&mut self, message: Message) -> (bool, Option<Celebration>) {
        if self.has_message(&message.id) || !self.replied_ids.insert(message.id.clone()) {
            return (true, None);
        }
        let session_id = message.session_id.clone();
        let preview = message.content.clone();
        let celebration = self.push_message(message);
        self.touch_session(&session_id, preview);
        (false, celebration)
    }

    /// Records a reply for a session that is not currently open; only the
    /// catalog moves. Returns true when the id was already counted.
    pub fn note_background_reply(&mut self, message: &Message) -> bool {
        if !self.replied_ids.insert(message.id.clone()) {
            return true;
        }
        self.touch_session(&message.session_id, message.content.clone());
        false
    }

    // --- Session catalog ---

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn find_session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn set_sessions(&mut self, sessions: Vec<ChatSession>) {
        self.sessions = sessions;
        self.resort();
    }

    /// Inserts or replaces a session by id.
    pub fn upsert_session(&mut self, session: ChatSession) {
        if let Some(existing) = self.sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session;
        } else {
            self.sessions.push(session);
        }
        self.resort();
    }

    /// Bumps a session's preview, count, and timestamp after a new message.
    pub fn touch_session(&mut self, id: &str, preview: String) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.preview = preview;
            session.message_count += 1;
            session.updated_at = Utc::now();
        }
        self.resort();
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.current_session_id.as_deref() == Some(id) {
            self.current_session_id = None;
        }
        self.sessions.len() < before
    }

    pub fn rename_session(&mut self, id: &str, title: String) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            debug!(id, %title, "renaming session");
            session.title = title;
        }
        self.resort();
    }

    pub fn toggle_pin(&mut self, id: &str) -> Option<bool> {
        let pinned = {
            let session = self.sessions.iter_mut().find(|s| s.id == id)?;
            session.pinned = !session.pinned;
            session.pinned
        };
        self.resort();
        Some(pinned)
    }

    pub fn clear_all_sessions(&mut self) {
        self.sessions.clear();
        self.current_session_id = None;
    }

    // Catalog invariant: pinned sessions first, most recently updated first
    // within each half.
    fn resort(&mut self) {
        self.sessions.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Sender;
    use chrono::Duration;

    fn message(id: &str) -> Message {
        Message::user("s1", format!("text {id}")).with_id(id)
    }

    fn session(id: &str, pinned: bool, age_days: i64) -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: id.to_string(),
            title: format!("Session {id}"),
            preview: String::new(),
            created_at: now - Duration::days(age_days),
            updated_at: now - Duration::days(age_days),
            message_count: 0,
            pinned,
            tags: Vec::new(),
        }
    }

    #[test]
    fn duplicate_ids_collapse_to_first_occurrence() {
        let mut store = ChatStore::new();
        let mut original = message("m1");
        original.content = "first".to_string();
        store.push_message(original);

        let mut echo = message("m1");
        echo.content = "echo".to_string();
        store.push_message(echo);

        let unique = store.unique_messages();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].content, "first");
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn first_message_triggers_welcome() {
        let mut store = ChatStore::new();
        assert_eq!(store.push_message(message("m1")), Some(Celebration::Welcome));
        assert_eq!(store.push_message(message("m2")), None);
    }

    #[test]
    fn fifth_message_is_a_milestone_and_tenth_an_achievement() {
        let mut store = ChatStore::new();
        for i in 1..=10 {
            let result = store.push_message(message(&format!("m{i}")));
            match i {
                1 => assert_eq!(result, Some(Celebration::Welcome)),
                5 => assert_eq!(result, Some(Celebration::Milestone)),
                10 => assert_eq!(result, Some(Celebration::Achievement)),
                _ => assert_eq!(result, None),
            }
        }
    }

    #[test]
    fn duplicate_append_does_not_celebrate() {
        let mut store = ChatStore::new();
        for i in 1..=4 {
            store.push_message(message(&format!("m{i}")));
        }
        // Unique count stays at 4.
        assert_eq!(store.push_message(message("m4")), None);
        assert_eq!(store.push_message(message("m5")), Some(Celebration::Milestone));
    }

    #[test]
    fn echoed_reply_rolls_the_catalog_forward_once() {
        let mut store = ChatStore::new();
        store.set_sessions(vec![session("s1", false, 0)]);
        store.current_session_id = Some("s1".to_string());

        let reply = message("r1");
        let (duplicate, _) = store.push_reply(reply.clone());
        assert!(!duplicate);
        assert_eq!(store.sessions()[0].message_count, 1);
        let touched_at = store.sessions()[0].updated_at;

        // The same reply arriving again on the topic
        let (duplicate, celebration) = store.push_reply(reply);
        assert!(duplicate);
        assert_eq!(celebration, None);
        assert_eq!(store.sessions()[0].message_count, 1);
        assert_eq!(store.sessions()[0].updated_at, touched_at);
        assert_eq!(store.unique_count(), 1);
    }

    #[test]
    fn background_reply_counts_toward_the_catalog_once() {
        let mut store = ChatStore::new();
        store.set_sessions(vec![session("s1", false, 0)]);

        let reply = message("r1");
        assert!(!store.note_background_reply(&reply));
        assert!(store.note_background_reply(&reply));
        assert_eq!(store.sessions()[0].message_count, 1);
        // Background replies never enter the active message list
        assert!(store.messages().is_empty());
    }

    #[test]
    fn loading_history_never_celebrates() {
        let mut store = ChatStore::new();
        store.load_messages((1..=10).map(|i| message(&format!("m{i}"))).collect());
        assert_eq!(store.unique_count(), 10);
        assert_eq!(store.push_message(message("m11")), None);
    }

    #[test]
    fn celebration_table() {
        assert_eq!(celebration_for(0, 1), Some(Celebration::Welcome));
        assert_eq!(celebration_for(1, 2), None);
        assert_eq!(celebration_for(4, 5), Some(Celebration::Milestone));
        assert_eq!(celebration_for(9, 10), Some(Celebration::Achievement));
        assert_eq!(celebration_for(19, 20), Some(Celebration::Achievement));
        // No increase, no celebration.
        assert_eq!(celebration_for(5, 5), None);
        assert_eq!(celebration_for(10, 5), None);
        assert_eq!(celebration_for(0, 0), None);
    }

    #[test]
    fn catalog_keeps_pinned_sessions_first() {
        let mut store = ChatStore::new();
        store.set_sessions(vec![session("1", false, 1), session("2", true, 10)]);
        let order: Vec<&str> = store.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, ["2", "1"]);
    }

    #[test]
    fn mutations_preserve_pinned_first_ordering() {
        let mut store = ChatStore::new();
        store.set_sessions(vec![
            session("a", false, 3),
            session("b", true, 5),
            session("c", false, 1),
        ]);

        store.touch_session("a", "latest".to_string());
        let order: Vec<&str> = store.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, ["b", "a", "c"]);

        store.toggle_pin("c");
        assert_eq!(store.sessions()[0].id, "c");
        assert_eq!(store.sessions()[1].id, "b");

        store.toggle_pin("c");
        assert_eq!(store.sessions()[0].id, "b");
    }

    #[test]
    fn delete_clears_current_selection() {
        let mut store = ChatStore::new();
        store.set_sessions(vec![session("a", false, 0)]);
        store.current_session_id = Some("a".to_string());
        assert!(store.delete_session("a"));
        assert!(store.current_session_id.is_none());
        assert!(!store.delete_session("a"));
    }

    #[test]
    fn clear_messages_resets_celebration_baseline() {
        let mut store = ChatStore::new();
        store.push_message(message("m1"));
        store.clear_messages();
        assert_eq!(store.push_message(message("m2")), Some(Celebration::Welcome));
    }

    #[test]
    fn sender_helpers_round_trip() {
        assert_eq!(Sender::from_str("USER"), Some(Sender::User));
        assert_eq!(Sender::Bot.as_str(), "BOT");
    }
}

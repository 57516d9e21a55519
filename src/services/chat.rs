use tracing::debug;

use crate::api::types::{ChatRequest, ChatResponse, SessionHistory};
use crate::api::{ApiError, ChatApi};
use crate::models::message::{Sender, Source};
use crate::models::Message;
use crate::realtime::RealtimeHandle;

/// How an outbound message left the building.
#[derive(Debug)]
pub enum SendOutcome {
    /// Published on the realtime channel; the bot reply will arrive as a
    /// topic message, not here.
    Realtime,
    /// Sent over HTTP; the reply came back in the response body.
    Direct(Box<Message>),
}

/// Sends a user message, preferring the realtime channel when it is up and
/// falling back to HTTP otherwise. Duplicate replies (HTTP body plus a later
/// topic echo) are tolerated because consumers de-duplicate by message id.
pub async fn dispatch_message(
    api: &ChatApi,
    realtime: &RealtimeHandle,
    session_id: &str,
    text: &str,
    user_identifier: &str,
) -> Result<SendOutcome, ApiError> {
    if realtime.is_connected() {
        debug!(session_id, "dispatching message over realtime channel");
        realtime.send_chat(session_id, text, user_identifier);
        return Ok(SendOutcome::Realtime);
    }

    debug!(session_id, "realtime down, dispatching message over HTTP");
    let response = api
        .send_message(&ChatRequest {
            session_id: session_id.to_string(),
            message: text.to_string(),
            user_identifier: Some(user_identifier.to_string()),
        })
        .await?;

    Ok(SendOutcome::Direct(Box::new(bot_message(&response))))
}

/// Maps a backend reply onto a renderable bot message.
pub fn bot_message(response: &ChatResponse) -> Message {
    Message {
        id: response.message_id.clone(),
        session_id: response.session_id.clone(),
        sender: Sender::Bot,
        content: response.response.clone(),
        intent: Some(response.intent.clone()),
        confidence: Some(response.confidence),
        quick_replies: response.quick_replies.clone().unwrap_or_default(),
        source: Some(response.source),
        is_read: false,
        created_at: response.timestamp,
    }
}

/// Maps server-side history onto the local message model. Unknown sender
/// strings are treated as SYSTEM rather than dropped.
pub fn messages_from_history(history: &SessionHistory) -> Vec<Message> {
    history
        .messages
        .iter()
        .map(|m| Message {
            id: m.id.clone(),
            session_id: history.id.clone(),
            sender: Sender::from_str(&m.sender_type).unwrap_or(Sender::System),
            content: m.content.clone(),
            intent: m.intent.clone(),
            confidence: m.confidence_score,
            quick_replies: m.quick_replies.clone().unwrap_or_default(),
            source: m.source,
            is_read: m.is_read.unwrap_or(true),
            created_at: m.created_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::SessionHistoryMessage;
    use chrono::Utc;

    #[test]
    fn bot_message_carries_metadata() {
        let response = ChatResponse {
            message_id: "m1".to_string(),
            session_id: "s1".to_string(),
            response: "Here you go".to_string(),
            intent: "faq".to_string(),
            confidence: 0.82,
            quick_replies: Some(vec!["Thanks".to_string()]),
            entities: None,
            source: Source::Nlp,
            timestamp: Utc::now(),
            requires_followup: false,
        };

        let msg = bot_message(&response);
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender, Sender::Bot);
        assert_eq!(msg.intent.as_deref(), Some("faq"));
        assert_eq!(msg.quick_replies, ["Thanks"]);
        assert_eq!(msg.meta_label().unwrap(), "faq · 82% · nlp");
    }

    #[test]
    fn history_maps_sender_strings() {
        let now = Utc::now();
        let history = SessionHistory {
            id: "s1".to_string(),
            user_identifier: "u1".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            messages: vec![
                SessionHistoryMessage {
                    id: "a".to_string(),
                    content: "hi".to_string(),
                    sender_type: "USER".to_string(),
                    intent: None,
                    confidence_score: None,
                    quick_replies: None,
                    source: None,
                    is_read: None,
                    created_at: now,
                },
                SessionHistoryMessage {
                    id: "b".to_string(),
                    content: "hello".to_string(),
                    sender_type: "robot".to_string(),
                    intent: None,
                    confidence_score: None,
                    quick_replies: None,
                    source: None,
                    is_read: Some(false),
                    created_at: now,
                },
            ],
        };

        let messages = messages_from_history(&history);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].session_id, "s1");
        // Unrecognized sender degrades to SYSTEM.
        assert_eq!(messages[1].sender, Sender::System);
        assert!(!messages[1].is_read);
    }
}

use anyhow::Result;

use crate::models::message::Sender;
use crate::models::{ChatSession, Message};

pub fn export_to_markdown(session: &ChatSession, messages: &[Message]) -> String {
    let mut output = format!("# {}\n\n", session.title);
    output.push_str(&format!(
        "> Started: {} | Messages: {}\n\n",
        session.created_at.format("%Y-%m-%d %H:%M"),
        messages.len()
    ));

    if !session.tags.is_empty() {
        output.push_str(&format!("> Tags: {}\n\n", session.tags.join(", ")));
    }

    output.push_str("---\n\n");

    for msg in messages {
        let label = match msg.sender {
            Sender::User => "You",
            Sender::Bot => "Assistant",
            Sender::System => "System",
        };
        output.push_str(&format!("### {}\n\n{}\n\n", label, msg.content));
        if let Some(meta) = msg.meta_label() {
            output.push_str(&format!("_{}_\n\n", meta));
        }
    }

    output
}

pub fn export_to_json(session: &ChatSession, messages: &[Message]) -> Result<String> {
    let payload = serde_json::json!({
        "session": session,
        "messages": messages,
    });
    Ok(serde_json::to_string_pretty(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixture() -> (ChatSession, Vec<Message>) {
        let now = Utc::now();
        let session = ChatSession {
            id: "s1".to_string(),
            title: "Trip planning".to_string(),
            preview: "Where to?".to_string(),
            created_at: now,
            updated_at: now,
            message_count: 2,
            pinned: false,
            tags: vec!["travel".to_string()],
        };
        let messages = vec![
            Message::user("s1", "Where should I go?"),
            Message {
                sender: Sender::Bot,
                intent: Some("travel".to_string()),
                confidence: Some(0.9),
                ..Message::user("s1", "How about Lisbon?")
            },
        ];
        (session, messages)
    }

    #[test]
    fn markdown_includes_title_tags_and_speakers() {
        let (session, messages) = fixture();
        let md = export_to_markdown(&session, &messages);
        assert!(md.starts_with("# Trip planning\n"));
        assert!(md.contains("> Tags: travel"));
        assert!(md.contains("### You\n\nWhere should I go?"));
        assert!(md.contains("### Assistant\n\nHow about Lisbon?"));
    }

    #[test]
    fn json_round_trips() {
        let (session, messages) = fixture();
        let json = export_to_json(&session, &messages).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["session"]["title"], "Trip planning");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
    }
}

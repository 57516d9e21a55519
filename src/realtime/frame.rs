use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOPIC_MESSAGES: &str = "/topic/messages";
pub const TOPIC_TYPING: &str = "/topic/typing";
pub const DEST_CHAT_SEND: &str = "/app/chat.send";
pub const DEST_CHAT_TYPING: &str = "/app/chat.typing";

/// Wire envelope exchanged with the realtime broker over WebSocket text
/// frames. Client-to-server frames are `subscribe` and `send`; the server
/// pushes `message` frames for topics the client subscribed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Subscribe { topic: String },
    Send { destination: String, body: Value },
    Message { topic: String, body: Value },
}

impl Frame {
    pub fn subscribe(topic: &str) -> Self {
        Frame::Subscribe {
            topic: topic.to_string(),
        }
    }

    pub fn send_to(destination: &str, body: Value) -> Self {
        Frame::Send {
            destination: destination.to_string(),
            body,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_frame_round_trip() {
        let frame = Frame::subscribe(TOPIC_MESSAGES);
        let text = frame.encode().unwrap();
        assert!(text.contains(r#""type":"subscribe""#));
        assert_eq!(Frame::decode(&text).unwrap(), frame);
    }

    #[test]
    fn decodes_server_message_frame() {
        let text = r#"{"type":"message","topic":"/topic/typing","body":{"sessionId":"s1","userIdentifier":"u","isTyping":true}}"#;
        match Frame::decode(text).unwrap() {
            Frame::Message { topic, body } => {
                assert_eq!(topic, TOPIC_TYPING);
                assert_eq!(body["isTyping"], json!(true));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_frame_type() {
        assert!(Frame::decode(r#"{"type":"ping"}"#).is_err());
    }
}

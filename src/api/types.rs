use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::message::Source;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Request failed: HTTP {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::NetworkError(e.to_string())
    }
}

// --- Chat wire types (camelCase on the wire) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message_id: String,
    pub session_id: String,
    pub response: String,
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub quick_replies: Option<Vec<String>>,
    #[serde(default)]
    pub entities: Option<Vec<EntityInfo>>,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub requires_followup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryMessage {
    pub id: String,
    pub content: String,
    pub sender_type: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub quick_replies: Option<Vec<String>>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub is_read: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub id: String,
    pub user_identifier: String,
    pub is_active: bool,
    pub messages: Vec<SessionHistoryMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

// --- Auth wire types ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_camel_case() {
        let req = ChatRequest {
            session_id: "s1".to_string(),
            message: "hello".to_string(),
            user_identifier: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["message"], "hello");
        assert!(json.get("userIdentifier").is_none());
    }

    #[test]
    fn chat_response_parses_minimal_payload() {
        let json = r#"{
            "messageId": "m1",
            "sessionId": "s1",
            "response": "Hi there",
            "intent": "greeting",
            "confidence": 0.93,
            "source": "llm",
            "timestamp": "2025-01-15T10:00:00Z"
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.message_id, "m1");
        assert_eq!(parsed.source, Source::Llm);
        assert!(parsed.quick_replies.is_none());
        assert!(!parsed.requires_followup);
    }
}

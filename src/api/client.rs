use tracing::{debug, error};

use crate::config;

use super::types::{ApiError, ChatRequest, ChatResponse, SessionHistory};

/// HTTP client for the chat backend.
#[derive(Clone)]
pub struct ChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl ChatApi {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(config::api_base_url())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config::HTTP_TIMEOUT)
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Sends a user message over HTTP and returns the bot reply.
    ///
    /// This is the fallback path used when the realtime connection is down;
    /// the response body carries the full bot message.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        debug!(session_id = %request.session_id, "sending chat message over HTTP");

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "chat request failed");
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Fetches the server-side message history for a session.
    pub async fn session_history(&self, session_id: &str) -> Result<SessionHistory, ApiError> {
        let response = self
            .client
            .get(format!("{}/chat/session/{}", self.base_url, session_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response
            .json::<SessionHistory>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Probes the backend health endpoint.
    pub async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Pulls a human-readable message out of an error body, falling back to the
/// raw text when it isn't the usual `{"message": ...}` JSON shape.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    if body.is_empty() {
        "no error details provided".to_string()
    } else {
        body.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_field_from_json_body() {
        let body = r#"{"message": "session not found"}"#;
        assert_eq!(extract_error_message(body), "session not found");
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(extract_error_message("gateway timeout"), "gateway timeout");
        assert_eq!(
            extract_error_message(""),
            "no error details provided"
        );
    }
}

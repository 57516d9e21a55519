use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Bot,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "USER",
            Sender::Bot => "BOT",
            Sender::System => "SYSTEM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Sender::User),
            "BOT" => Some(Sender::Bot),
            "SYSTEM" => Some(Sender::System),
            _ => None,
        }
    }
}

/// Where the backend produced a reply: rule engine, NLP pipeline, or LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rule,
    Nlp,
    Llm,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Rule => "rule",
            Source::Nlp => "nlp",
            Source::Llm => "llm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rule" => Some(Source::Rule),
            "nlp" => Some(Source::Nlp),
            "llm" => Some(Source::Llm),
            _ => None,
        }
    }
}

/// A single chat message. Messages are append-only: once created the content
/// is never edited in place, and ids are unique within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub sender: Sender,
    pub content: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub quick_replies: Vec<String>,
    pub source: Option<Source>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A freshly composed user message with a generated id.
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            sender: Sender::User,
            content: content.into(),
            intent: None,
            confidence: None,
            quick_replies: Vec::new(),
            source: None,
            is_read: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Short label for captions under bot bubbles, e.g. "greeting · 92% · llm".
    pub fn meta_label(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(intent) = &self.intent {
            parts.push(intent.clone());
        }
        if let Some(conf) = self.confidence {
            parts.push(format!("{:.0}%", conf * 100.0));
        }
        if let Some(source) = self.source {
            parts.push(source.as_str().to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" · "))
        }
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::task;

use crate::models::message::{Sender, Source};
use crate::models::{ChatSession, Message};

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn db_path() -> PathBuf {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").expect("HOME not set");
                PathBuf::from(home).join(".local/share")
            });
        data_dir.join("parley").join("parley.db")
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE sessions (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    content TEXT NOT NULL,
                    intent TEXT,
                    confidence REAL,
                    quick_replies TEXT,
                    source TEXT,
                    is_read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_sessions_updated ON sessions(updated_at DESC);
                CREATE INDEX idx_messages_session ON messages(session_id);
                CREATE INDEX idx_messages_created ON messages(created_at);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                UPDATE schema_version SET version = 2;",
            )?;
        }

        if version < 3 {
            conn.execute_batch(
                "ALTER TABLE sessions ADD COLUMN pinned INTEGER NOT NULL DEFAULT 0;
                 ALTER TABLE sessions ADD COLUMN tags TEXT NOT NULL DEFAULT '[]';

                 UPDATE schema_version SET version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Session CRUD ---

    pub async fn insert_session(&self, session: &ChatSession) -> Result<()> {
        let conn = self.conn.clone();
        let session = session.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO sessions (id, title, pinned, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id,
                    session.title,
                    session.pinned as i32,
                    serde_json::to_string(&session.tags)?,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT s.id, s.title, s.pinned, s.tags, s.created_at, s.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.session_id = s.id ORDER BY m.created_at DESC LIMIT 1) as last_preview,
                        (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) as message_count
                 FROM sessions s ORDER BY s.pinned DESC, s.updated_at DESC",
            )?;
            let sessions = stmt
                .query_map([], |row| Ok(Self::row_to_session(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await?
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT s.id, s.title, s.pinned, s.tags, s.created_at, s.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.session_id = s.id ORDER BY m.created_at DESC LIMIT 1) as last_preview,
                        (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) as message_count
                 FROM sessions s WHERE s.id = ?1",
            )?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_session(row)))
                .optional()?;
            match result {
                Some(Ok(session)) => Ok(Some(session)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn rename_session(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn touch_session(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn set_session_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE sessions SET pinned = ?1 WHERE id = ?2",
                params![pinned as i32, id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn set_session_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let tags = serde_json::to_string(tags)?;
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE sessions SET tags = ?1 WHERE id = ?2",
                params![tags, id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    pub async fn clear_all_sessions(&self) -> Result<()> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM sessions", [])?;
            Ok(())
        })
        .await?
    }

    // --- Message CRUD ---

    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn.clone();
        let msg = message.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO messages (id, session_id, sender, content, intent, confidence, quick_replies, source, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    msg.id,
                    msg.session_id,
                    msg.sender.as_str(),
                    msg.content,
                    msg.intent,
                    msg.confidence,
                    serde_json::to_string(&msg.quick_replies)?,
                    msg.source.map(|s| s.as_str()),
                    msg.is_read as i32,
                    msg.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sender, content, intent, confidence, quick_replies, source, is_read, created_at
                 FROM messages WHERE session_id = ?1 ORDER BY created_at ASC",
            )?;
            let messages = stmt
                .query_map(params![session_id], |row| Ok(Self::row_to_message(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    pub async fn mark_session_read(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE messages SET is_read = 1 WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_session(row: &rusqlite::Row) -> Result<ChatSession> {
        let pinned_int: i32 = row.get(2)?;
        let tags_json: String = row.get(3)?;
        let created_str: String = row.get(4)?;
        let updated_str: String = row.get(5)?;
        let preview: Option<String> = row.get(6)?;

        Ok(ChatSession {
            id: row.get(0)?,
            title: row.get(1)?,
            pinned: pinned_int != 0,
            tags: serde_json::from_str(&tags_json)?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_str)?.with_timezone(&Utc),
            preview: preview.unwrap_or_default(),
            message_count: row.get(7)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let sender_str: String = row.get(2)?;
        let quick_replies_json: Option<String> = row.get(6)?;
        let source_str: Option<String> = row.get(7)?;
        let is_read_int: i32 = row.get(8)?;
        let created_str: String = row.get(9)?;

        Ok(Message {
            id: row.get(0)?,
            session_id: row.get(1)?,
            sender: Sender::from_str(&sender_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown sender: {}", sender_str))?,
            content: row.get(3)?,
            intent: row.get(4)?,
            confidence: row.get(5)?,
            quick_replies: match quick_replies_json {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            },
            source: source_str.as_deref().and_then(Source::from_str),
            is_read: is_read_int != 0,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
        })
    }
}

use rusqlite::OptionalExtension;

#[cfg(test)]
mod tests {
    use super::*;

    fn session(title: &str, pinned: bool) -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            preview: String::new(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            pinned,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = Database::new_in_memory().unwrap();
        let sessions = db.list_sessions().await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_session_and_messages() {
        let db = Database::new_in_memory().unwrap();

        let sess = session("Trip planning", false);
        db.insert_session(&sess).await.unwrap();

        let msg = Message::user(&sess.id, "Hello!");
        db.insert_message(&msg).await.unwrap();

        let messages = db.list_messages(&sess.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello!");
        assert_eq!(messages[0].sender, Sender::User);

        let sessions = db.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, 1);
        assert_eq!(sessions[0].preview, "Hello!");

        db.delete_session(&sess.id).await.unwrap();
        let sessions = db.list_sessions().await.unwrap();
        assert!(sessions.is_empty());

        // Messages should be cascade deleted
        let messages = db.list_messages(&sess.id).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_message_insert_is_ignored() {
        let db = Database::new_in_memory().unwrap();
        let sess = session("Dup", false);
        db.insert_session(&sess).await.unwrap();

        let msg = Message::user(&sess.id, "once");
        db.insert_message(&msg).await.unwrap();
        db.insert_message(&msg).await.unwrap();

        let messages = db.list_messages(&sess.id).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_list_orders_pinned_first() {
        let db = Database::new_in_memory().unwrap();

        let older = session("Older but pinned", true);
        db.insert_session(&older).await.unwrap();
        // Make the unpinned one strictly newer.
        let newer = session("Newer", false);
        db.insert_session(&newer).await.unwrap();
        db.touch_session(&newer.id).await.unwrap();

        let sessions = db.list_sessions().await.unwrap();
        assert_eq!(sessions[0].id, older.id);
        assert_eq!(sessions[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_rename_pin_and_tags() {
        let db = Database::new_in_memory().unwrap();
        let sess = session("Untitled", false);
        db.insert_session(&sess).await.unwrap();

        db.rename_session(&sess.id, "Named").await.unwrap();
        db.set_session_pinned(&sess.id, true).await.unwrap();
        db.set_session_tags(&sess.id, &["travel".to_string()])
            .await
            .unwrap();

        let fetched = db.get_session(&sess.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Named");
        assert!(fetched.pinned);
        assert_eq!(fetched.tags, ["travel"]);
    }

    #[tokio::test]
    async fn test_clear_all_sessions() {
        let db = Database::new_in_memory().unwrap();
        db.insert_session(&session("a", false)).await.unwrap();
        db.insert_session(&session("b", true)).await.unwrap();
        db.clear_all_sessions().await.unwrap();
        assert!(db.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.get_setting("theme").await.unwrap().is_none());
        db.set_setting("theme", "dark").await.unwrap();
        db.set_setting("theme", "light").await.unwrap();
        assert_eq!(db.get_setting("theme").await.unwrap().unwrap(), "light");
    }
}

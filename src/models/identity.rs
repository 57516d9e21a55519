use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in user profile. The bearer token is kept in the keyring; only the
/// profile fields are stored in the settings table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl UserIdentity {
    /// Identifier sent with chat requests so the backend can attribute
    /// messages; guests fall back to a generated id.
    pub fn user_identifier(&self) -> &str {
        &self.email
    }
}

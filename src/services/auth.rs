use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::models::UserIdentity;

use super::database::Database;
use super::keyring::KeyringService;

const IDENTITY_KEY: &str = "auth_identity";

/// Persists the signed-in identity across launches. Profile fields live in
/// the settings table; the bearer token goes to the keyring.
pub struct AuthService;

impl AuthService {
    /// Returns the stored identity and token, or None when nothing is stored
    /// or the token has expired. Expired credentials are cleaned up.
    pub async fn load(db: &Database, keyring: &KeyringService) -> Option<(UserIdentity, String)> {
        let json = db.get_setting(IDENTITY_KEY).await.ok()??;
        let identity: UserIdentity = serde_json::from_str(&json).ok()?;

        if identity.expires_at <= Utc::now() {
            info!("stored credentials expired, clearing");
            let _ = Self::clear(db, keyring).await;
            return None;
        }

        let token = keyring.retrieve_token().await.ok().flatten()?;

        debug!(email = %identity.email, "restored identity");
        Some((identity, token))
    }

    pub async fn save(
        db: &Database,
        keyring: &KeyringService,
        identity: &UserIdentity,
        token: &str,
    ) -> Result<()> {
        db.set_setting(IDENTITY_KEY, &serde_json::to_string(identity)?)
            .await?;
        keyring.store_token(token).await?;
        Ok(())
    }

    pub async fn clear(db: &Database, keyring: &KeyringService) -> Result<()> {
        db.set_setting(IDENTITY_KEY, "").await?;
        let _ = keyring.delete_token().await;
        Ok(())
    }
}

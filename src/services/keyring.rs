use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::APP_ID;

/// Secret Service storage for the one secret this app keeps: the auth bearer
/// token. Everything else about the signed-in identity lives in SQLite.
#[derive(Debug, Clone)]
pub struct KeyringService {
    keyring: Arc<Keyring>,
}

impl KeyringService {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store_token(&self, token: &str) -> Result<()> {
        self.keyring
            .create_item(
                "Parley Auth Token",
                &Self::attributes(),
                token,
                true, // replace if exists
            )
            .await
            .context("Failed to store token in keyring")?;
        Ok(())
    }

    pub async fn retrieve_token(&self) -> Result<Option<String>> {
        let items = self
            .keyring
            .search_items(&Self::attributes())
            .await
            .context("Failed to search keyring")?;

        match items.first() {
            Some(item) => {
                let secret = item.secret().await.context("Failed to read token")?;
                let token =
                    String::from_utf8(secret.to_vec()).context("Token is not valid UTF-8")?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_token(&self) -> Result<()> {
        self.keyring
            .delete(&Self::attributes())
            .await
            .context("Failed to delete token from keyring")?;
        Ok(())
    }

    fn attributes() -> Vec<(&'static str, &'static str)> {
        vec![("application", APP_ID), ("purpose", "auth-token")]
    }
}

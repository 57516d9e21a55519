use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub color_scheme: ColorScheme,
    pub send_with_enter: bool,
    pub message_font_size: u32,
    pub show_timestamps: bool,
    pub auto_scroll: bool,
    pub celebrations: bool,
    pub typing_indicator: bool,
    #[serde(default)]
    pub sound_notifications: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorScheme {
    System,
    Light,
    Dark,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::System,
            send_with_enter: true,
            message_font_size: 14,
            show_timestamps: true,
            auto_scroll: true,
            celebrations: true,
            typing_indicator: true,
            sound_notifications: false,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting("app_settings").await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => AppSettings::default(),
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting("app_settings", &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_when_unset_and_round_trips() {
        let db = Database::new_in_memory().unwrap();
        let settings = SettingsService::load(&db).await;
        assert!(settings.send_with_enter);

        let mut changed = settings.clone();
        changed.color_scheme = ColorScheme::Dark;
        changed.celebrations = false;
        SettingsService::save(&db, &changed).await.unwrap();

        let loaded = SettingsService::load(&db).await;
        assert_eq!(loaded.color_scheme, ColorScheme::Dark);
        assert!(!loaded.celebrations);
    }

    #[tokio::test]
    async fn corrupt_json_falls_back_to_defaults() {
        let db = Database::new_in_memory().unwrap();
        db.set_setting("app_settings", "{not json").await.unwrap();
        let settings = SettingsService::load(&db).await;
        assert_eq!(settings.message_font_size, 14);
    }
}

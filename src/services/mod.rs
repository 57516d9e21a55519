pub mod auth;
pub mod chat;
pub mod database;
pub mod export;
pub mod keyring;
pub mod markdown;
pub mod sessions;
pub mod settings;

pub use auth::AuthService;
pub use database::Database;
pub use keyring::KeyringService;
pub use settings::SettingsService;

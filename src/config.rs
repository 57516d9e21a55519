use std::time::Duration;

pub const APP_ID: &str = "org.parley.Parley";
pub const APP_NAME: &str = "Parley";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP API root; override with PARLEY_API_URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";
/// Realtime endpoint; override with PARLEY_WS_URL.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/chat";

/// Fixed delay between realtime reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Fixed timeout applied to every HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Quiet window after the last keystroke before "stopped typing" is sent.
pub const TYPING_QUIET_WINDOW: Duration = Duration::from_millis(1000);
/// Composer input cap, in characters.
pub const MAX_MESSAGE_CHARS: i32 = 2000;

pub fn api_base_url() -> String {
    std::env::var("PARLEY_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

pub fn ws_url() -> String {
    std::env::var("PARLEY_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string())
}

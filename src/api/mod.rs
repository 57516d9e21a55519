pub mod auth;
pub mod client;
pub mod types;

pub use auth::AuthApi;
pub use client::ChatApi;
pub use types::{ApiError, ChatRequest, ChatResponse};

pub mod events;
pub mod identity;
pub mod message;
pub mod session;

pub use events::{ConnectionState, TypingEvent};
pub use identity::UserIdentity;
pub use message::{Message, Sender, Source};
pub use session::ChatSession;

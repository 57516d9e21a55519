pub mod chat_view;
pub mod composer;
pub mod message_widget;
pub mod sidebar;
pub mod window;

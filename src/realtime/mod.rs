pub mod client;
pub mod frame;

pub use client::{Connector, RealtimeClient, RealtimeEvent, RealtimeHandle, WsConnector};

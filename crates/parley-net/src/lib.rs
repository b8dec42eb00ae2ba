// Real-time channel layer: one shared websocket per session.

pub mod channel;

pub use channel::{Channel, ChannelCommand, ChannelConfig, ChannelEvent};

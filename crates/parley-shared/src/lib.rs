// Types shared between the channel layer and the client core.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use message::ChatMessage;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{MessageId, SenderRole, UserId, ViewerProfile};

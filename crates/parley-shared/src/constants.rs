/// Default number of messages per history page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Depth of the command queue feeding the channel task
pub const CHANNEL_COMMAND_BUFFER: usize = 64;

/// Depth of the broadcast buffer for channel events
pub const CHANNEL_EVENT_BUFFER: usize = 256;

/// Maximum accepted message body length in characters
pub const MAX_MESSAGE_CHARS: usize = 4_000;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Unexpected status: {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Realtime channel is not open")]
    ChannelClosed,

    #[error("No conversation is open")]
    NoConversation,

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Message body exceeds {0} characters")]
    MessageTooLong(usize),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Failed to decode event: {0}")]
    Decode(String),
}

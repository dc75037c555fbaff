use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors surfaced across component boundaries. Per-frame and per-event
/// failures are absorbed where they occur and never reach this type.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("audio error: {0}")]
    Audio(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

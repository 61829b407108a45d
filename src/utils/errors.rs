use thiserror::Error;

/// Terminal failure modes for one fetch attempt. No variant triggers an
/// internal retry; a later request for the same key starts fresh.
///
/// `Clone` so a single failure can fan out to every waiter of a shared
/// download.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Invalid image URL: {0}")]
    InvalidKey(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

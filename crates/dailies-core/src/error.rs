//! Error types for Dailies.

use thiserror::Error;

/// Main error type for scheduler operations.
///
/// Nothing in this enum is ever surfaced to the user from the
/// presentation layer; failures degrade to "keep showing the previous
/// frame" and are logged for offline diagnosis.
#[derive(Error, Debug)]
pub enum DailiesError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Playhead error: {0}")]
    Playhead(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Scheduler detached: {0}")]
    Detached(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Dailies operations.
pub type Result<T> = std::result::Result<T, DailiesError>;

//! Error types for rhythmtool-analysis.

use thiserror::Error;

/// Error type for analysis operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid audio source: {0}")]
    InvalidSource(String),

    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),

    #[cfg(feature = "wav")]
    #[error("failed to read audio file")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

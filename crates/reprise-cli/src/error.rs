use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] reprise_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid position '{0}': expected seconds, m:ss or h:mm:ss")]
    InvalidPosition(String),
    #[error("Invalid duration '{0}': expected a positive length in seconds, m:ss or h:mm:ss")]
    InvalidDuration(String),
    #[error("Invalid position line '{0}': expected KEY POSITION")]
    InvalidPositionLine(String),
    #[error("Invalid bookmark target: {0}")]
    InvalidTarget(String),
    #[error("Invalid color tag: {0}")]
    InvalidColor(String),
    #[error("No page URL or --context file provided")]
    MissingMediaContext,
    #[error("No stable key can be derived for this media element")]
    NoStableKey,
    #[error("Refusing to clear all bookmarks without --yes")]
    ClearNotConfirmed,
    #[error("Sync failed after {attempts} attempt(s): {source}")]
    SyncFailed {
        attempts: u32,
        #[source]
        source: reprise_core::Error,
    },
    #[error("Sync is not configured. Set the R2_* or REPRISE_REMOTE_* environment variables.")]
    SyncNotConfigured,
    #[error("Sync is disabled after an authentication failure; fix the credentials and retry")]
    SyncDisabled,
}

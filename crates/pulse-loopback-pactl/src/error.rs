//! `pactl` error types.

use thiserror::Error;

/// Error raised while running `pactl` or reading its output.
#[derive(Debug, Error)]
pub enum PactlError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} failed with {}: {stderr}", exit_description(.code))]
    ProcessFailed { program: String, code: Option<i32>, stderr: String },

    #[error("Invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid output: {0}")]
    Format(#[from] pulse_loopback_core::Error),

    #[error("Expected a module index, got {0:?}")]
    InvalidIndex(String),

    #[error("Failed to wait for {program}: {source}")]
    WaitFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl PactlError {
    /// Whether the error leaves the client in an unknown state.
    ///
    /// Front-ends may degrade on any other error, but must stop on these.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WaitFailed { .. })
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

/// Result type for `pactl` operations.
pub type PactlResult<T> = Result<T, PactlError>;

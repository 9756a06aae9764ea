//! Error types for the fleet end-to-end harness.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An external command ran but exited unsuccessfully.
    #[error("command `{command}` failed:\n{output}")]
    Command { command: String, output: String },

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// The working copy has nothing to publish.
    #[error("no pending changes to publish")]
    NoChanges,

    /// IO error during fixture operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// A fixture was used in a way its contract forbids.
    #[error("fixture precondition violated: {0}")]
    Precondition(String),

    /// Observed state never matched the expectation before the deadline.
    #[error(
        "{description}: timed out after {elapsed:?} waiting for {expected}\nlast observed:\n{last_observed}"
    )]
    Convergence {
        description: String,
        expected: String,
        last_observed: String,
        elapsed: Duration,
    },

    /// Cleanup failed for a scenario that otherwise passed.
    #[error("teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),
}

impl Error {
    /// Returns the captured command output, if this is a command failure.
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::Command { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

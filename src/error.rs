//! Error types for the sync engine.
//!
//! Everything except [`Error::RepoSync`] is fatal for a run. `RepoSync` is
//! produced inside a single repository task, logged, and recorded in the
//! [`SyncSummary`](crate::sync::SyncSummary) without stopping the other tasks.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the engine and its collaborators can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Owner, base URL or stored pair is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No access token could be resolved.
    #[error("no access token available: {0}")]
    AuthMissing(String),

    /// The listing request could not be sent or the host answered with an error status.
    #[error("failed to fetch repositories page {page} from {url}: {source}")]
    Transport {
        url: String,
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    /// A listing page was not a JSON array of repository objects.
    #[error("failed to decode repositories page {page} from {url}: {source}")]
    Decode {
        url: String,
        page: u32,
        #[source]
        source: serde_json::Error,
    },

    /// The target root directory could not be created.
    #[error("failed to prepare directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One repository's clone or pull failed.
    #[error("failed to {action} repository {repo}: {source}")]
    RepoSync {
        repo: String,
        action: &'static str,
        #[source]
        source: GitError,
    },
}

/// Why a git invocation for a single repository did not succeed.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git program could not be started.
    #[error("could not run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// git ran and exited unsuccessfully.
    #[error("`{command}` exited with {}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {}", c)))]
    Exit { command: String, code: Option<i32> },

    /// The listing entry cannot be synced as-is.
    #[error("{0}")]
    Unusable(String),
}

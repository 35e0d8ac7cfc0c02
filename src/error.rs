//! Error taxonomy shared by the session lifecycle components.
//!
//! Flow-level code (commands, the orchestrator) wraps these in `anyhow`
//! with context; the components themselves return this enum so callers can
//! tell a missing record from an unreadable one.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed JSON or a missing required field.
    #[error("decode error: {0}")]
    Decode(String),

    /// Hook event kind outside the known set.
    #[error("unknown hook event: {0}")]
    UnknownEvent(String),

    /// Session id or parent token not present in the store.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Fewer real user turns than requested.
    #[error("turn {requested} not found in transcript ({available} user turns)")]
    TurnNotFound { requested: usize, available: usize },

    /// Settings merge or configuration failure.
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

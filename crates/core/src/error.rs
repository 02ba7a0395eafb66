//! Error types for the isolation-context engine
//!
//! We use `thiserror` for automatic `Display` and `Error` implementations.
//!
//! Conflicts are deliberately absent from this taxonomy: a failed publish
//! is an expected, transient outcome that travels as a `PubResult` and
//! drives the retry loop. Only retry exhaustion and structural misuse of
//! the commit protocol surface as errors.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the isolation-context engine
#[derive(Debug, Error)]
pub enum Error {
    /// Retry policies said stop before a publish succeeded
    ///
    /// The caller sees no partial effects: every attempt ran in a context
    /// that was discarded whole.
    #[error("transaction failed after {attempts} attempt(s)")]
    RetryExhausted {
        /// Number of attempts made, counting the initial run
        attempts: u32,
    },

    /// Structurally invalid commit attempt; fatal, never retried
    ///
    /// Publishing an already-published or discarded context, or a view
    /// kind that can never merge, lands here.
    #[error("commit protocol violation: {0}")]
    CommitProtocol(String),

    /// A context id whose arena slot was released or never existed
    #[error("stale context id: slot released or generation mismatch")]
    StaleContext,

    /// The parent passed to `create_nested` is no longer alive
    #[error("context is not alive")]
    ContextNotAlive,

    /// Write attempted through a read-only view
    #[error("cannot write through a read-only view")]
    ReadOnlyView,

    /// Failure reported by the state-store collaborator
    #[error("state store error: {0}")]
    Store(String),
}

impl Error {
    /// Shorthand for a [`Error::CommitProtocol`] with a formatted message
    pub fn commit_protocol(msg: impl Into<String>) -> Self {
        Error::CommitProtocol(msg.into())
    }

    /// Shorthand for a [`Error::Store`] with a formatted message
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }
}

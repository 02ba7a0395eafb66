//! Outcome of one publish attempt
//!
//! A failed publish is not an error: it carries the conflict set the
//! store reported, which feeds the selective-rerun machinery and the
//! retry decision.

use isotx_core::types::ChangeRecord;

/// Result of an attempt to fold a context into its parent
#[derive(Debug, Clone)]
pub struct PubResult {
    succeeded: bool,
    attempts: u32,
    conflicts: Vec<ChangeRecord>,
}

impl PubResult {
    /// A successful publish; the context's effects are in the parent
    pub fn success() -> Self {
        PubResult {
            succeeded: true,
            attempts: 1,
            conflicts: Vec::new(),
        }
    }

    /// A failed publish with the store's reported conflict set
    pub fn conflicted(conflicts: Vec<ChangeRecord>) -> Self {
        PubResult {
            succeeded: false,
            attempts: 1,
            conflicts,
        }
    }

    /// Whether the publish took effect
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Commit attempts the coordinator made to produce this result
    ///
    /// 1 for a bare `try_publish`; a retrying publish counts every
    /// re-attempt it drove.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    /// Change records contested with concurrently-published siblings
    ///
    /// Empty when the publish succeeded.
    pub fn conflicts(&self) -> &[ChangeRecord] {
        &self.conflicts
    }

    /// Number of contested change records
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

//! Collaborator boundary: the opaque managed-state store
//!
//! The engine does not compute conflicts or merge state itself. It drives
//! an external store through this trait and consumes the conflict sets the
//! store reports. Any storage engine can sit behind it; the contract is:
//!
//! - `attempt_commit` is atomic and, on failure, reports the precise set
//!   of change records contested between the view and concurrently
//!   published siblings.
//! - `discard` leaves no observable trace of the view outside itself.
//! - A view consumed by a successful commit is gone; reusing its handle
//!   is a protocol error.

use crate::error::Result;
use crate::types::{ChangeRecord, ViewHandle, ViewKind};

/// Outcome of the store's atomic commit primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The view's effects were folded into its parent atomically
    Committed,
    /// Nothing was folded; these records are in conflict
    Conflicted(Vec<ChangeRecord>),
}

impl CommitOutcome {
    /// Whether the commit took effect
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// Atomic commit/discard/child-view primitive of a managed-state engine
///
/// Implementations must be safe to drive from multiple threads; the
/// engine holds no lock of its own around these calls.
pub trait StateStore: Send + Sync {
    /// Handle of the store's root view
    ///
    /// The engine binds this to the global root context.
    fn root(&self) -> ViewHandle;

    /// Create a child view of `parent` with the given kind
    fn create_child(&self, parent: ViewHandle, kind: ViewKind) -> Result<ViewHandle>;

    /// Atomically attempt to fold `view`'s effects into its parent
    ///
    /// On `Committed` the view is consumed and its handle becomes invalid.
    /// On `Conflicted` the view stays usable so conflicted work can be
    /// rerun and the commit retried.
    fn attempt_commit(&self, view: ViewHandle) -> Result<CommitOutcome>;

    /// Drop `view` and every effect recorded in it
    ///
    /// A discarded view must leave no observable trace outside itself.
    fn discard(&self, view: ViewHandle) -> Result<()>;
}

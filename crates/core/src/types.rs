//! Identity types for contexts, tasks, views, and tracked locations
//!
//! All of these are cheap `Copy` handles. Equality of a [`ChangeRecord`]
//! is by managed-location identity, never by value: two records naming the
//! same location compare equal even if they were produced by different
//! operations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generational index naming one node in the context arena
///
/// Replaces a raw handle table: when a slot is released its generation is
/// bumped, so any `ContextId` still pointing at the old occupant fails to
/// resolve instead of silently aliasing the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId {
    index: u32,
    generation: u32,
}

impl ContextId {
    /// Create a context id from its raw parts
    pub fn new(index: u32, generation: u32) -> Self {
        ContextId { index, generation }
    }

    /// Slot index within the arena
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when this id was minted
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}.{}", self.index, self.generation)
    }
}

/// Process-unique identifier of one task attempt's owner
///
/// A task keeps its id across selective reruns; each rerun bumps the
/// attempt counter held by the tracker instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate the next process-unique task id
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Opaque handle naming one view inside a [`StateStore`](crate::StateStore)
///
/// The engine never interprets the value; it only passes it back to the
/// store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(u64);

impl ViewHandle {
    /// Wrap a raw handle issued by a store
    pub const fn new(raw: u64) -> Self {
        ViewHandle(raw)
    }

    /// Raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Identity of one tracked managed location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(u64);

impl LocationId {
    /// Wrap a raw location id
    pub fn new(raw: u64) -> Self {
        LocationId(raw)
    }

    /// Raw location value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc#{}", self.0)
    }
}

/// Opaque token identifying one tracked read or write of a managed location
///
/// Produced by the state store (or the accessors generated over it); the
/// engine only stores and compares these. Equality and hashing go through
/// the underlying location identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeRecord {
    location: LocationId,
}

impl ChangeRecord {
    /// Create a change record for a managed location
    pub fn new(location: LocationId) -> Self {
        ChangeRecord { location }
    }

    /// The managed location this record identifies
    pub fn location(&self) -> LocationId {
        self.location
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "change@{}", self.location)
    }
}

/// Classification of a context's view of its parent
///
/// The three kinds are mutually exclusive:
/// - `Mergeable` views accumulate effects that can be published into the
///   parent.
/// - `Snapshot` views pin the parent's state as of creation; local
///   modification is allowed but the view can never be published.
/// - `ReadOnly` views reject writes outright and can never be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewKind {
    /// Live view whose effects can be folded into the parent
    #[default]
    Mergeable,
    /// Point-in-time view of the parent; unmergeable
    Snapshot,
    /// Read-only view of the parent; unmergeable, writes rejected
    ReadOnly,
}

impl ViewKind {
    /// Whether a view of this kind can be published into its parent
    pub fn is_mergeable(&self) -> bool {
        matches!(self, ViewKind::Mergeable)
    }
}

/// Lifecycle status of one task attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Registered (or finished running) and awaiting publish
    Pending,
    /// Body currently executing
    Running,
    /// Context published; the task's effects are in the parent
    Published,
    /// Invalidated by a conflict set; awaiting rerun
    Conflicted,
    /// Body returned an error on its latest attempt
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_roundtrips_parts() {
        let id = ContextId::new(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(id.to_string(), "ctx#7.3");
    }

    #[test]
    fn stale_generation_is_not_equal() {
        assert_ne!(ContextId::new(7, 3), ContextId::new(7, 4));
    }

    #[test]
    fn task_ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
    }

    #[test]
    fn change_record_equality_is_by_location() {
        let a = ChangeRecord::new(LocationId::new(42));
        let b = ChangeRecord::new(LocationId::new(42));
        let c = ChangeRecord::new(LocationId::new(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn view_kind_mergeability() {
        assert!(ViewKind::Mergeable.is_mergeable());
        assert!(!ViewKind::Snapshot.is_mergeable());
        assert!(!ViewKind::ReadOnly.is_mergeable());
        assert_eq!(ViewKind::default(), ViewKind::Mergeable);
    }
}

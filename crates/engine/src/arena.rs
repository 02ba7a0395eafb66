//! Generational arena for context nodes
//!
//! Replaces a handle table keyed by raw native handles: slots are reused
//! through a free list, and every release bumps the slot's generation so
//! stale [`ContextId`]s resolve to nothing instead of aliasing a later
//! occupant. Liveness of a context is exactly "its id still resolves".

use isotx_core::types::{ContextId, ViewHandle, ViewKind};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::tracker::TaskTracker;

/// One node of the context tree
///
/// Parent links are plain ids: a node never owns its parent, and nothing
/// tracks children (merge is always child to parent).
pub(crate) struct ContextNode {
    pub parent: Option<ContextId>,
    pub kind: ViewKind,
    pub view: ViewHandle,
    /// Installed lazily by the first `run_task`; contexts that never run
    /// tasks pay nothing for tracking.
    pub tracker: Option<Arc<TaskTracker>>,
}

struct Slot {
    generation: u32,
    node: Option<ContextNode>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Arena of live context nodes
pub(crate) struct ContextArena {
    inner: RwLock<Slots>,
}

impl ContextArena {
    pub fn new() -> Self {
        ContextArena {
            inner: RwLock::new(Slots::default()),
        }
    }

    /// Insert a node, reusing a free slot when one exists
    pub fn insert(&self, node: ContextNode) -> ContextId {
        let mut inner = self.inner.write();
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.node = Some(node);
            ContextId::new(index, slot.generation)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            ContextId::new(index, 0)
        }
    }

    /// Remove a node, invalidating every outstanding id for its slot
    ///
    /// Returns the node so the caller can retire its view and tracker.
    pub fn release(&self, id: ContextId) -> Option<ContextNode> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() || slot.node.is_none() {
            return None;
        }
        let node = slot.node.take();
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(id.index());
        node
    }

    /// Run `f` against the node `id` resolves to, if it is still live
    pub fn with<R>(&self, id: ContextId, f: impl FnOnce(&ContextNode) -> R) -> Option<R> {
        let inner = self.inner.read();
        let slot = inner.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref().map(f)
    }

    /// Like [`ContextArena::with`] but with mutable access
    pub fn with_mut<R>(&self, id: ContextId, f: impl FnOnce(&mut ContextNode) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut().map(f)
    }

    /// Whether `id` still resolves to a live node
    pub fn contains(&self, id: ContextId) -> bool {
        self.with(id, |_| ()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> ContextNode {
        ContextNode {
            parent: None,
            kind: ViewKind::Mergeable,
            view: ViewHandle::new(1),
            tracker: None,
        }
    }

    #[test]
    fn insert_then_resolve() {
        let arena = ContextArena::new();
        let id = arena.insert(node());
        assert!(arena.contains(id));
        assert_eq!(arena.with(id, |n| n.view), Some(ViewHandle::new(1)));
    }

    #[test]
    fn release_invalidates_id() {
        let arena = ContextArena::new();
        let id = arena.insert(node());
        assert!(arena.release(id).is_some());
        assert!(!arena.contains(id));
        assert!(arena.release(id).is_none());
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let arena = ContextArena::new();
        let first = arena.insert(node());
        arena.release(first);
        let second = arena.insert(node());
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(!arena.contains(first));
        assert!(arena.contains(second));
    }

    #[test]
    fn with_mut_updates_node() {
        let arena = ContextArena::new();
        let id = arena.insert(node());
        arena.with_mut(id, |n| n.view = ViewHandle::new(9));
        assert_eq!(arena.with(id, |n| n.view), Some(ViewHandle::new(9)));
    }
}

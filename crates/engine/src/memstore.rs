//! In-memory reference state store
//!
//! [`MemStore`] implements the [`StateStore`] boundary over a versioned
//! key-value map. Every view records, per location, the version it
//! observed from its parent chain at first touch; `attempt_commit`
//! validates those base versions under a commit lock and reports the
//! mismatched locations as the conflict set. Both reads and writes record
//! a base version, so write-write races between siblings conflict even
//! when neither side read the other's output.
//!
//! [`Cell`] is the typed accessor over one managed location. It routes
//! reads and writes through the current context's view and registers them
//! with the context's task tracker when a task is running.

use dashmap::DashMap;
use isotx_core::error::{Error, Result};
use isotx_core::traits::{CommitOutcome, StateStore};
use isotx_core::types::{ChangeRecord, LocationId, ViewHandle, ViewKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::IsolationContext;
use crate::tracker::Task;

/// Value held at a managed location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Signed integer
    I64(i64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

#[derive(Debug, Clone)]
struct Committed {
    value: Value,
    version: u64,
}

#[derive(Debug)]
struct View {
    parent: ViewHandle,
    kind: ViewKind,
    /// Version observed from the parent chain at first touch, per location
    base: HashMap<LocationId, u64>,
    /// Local uncommitted values
    writes: HashMap<LocationId, Value>,
    /// Version stamps children validate against, per locally-written location
    stamps: HashMap<LocationId, u64>,
}

const ROOT: ViewHandle = ViewHandle::new(0);

/// Versioned in-memory state store
///
/// The root view reads and writes the committed map directly; child views
/// buffer writes locally until `attempt_commit` folds them one level up.
pub struct MemStore {
    committed: DashMap<LocationId, Committed>,
    views: DashMap<ViewHandle, View>,
    next_version: AtomicU64,
    next_view: AtomicU64,
    next_location: AtomicU64,
    commit_lock: Mutex<()>,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemStore {
            committed: DashMap::new(),
            views: DashMap::new(),
            next_version: AtomicU64::new(0),
            next_view: AtomicU64::new(1),
            next_location: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Allocate a fresh managed location
    pub fn allocate_location(&self) -> LocationId {
        LocationId::new(self.next_location.fetch_add(1, Ordering::Relaxed))
    }

    fn fresh_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Version of `location` as seen walking the chain starting at `view`
    ///
    /// Never holds more than one view guard at a time.
    fn visible_version(&self, view: ViewHandle, location: LocationId) -> u64 {
        let mut handle = view;
        loop {
            if handle == ROOT {
                return self
                    .committed
                    .get(&location)
                    .map(|c| c.version)
                    .unwrap_or(0);
            }
            let Some(v) = self.views.get(&handle) else {
                return 0;
            };
            if let Some(&stamp) = v.stamps.get(&location) {
                return stamp;
            }
            let next = v.parent;
            drop(v);
            handle = next;
        }
    }

    /// Value of `location` as seen walking the chain starting at `view`
    fn visible_value(&self, view: ViewHandle, location: LocationId) -> Option<Value> {
        let mut handle = view;
        loop {
            if handle == ROOT {
                return self.committed.get(&location).map(|c| c.value.clone());
            }
            let Some(v) = self.views.get(&handle) else {
                return None;
            };
            if let Some(value) = v.writes.get(&location) {
                return Some(value.clone());
            }
            let next = v.parent;
            drop(v);
            handle = next;
        }
    }

    /// Everything visible from `view`, nearest ancestor winning
    fn visible_contents(&self, view: ViewHandle) -> HashMap<LocationId, (Value, u64)> {
        let mut out = HashMap::new();
        let mut handle = view;
        loop {
            if handle == ROOT {
                for entry in self.committed.iter() {
                    out.entry(*entry.key())
                        .or_insert_with(|| (entry.value().value.clone(), entry.value().version));
                }
                return out;
            }
            let Some(v) = self.views.get(&handle) else {
                return out;
            };
            for (loc, value) in &v.writes {
                let stamp = v.stamps.get(loc).copied().unwrap_or(0);
                out.entry(*loc)
                    .or_insert_with(|| (value.clone(), stamp));
            }
            let next = v.parent;
            drop(v);
            handle = next;
        }
    }

    /// Read `location` through `view`
    pub fn read(&self, view: ViewHandle, location: LocationId) -> Result<Option<Value>> {
        if view == ROOT {
            return Ok(self.committed.get(&location).map(|c| c.value.clone()));
        }
        let (parent, kind, local) = {
            let v = self
                .views
                .get(&view)
                .ok_or_else(|| Error::store(format!("unknown view {view:?}")))?;
            (v.parent, v.kind, v.writes.get(&location).cloned())
        };
        if let Some(value) = local {
            return Ok(Some(value));
        }
        if kind == ViewKind::Snapshot {
            // Snapshots are fully materialized at creation; a miss means
            // the location did not exist then.
            return Ok(None);
        }
        let version = self.visible_version(parent, location);
        let value = self.visible_value(parent, location);
        if kind == ViewKind::Mergeable {
            if let Some(mut v) = self.views.get_mut(&view) {
                v.base.entry(location).or_insert(version);
            }
        }
        Ok(value)
    }

    /// Write `value` at `location` through `view`
    ///
    /// Writes through the root view commit immediately.
    pub fn write(&self, view: ViewHandle, location: LocationId, value: Value) -> Result<()> {
        if view == ROOT {
            // Root writes land in the same map committers fold into;
            // without the commit lock a fold that validated before this
            // write could overwrite it without reporting a conflict.
            let _commit = self.commit_lock.lock();
            let version = self.fresh_version();
            self.committed.insert(location, Committed { value, version });
            return Ok(());
        }
        let (parent, kind) = {
            let v = self
                .views
                .get(&view)
                .ok_or_else(|| Error::store(format!("unknown view {view:?}")))?;
            (v.parent, v.kind)
        };
        if kind == ViewKind::ReadOnly {
            return Err(Error::ReadOnlyView);
        }
        // Parent-visible version is computed before reacquiring the view
        // guard; two guards on the same map can deadlock.
        let base_version = self.visible_version(parent, location);
        let stamp = self.fresh_version();
        let mut v = self
            .views
            .get_mut(&view)
            .ok_or_else(|| Error::store(format!("unknown view {view:?}")))?;
        if v.kind == ViewKind::Mergeable {
            v.base.entry(location).or_insert(base_version);
        }
        v.writes.insert(location, value);
        v.stamps.insert(location, stamp);
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

impl StateStore for MemStore {
    fn root(&self) -> ViewHandle {
        ROOT
    }

    fn create_child(&self, parent: ViewHandle, kind: ViewKind) -> Result<ViewHandle> {
        if parent != ROOT && !self.views.contains_key(&parent) {
            return Err(Error::store(format!("unknown parent view {parent:?}")));
        }
        let handle = ViewHandle::new(self.next_view.fetch_add(1, Ordering::Relaxed));
        let mut view = View {
            parent,
            kind,
            base: HashMap::new(),
            writes: HashMap::new(),
            stamps: HashMap::new(),
        };
        if kind == ViewKind::Snapshot {
            for (loc, (value, stamp)) in self.visible_contents(parent) {
                view.writes.insert(loc, value);
                view.stamps.insert(loc, stamp);
            }
        }
        self.views.insert(handle, view);
        Ok(handle)
    }

    fn attempt_commit(&self, view: ViewHandle) -> Result<CommitOutcome> {
        let _commit = self.commit_lock.lock();
        let (_, mut v) = self
            .views
            .remove(&view)
            .ok_or_else(|| Error::store(format!("unknown view {view:?}")))?;
        if !v.kind.is_mergeable() {
            self.views.insert(view, v);
            return Err(Error::store("view is not mergeable"));
        }

        let mut conflicts: Vec<ChangeRecord> = Vec::new();
        let mut refreshed: Vec<(LocationId, u64)> = Vec::new();
        for (&location, &base_version) in &v.base {
            let current = self.visible_version(v.parent, location);
            if current != base_version {
                conflicts.push(ChangeRecord::new(location));
                refreshed.push((location, current));
            }
        }
        if !conflicts.is_empty() {
            // Conflicted locations are rolled back and their bases
            // refreshed: a rerun task re-reads the value that beat it and
            // recomputes, instead of republishing a stale local write.
            for (location, current) in refreshed {
                v.base.insert(location, current);
                v.writes.remove(&location);
                v.stamps.remove(&location);
            }
            self.views.insert(view, v);
            conflicts.sort_by_key(|c| c.location());
            return Ok(CommitOutcome::Conflicted(conflicts));
        }

        let commit_version = self.fresh_version();
        if v.parent == ROOT {
            for (location, value) in v.writes {
                self.committed.insert(
                    location,
                    Committed {
                        value,
                        version: commit_version,
                    },
                );
            }
        } else {
            let mut parent = self
                .views
                .get_mut(&v.parent)
                .ok_or_else(|| Error::store("parent view vanished during commit"))?;
            for (location, value) in v.writes {
                // The child's base for a written location is exactly what
                // the parent chain showed, so it doubles as the parent's
                // own first-touch record.
                if let Some(&base) = v.base.get(&location) {
                    parent.base.entry(location).or_insert(base);
                }
                parent.writes.insert(location, value);
                parent.stamps.insert(location, commit_version);
            }
        }
        Ok(CommitOutcome::Committed)
    }

    fn discard(&self, view: ViewHandle) -> Result<()> {
        if view == ROOT {
            return Err(Error::store("cannot discard the root view"));
        }
        self.views
            .remove(&view)
            .map(|_| ())
            .ok_or_else(|| Error::store(format!("unknown view {view:?}")))
    }
}

/// Typed accessor over one managed location
///
/// Reads and writes go through the supplied context's view. When a task
/// is current, every access is registered with the context's dependency
/// tracker, which is what makes selective rerun possible.
#[derive(Clone)]
pub struct Cell {
    store: Arc<MemStore>,
    location: LocationId,
}

impl Cell {
    /// Allocate a fresh location in `store`
    pub fn new(store: &Arc<MemStore>) -> Cell {
        Cell {
            store: store.clone(),
            location: store.allocate_location(),
        }
    }

    /// The managed location this cell names
    pub fn location(&self) -> LocationId {
        self.location
    }

    /// Read through `ctx`, registering a read dependency for the current
    /// task
    pub fn get(&self, ctx: &IsolationContext) -> Result<Option<Value>> {
        let view = ctx.view()?;
        let value = self.store.read(view, self.location)?;
        if let Some(task) = Task::current() {
            ctx.add_read(task, ChangeRecord::new(self.location));
        }
        Ok(value)
    }

    /// Write through `ctx`, registering a write dependency for the
    /// current task
    pub fn set(&self, ctx: &IsolationContext, value: impl Into<Value>) -> Result<()> {
        let view = ctx.view()?;
        self.store.write(view, self.location, value.into())?;
        if let Some(task) = Task::current() {
            ctx.add_write(task, ChangeRecord::new(self.location));
        }
        Ok(())
    }
}

//! Per-context task dependency tracker
//!
//! Records, for every task that ran inside a context, the ordered set of
//! change records it read and wrote, plus a last-writer index mapping
//! each written change to the task that most recently wrote it (earlier
//! writers are superseded, not retained). Given a publish conflict set,
//! [`TaskTracker::conflicted_tasks`] computes the minimal set of tasks
//! that must be re-executed: direct hits (read or write set intersects
//! the conflict set) plus, transitively, any task that read a location
//! last written by an affected task. Everything else keeps its results.
//!
//! Multiple threads may register reads and writes concurrently inside one
//! context; the tracker serializes those updates behind its own lock and
//! never holds that lock while a task body runs.

use isotx_core::error::Result;
use isotx_core::types::{ChangeRecord, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::scope;

/// A task's re-runnable body
///
/// Bodies are retained so conflicted tasks can be replayed; they must be
/// safe to call more than once.
pub type TaskBody = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Accessor namespace for the thread's current task
///
/// Generated accessors use this to attribute reads and writes while a
/// task body is executing.
pub struct Task;

impl Task {
    /// The task currently executing on this thread, if any
    pub fn current() -> Option<TaskId> {
        scope::current_task()
    }
}

struct TaskEntry {
    body: TaskBody,
    reads: Vec<ChangeRecord>,
    writes: Vec<ChangeRecord>,
    read_index: HashSet<ChangeRecord>,
    write_index: HashSet<ChangeRecord>,
    status: TaskStatus,
    attempt: u32,
}

impl TaskEntry {
    fn new(body: TaskBody) -> Self {
        TaskEntry {
            body,
            reads: Vec::new(),
            writes: Vec::new(),
            read_index: HashSet::new(),
            write_index: HashSet::new(),
            status: TaskStatus::Pending,
            attempt: 1,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Task ids in registration order; rerun preserves this order
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    /// Most recent writer per change; at most one task per change
    last_writer: HashMap<ChangeRecord, TaskId>,
}

/// Read/write-set tracker for the tasks of one context
pub struct TaskTracker {
    inner: Mutex<Inner>,
}

impl TaskTracker {
    pub(crate) fn new() -> Self {
        TaskTracker {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a task attempt in registration order
    pub fn add(&self, id: TaskId, body: TaskBody) {
        let mut inner = self.inner.lock();
        inner.order.push(id);
        inner.tasks.insert(id, TaskEntry::new(body));
    }

    /// Record that `task` read `change`; first-touch order, deduplicated
    pub fn add_read(&self, task: TaskId, change: ChangeRecord) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.tasks.get_mut(&task) {
            if entry.read_index.insert(change) {
                entry.reads.push(change);
            }
        }
    }

    /// Record that `task` wrote `change`, superseding any prior writer
    pub fn add_write(&self, task: TaskId, change: ChangeRecord) {
        let mut inner = self.inner.lock();
        let known = match inner.tasks.get_mut(&task) {
            Some(entry) => {
                if entry.write_index.insert(change) {
                    entry.writes.push(change);
                }
                true
            }
            None => false,
        };
        if known {
            inner.last_writer.insert(change, task);
        }
    }

    /// The task that most recently wrote `change` in this context
    pub fn last_writer(&self, change: &ChangeRecord) -> Option<TaskId> {
        self.inner.lock().last_writer.get(change).copied()
    }

    /// Current status of a registered task
    pub fn status(&self, task: TaskId) -> Option<TaskStatus> {
        self.inner.lock().tasks.get(&task).map(|e| e.status)
    }

    /// Attempt count of a registered task (1 after the initial run)
    pub fn attempt(&self, task: TaskId) -> Option<u32> {
        self.inner.lock().tasks.get(&task).map(|e| e.attempt)
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// A task's recorded reads in first-touch order
    pub fn reads_of(&self, task: TaskId) -> Vec<ChangeRecord> {
        self.inner
            .lock()
            .tasks
            .get(&task)
            .map(|e| e.reads.clone())
            .unwrap_or_default()
    }

    /// A task's recorded writes in first-touch order
    pub fn writes_of(&self, task: TaskId) -> Vec<ChangeRecord> {
        self.inner
            .lock()
            .tasks
            .get(&task)
            .map(|e| e.writes.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_status(&self, task: TaskId, status: TaskStatus) {
        if let Some(entry) = self.inner.lock().tasks.get_mut(&task) {
            entry.status = status;
        }
    }

    pub(crate) fn mark_all_published(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.tasks.values_mut() {
            entry.status = TaskStatus::Published;
        }
    }

    /// Minimal set of tasks invalidated by `conflicts`, registration order
    ///
    /// Direct hits first: tasks whose read or write set intersects the
    /// conflict set. Then the transitive closure: a task that read a
    /// location last written by an affected task is affected too.
    pub fn conflicted_tasks(&self, conflicts: &[ChangeRecord]) -> Vec<TaskId> {
        let inner = self.inner.lock();
        let contested: HashSet<ChangeRecord> = conflicts.iter().copied().collect();
        let mut affected: HashSet<TaskId> = HashSet::new();

        for (&id, entry) in &inner.tasks {
            if entry.read_index.iter().any(|c| contested.contains(c))
                || entry.write_index.iter().any(|c| contested.contains(c))
            {
                affected.insert(id);
            }
        }

        // Transitive step to a fixpoint: reads of an affected task's
        // last-written locations drag their readers in.
        loop {
            let mut grew = false;
            for (&id, entry) in &inner.tasks {
                if affected.contains(&id) {
                    continue;
                }
                let depends = entry.reads.iter().any(|c| {
                    inner
                        .last_writer
                        .get(c)
                        .map(|w| affected.contains(w))
                        .unwrap_or(false)
                });
                if depends {
                    affected.insert(id);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        inner
            .order
            .iter()
            .copied()
            .filter(|id| affected.contains(id))
            .collect()
    }

    /// Replace each affected task with a fresh attempt and hand back the
    /// bodies to re-execute, in registration order
    ///
    /// Clears the tasks' read/write sets, bumps their attempt counters,
    /// and drops their stale last-writer entries; re-execution repopulates
    /// everything.
    pub(crate) fn begin_rerun(&self, affected: &[TaskId]) -> Vec<(TaskId, TaskBody)> {
        let mut inner = self.inner.lock();
        let mut reruns = Vec::with_capacity(affected.len());
        for &id in affected {
            let taken = match inner.tasks.get_mut(&id) {
                Some(entry) => {
                    let stale: Vec<ChangeRecord> = entry.writes.drain(..).collect();
                    entry.reads.clear();
                    entry.read_index.clear();
                    entry.write_index.clear();
                    entry.attempt += 1;
                    entry.status = TaskStatus::Conflicted;
                    Some((stale, entry.body.clone()))
                }
                None => None,
            };
            let Some((stale, body)) = taken else { continue };
            for change in stale {
                if inner.last_writer.get(&change) == Some(&id) {
                    inner.last_writer.remove(&change);
                }
            }
            reruns.push((id, body));
        }
        reruns
    }
}

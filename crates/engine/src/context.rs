//! The context tree: engines, isolation contexts, and publish
//!
//! An [`Engine`] binds a state store to an arena of context nodes and a
//! root context. An [`IsolationContext`] is a cheap cloneable handle into
//! that arena; all tree operations (nesting, scoping, task bookkeeping,
//! publish, discard) live here.
//!
//! Publish protocol: [`IsolationContext::try_publish`] is the single
//! point of contact with the store's atomic commit primitive. On success
//! the node is retired (absorbed into its parent); on conflict it stays
//! alive so [`IsolationContext::publish`] can rerun the conflicted tasks
//! and try again under the control of the supplied retry policies.

use isotx_core::error::{Error, Result};
use isotx_core::traits::{CommitOutcome, StateStore};
use isotx_core::types::{ChangeRecord, ContextId, TaskId, TaskStatus, ViewHandle, ViewKind};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

use crate::arena::{ContextArena, ContextNode};
use crate::memstore::MemStore;
use crate::publish::PubResult;
use crate::retry::{self, KeepGoing, RetryControl, RetryPolicy};
use crate::scope::{self, ScopeGuard};
use crate::tracker::{TaskBody, TaskTracker};

pub(crate) struct EngineShared {
    store: Arc<dyn StateStore>,
    arena: ContextArena,
    root: ContextId,
}

/// A state store bound to a context tree
///
/// Most programs use the process-wide [`Engine::global`] implicitly
/// through [`scope::current`]; tests and embedders that bring their own
/// [`StateStore`] construct their own engine and enter its root.
pub struct Engine {
    shared: Arc<EngineShared>,
}

static GLOBAL: Lazy<Engine> = Lazy::new(|| Engine::new(Arc::new(MemStore::new())));

impl Engine {
    /// Bind `store` to a fresh context tree
    ///
    /// The store's root view becomes the engine's root context.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let arena = ContextArena::new();
        let root_view = store.root();
        let root = arena.insert(ContextNode {
            parent: None,
            kind: ViewKind::Mergeable,
            view: root_view,
            tracker: None,
        });
        Engine {
            shared: Arc::new(EngineShared { store, arena, root }),
        }
    }

    /// The process-wide engine over a default in-memory store
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    /// The root context of this engine's tree
    ///
    /// Always alive; it can be entered but never published or discarded.
    pub fn root(&self) -> IsolationContext {
        IsolationContext {
            id: self.shared.root,
            engine: self.shared.clone(),
        }
    }
}

/// Handle to one node of a context tree
///
/// Clones are cheap and all refer to the same node. A handle can outlive
/// its node: operations on a retired context fail with
/// [`Error::StaleContext`] or a commit-protocol error rather than
/// touching a reused slot.
#[derive(Clone)]
pub struct IsolationContext {
    id: ContextId,
    engine: Arc<EngineShared>,
}

impl PartialEq for IsolationContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl Eq for IsolationContext {}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id)
            .finish()
    }
}

impl IsolationContext {
    /// The context bound to the calling thread
    pub fn current() -> IsolationContext {
        scope::current()
    }

    /// The global engine's root context
    pub fn global() -> IsolationContext {
        Engine::global().root()
    }

    /// This context's arena id
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether this node has not yet been published or discarded
    pub fn is_alive(&self) -> bool {
        self.engine.arena.contains(self.id)
    }

    /// The view kind this context was created with, if still alive
    pub fn view_kind(&self) -> Option<ViewKind> {
        self.engine.arena.with(self.id, |n| n.kind)
    }

    /// Whether this context's effects can be published into its parent
    pub fn is_mergeable(&self) -> bool {
        self.view_kind().map(|k| k.is_mergeable()).unwrap_or(false)
    }

    /// Whether this context is a point-in-time snapshot of its parent
    pub fn is_snapshot(&self) -> bool {
        matches!(self.view_kind(), Some(ViewKind::Snapshot))
    }

    /// Whether this context rejects writes
    pub fn is_read_only(&self) -> bool {
        matches!(self.view_kind(), Some(ViewKind::ReadOnly))
    }

    /// The store view backing this context
    pub fn view(&self) -> Result<ViewHandle> {
        self.engine
            .arena
            .with(self.id, |n| n.view)
            .ok_or(Error::StaleContext)
    }

    /// This context's parent, if it has one and this node is alive
    pub fn parent(&self) -> Option<IsolationContext> {
        self.engine
            .arena
            .with(self.id, |n| n.parent)
            .flatten()
            .map(|id| IsolationContext {
                id,
                engine: self.engine.clone(),
            })
    }

    /// Create a child context viewing this one
    ///
    /// Fails only if this context is no longer alive.
    pub fn create_nested(&self, kind: ViewKind) -> Result<IsolationContext> {
        let view = self
            .engine
            .arena
            .with(self.id, |n| n.view)
            .ok_or(Error::ContextNotAlive)?;
        let child_view = self.engine.store.create_child(view, kind)?;
        let id = self.engine.arena.insert(ContextNode {
            parent: Some(self.id),
            kind,
            view: child_view,
            tracker: None,
        });
        tracing::debug!(parent = %self.id, child = %id, ?kind, "created nested context");
        Ok(IsolationContext {
            id,
            engine: self.engine.clone(),
        })
    }

    /// Rebind the calling thread's current context to this one
    ///
    /// The returned guard restores the prior binding on drop; see
    /// [`ScopeGuard`] for the mismatched-exit behavior.
    pub fn enter(&self) -> ScopeGuard {
        ScopeGuard::enter(self)
    }

    /// Run `f` with this context current, restoring the prior binding
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = self.enter();
        f()
    }

    /// Drop this context and every effect recorded in it
    ///
    /// No write performed inside becomes observable from the parent or
    /// from sibling contexts.
    pub fn discard(&self) -> Result<()> {
        if self.id == self.engine.root {
            return Err(Error::commit_protocol("cannot discard the root context"));
        }
        let node = self
            .engine
            .arena
            .release(self.id)
            .ok_or(Error::StaleContext)?;
        self.engine.store.discard(node.view)?;
        tracing::debug!(context = %self.id, "discarded context");
        Ok(())
    }

    // === Task bookkeeping ===

    fn tracker(&self) -> Option<Arc<TaskTracker>> {
        self.engine
            .arena
            .with(self.id, |n| n.tracker.clone())
            .flatten()
    }

    fn tracker_or_install(&self) -> Result<Arc<TaskTracker>> {
        self.engine
            .arena
            .with_mut(self.id, |n| {
                n.tracker
                    .get_or_insert_with(|| Arc::new(TaskTracker::new()))
                    .clone()
            })
            .ok_or(Error::ContextNotAlive)
    }

    /// Run `body` as a tracked task of this context
    ///
    /// Installs the task tracker on first use, makes this context and the
    /// new task current for the duration of the body, and retains the
    /// body so a later conflict can rerun it.
    pub fn run_task<F>(&self, body: F) -> Result<TaskId>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let tracker = self.tracker_or_install()?;
        let id = TaskId::next();
        let body: TaskBody = Arc::new(body);
        tracker.add(id, body.clone());
        self.execute_task(&tracker, id, &body)?;
        Ok(id)
    }

    fn execute_task(&self, tracker: &TaskTracker, id: TaskId, body: &TaskBody) -> Result<()> {
        let _scope = self.enter();
        let _task = scope::enter_task(id);
        tracker.set_status(id, TaskStatus::Running);
        let outcome = body();
        let status = if outcome.is_ok() {
            TaskStatus::Pending
        } else {
            TaskStatus::Failed
        };
        tracker.set_status(id, status);
        outcome
    }

    /// Record that `task` read `change`; no-op if this context does not
    /// track tasks
    pub fn add_read(&self, task: TaskId, change: ChangeRecord) {
        if let Some(tracker) = self.tracker() {
            tracker.add_read(task, change);
        }
    }

    /// Record that `task` wrote `change`; no-op if this context does not
    /// track tasks
    pub fn add_write(&self, task: TaskId, change: ChangeRecord) {
        if let Some(tracker) = self.tracker() {
            tracker.add_write(task, change);
        }
    }

    /// The task that most recently wrote `change` in this context
    pub fn last_writer(&self, change: &ChangeRecord) -> Option<TaskId> {
        self.tracker().and_then(|t| t.last_writer(change))
    }

    /// This context's task tracker, if any task ever ran here
    pub fn tasks(&self) -> Option<Arc<TaskTracker>> {
        self.tracker()
    }

    /// Re-execute only the tasks invalidated by a publish conflict set
    ///
    /// Tasks whose sets are disjoint from the conflicts (and from the
    /// affected tasks' outputs) are left alone; their results are kept
    /// for the next publish attempt. No-op for contexts without tasks.
    pub fn rerun_conflicted_tasks(&self, result: &PubResult) -> Result<()> {
        let Some(tracker) = self.tracker() else {
            tracing::debug!(context = %self.id, "no tasks to rerun");
            return Ok(());
        };
        let affected = tracker.conflicted_tasks(result.conflicts());
        if affected.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            context = %self.id,
            affected = affected.len(),
            total = tracker.task_count(),
            "rerunning conflicted tasks"
        );
        let reruns = tracker.begin_rerun(&affected);
        for (id, body) in reruns {
            self.execute_task(&tracker, id, &body)?;
        }
        Ok(())
    }

    // === Publish ===

    /// One atomic attempt to fold this context into its parent
    ///
    /// Success retires the context. Conflict leaves it alive and returns
    /// the store's conflict set. Publishing the root, a non-mergeable
    /// view, or a context that is already dead is a commit-protocol
    /// error, never a silent no-op.
    pub fn try_publish(&self) -> Result<PubResult> {
        if self.id == self.engine.root {
            return Err(Error::commit_protocol("cannot publish the root context"));
        }
        let (view, kind) = self
            .engine
            .arena
            .with(self.id, |n| (n.view, n.kind))
            .ok_or_else(|| {
                Error::commit_protocol(format!(
                    "publish on dead or already-published context {}",
                    self.id
                ))
            })?;
        if !kind.is_mergeable() {
            return Err(Error::commit_protocol(format!(
                "{kind:?} view cannot be published"
            )));
        }
        match self.engine.store.attempt_commit(view)? {
            CommitOutcome::Committed => {
                let node = self.engine.arena.release(self.id);
                if let Some(tracker) = node.and_then(|n| n.tracker) {
                    tracker.mark_all_published();
                }
                tracing::debug!(context = %self.id, "published");
                Ok(PubResult::success())
            }
            CommitOutcome::Conflicted(conflicts) => {
                tracing::debug!(
                    context = %self.id,
                    conflicts = conflicts.len(),
                    "publish conflicted"
                );
                Ok(PubResult::conflicted(conflicts))
            }
        }
    }

    /// Publish with retries driven by the supplied policies
    ///
    /// After each failed attempt the policies' controls are consulted in
    /// order and folded with [`KeepGoing::having_seen`]; while the fold
    /// is [`KeepGoing::Yes`], the conflicted tasks are rerun and the
    /// publish re-attempted. Returns the last [`PubResult`] either way,
    /// carrying the number of commit attempts made.
    pub fn publish(&self, options: &[Arc<dyn RetryPolicy>]) -> Result<PubResult> {
        let mut attempts: u32 = 1;
        let mut result = self.try_publish()?;
        if result.succeeded() {
            return Ok(result);
        }
        let mut controls: Vec<Box<dyn RetryControl>> =
            options.iter().map(|o| o.start()).collect();
        while !result.succeeded() {
            if retry::consult(&mut controls) != KeepGoing::Yes {
                break;
            }
            self.rerun_conflicted_tasks(&result)?;
            attempts += 1;
            result = self.try_publish()?;
        }
        result.set_attempts(attempts);
        Ok(result)
    }
}

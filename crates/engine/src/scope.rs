//! Thread-scoped current-context binding
//!
//! Each thread carries an implicit "current context". Threads that never
//! entered a scope see the global root. Entering a scope rebinds current
//! and hands back a guard; dropping the guard restores whatever was
//! current immediately before entry, but only if the thread's binding is
//! still the one this scope installed. A mismatch (crossed enter/exit
//! nesting) degrades to a no-op with a warning rather than clobbering a
//! binding some other scope now owns.
//!
//! Thread-locals do not cross `std::thread::spawn`, so fork inheritance
//! is explicit: [`spawn`] captures the spawning thread's current context
//! and installs it as the child thread's initial binding.

use isotx_core::types::TaskId;
use std::cell::{Cell, RefCell};
use std::thread::{self, JoinHandle};

use crate::context::{Engine, IsolationContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<IsolationContext>> = RefCell::new(None);
    static CURRENT_TASK: Cell<Option<TaskId>> = Cell::new(None);
}

/// The context bound to the calling thread
///
/// Defaults to the global root when nothing has been entered on this
/// thread (and nothing was inherited through [`spawn`]).
pub fn current() -> IsolationContext {
    try_current().unwrap_or_else(|| Engine::global().root())
}

pub(crate) fn try_current() -> Option<IsolationContext> {
    CURRENT_CONTEXT.with(|c| c.borrow().clone())
}

pub(crate) fn current_task() -> Option<TaskId> {
    CURRENT_TASK.with(|t| t.get())
}

/// Guard binding the thread's current task for a body's duration
///
/// Restores the prior task on drop, on every exit path including
/// unwinds, mirroring what [`ScopeGuard`] does for the context.
pub(crate) struct TaskGuard {
    prior: Option<TaskId>,
}

pub(crate) fn enter_task(task: TaskId) -> TaskGuard {
    TaskGuard {
        prior: CURRENT_TASK.with(|t| t.replace(Some(task))),
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        CURRENT_TASK.with(|t| t.set(self.prior.take()));
    }
}

/// Guard returned by [`IsolationContext::enter`]
///
/// Restores the prior binding on drop, on every exit path including
/// unwinds.
pub struct ScopeGuard {
    installed: IsolationContext,
    prior: Option<IsolationContext>,
}

impl ScopeGuard {
    pub(crate) fn enter(ctx: &IsolationContext) -> ScopeGuard {
        let prior = CURRENT_CONTEXT.with(|c| c.borrow_mut().replace(ctx.clone()));
        ScopeGuard {
            installed: ctx.clone(),
            prior,
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|c| {
            let mut current = c.borrow_mut();
            // We only go back to the prior binding if we are still the
            // one installed; another scope may have taken over.
            match current.as_ref() {
                Some(installed) if *installed == self.installed => {
                    *current = self.prior.take();
                }
                _ => {
                    tracing::warn!(
                        installed = %self.installed.id(),
                        "scope exit found a different current context; leaving it in place"
                    );
                }
            }
        });
    }
}

/// Spawn a thread that inherits the caller's current context
///
/// The child thread observes the spawning thread's current context as its
/// initial binding; the current task is deliberately not inherited.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let inherited = try_current();
    thread::spawn(move || match inherited {
        Some(ctx) => {
            let _scope = ctx.enter();
            f()
        }
        None => f(),
    })
}

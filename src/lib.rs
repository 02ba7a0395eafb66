//! isotx - Nested isolation-context transactions with selective task rerun
//!
//! isotx runs speculative computations inside nested isolation contexts:
//! private views of an opaque managed-state store that publish their
//! effects atomically into the parent view, or are discarded whole.
//! Failed publishes report a conflict set; the engine reruns only the
//! tasks whose recorded read/write sets were invalidated, then retries
//! under composable retry policies.
//!
//! # Quick Start
//!
//! ```
//! use isotx::{run_transaction, rerun_n_times, current, Cell, Engine, MemStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemStore::new());
//! let engine = Engine::new(store.clone());
//! let _scope = engine.root().enter();
//!
//! let balance = Cell::new(&store);
//! run_transaction(
//!     || balance.set(&current(), 100),
//!     &[rerun_n_times(3)],
//! )?;
//! # Ok::<(), isotx::Error>(())
//! ```
//!
//! # Architecture
//!
//! The engine never interprets state: reads, writes, merging, and
//! conflict detection belong to the store behind the [`StateStore`]
//! trait. [`MemStore`] is the bundled in-memory implementation; embedders
//! with their own store implement the trait and hand it to
//! [`Engine::new`].

pub mod prelude;

// Re-export the public API from the core and engine crates
pub use isotx_core::{
    ChangeRecord, CommitOutcome, ContextId, Error, LocationId, Result, StateStore, TaskId,
    TaskStatus, ViewHandle, ViewKind,
};
pub use isotx_engine::{
    current, rerun_n_times, run_reported, run_transaction, spawn, Cell, Engine, IsolationContext,
    KeepGoing, MemStore, MergeReport, NoReport, PubResult, PubTrace, RetryControl, RetryPolicy,
    ScopeGuard, Task, TaskTracker, Value,
};

//! Isolation-context transaction engine
//!
//! This crate implements nested speculative execution over an opaque
//! managed-state store:
//!
//! - A context tree (arena-backed, generational ids) whose nodes are
//!   private views of shared state.
//! - A thread-scoped "current context" binding with inheritance across
//!   [`scope::spawn`].
//! - A per-context task dependency tracker that records read/write sets
//!   and reruns only the tasks invalidated by a reported conflict set.
//! - A publish/merge coordinator that folds a context into its parent and
//!   drives retries through composable [`retry::RetryPolicy`] values.
//! - A transaction runner that wraps the whole protocol behind
//!   [`runner::run_transaction`].
//!
//! Conflict detection and state merging are owned by the store behind
//! [`isotx_core::StateStore`]; this crate only consumes the conflict sets
//! it reports. [`memstore::MemStore`] is the in-memory reference
//! implementation of that boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub(crate) mod arena;
pub mod context;
pub mod memstore;
pub mod publish;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scope;
pub mod tracker;

pub use context::{Engine, IsolationContext};
pub use memstore::{Cell, MemStore, Value};
pub use publish::PubResult;
pub use report::{MergeReport, NoReport, PubTrace};
pub use retry::{rerun_n_times, KeepGoing, RetryControl, RetryPolicy};
pub use runner::{run_reported, run_transaction};
pub use scope::{current, spawn, ScopeGuard};
pub use tracker::{Task, TaskBody, TaskTracker};

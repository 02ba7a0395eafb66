//! Core types for the isotx isolation-context engine
//!
//! This crate holds the leaf vocabulary shared by every other crate:
//! identity types (context ids, task ids, view handles, change records),
//! the error taxonomy, and the `StateStore` trait that marks the boundary
//! to the opaque managed-state collaborator. Nothing here knows about the
//! context tree, the retry loop, or task scheduling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{CommitOutcome, StateStore};
pub use types::{ChangeRecord, ContextId, LocationId, TaskId, TaskStatus, ViewHandle, ViewKind};

//! Convenience imports for embedders
//!
//! `use isotx::prelude::*;` pulls in the items nearly every integration
//! touches: the engine and context handles, the runner entry points, the
//! retry vocabulary, and the reference store.

pub use crate::{
    current, rerun_n_times, run_reported, run_transaction, spawn, Cell, CommitOutcome, Engine,
    Error, IsolationContext, KeepGoing, MemStore, MergeReport, NoReport, PubResult, PubTrace,
    Result, RetryPolicy, StateStore, Value, ViewKind,
};

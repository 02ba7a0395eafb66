//! The transaction runner
//!
//! [`run_transaction`] wraps the whole protocol: create a nested context
//! under the caller's current context, run the body inside it, publish,
//! and on conflict consult the retry policies and start over with a
//! fresh context. Each attempt is all-or-nothing; a failed attempt's
//! context is discarded whole, so the caller never observes partial
//! effects.
//!
//! Retry controls are created once per call and carried across attempts,
//! so a bounded policy spends its budget over the whole sequence rather
//! than resetting each time.

use isotx_core::error::{Error, Result};
use isotx_core::types::ViewKind;
use std::sync::Arc;

use crate::report::{MergeReport, NoReport};
use crate::retry::{self, KeepGoing, RetryControl, RetryPolicy};
use crate::scope;

/// Run `body` transactionally against the current context
///
/// Equivalent to [`run_reported`] with a report that observes nothing.
///
/// # Example
///
/// ```
/// use isotx_engine::{retry, runner};
///
/// let total = runner::run_transaction(
///     || Ok(21 + 21),
///     &[retry::rerun_n_times(3)],
/// )?;
/// assert_eq!(total, 42);
/// # Ok::<(), isotx_core::Error>(())
/// ```
pub fn run_transaction<T, F>(body: F, options: &[Arc<dyn RetryPolicy>]) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    run_reported(body, options, &mut NoReport)
}

/// Run `body` transactionally, notifying `report` of every transition
///
/// The sequence is: `reset` once, then per attempt `before_run`, a fresh
/// nested context, the body, and a publish. A successful publish fires
/// `note_success` and returns the body's value. A conflicted publish
/// consults the retry controls; anything but a unanimous go fires
/// `note_failure` and returns [`Error::RetryExhausted`]. A body error is
/// never retried: the attempt's context is discarded and the error
/// propagates after `note_failure`.
pub fn run_reported<T, F, R>(mut body: F, options: &[Arc<dyn RetryPolicy>], report: &mut R) -> Result<T>
where
    F: FnMut() -> Result<T>,
    R: MergeReport + ?Sized,
{
    report.reset();
    let mut controls: Vec<Box<dyn RetryControl>> = options.iter().map(|o| o.start()).collect();
    let parent = scope::current();
    let mut attempts: u32 = 0;

    loop {
        report.before_run();
        attempts += 1;
        let child = parent.create_nested(ViewKind::Mergeable)?;

        let value = match child.run(&mut body) {
            Ok(value) => value,
            Err(err) => {
                child.discard()?;
                report.note_failure();
                return Err(err);
            }
        };

        let result = match child.try_publish() {
            Ok(result) => result,
            Err(err) => {
                child.discard()?;
                report.note_failure();
                return Err(err);
            }
        };
        if result.succeeded() {
            report.note_success();
            return Ok(value);
        }

        tracing::debug!(
            attempt = attempts,
            conflicts = result.conflict_count(),
            "transaction attempt conflicted"
        );
        child.discard()?;
        if retry::consult(&mut controls) != KeepGoing::Yes {
            report.note_failure();
            return Err(Error::RetryExhausted { attempts });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Engine;
    use crate::memstore::{Cell, MemStore, Value};
    use crate::report::PubTrace;
    use crate::retry::rerun_n_times;

    fn mem_engine() -> (Engine, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        (Engine::new(store.clone()), store)
    }

    #[test]
    fn body_value_comes_back_on_success() {
        let (engine, _) = mem_engine();
        let _scope = engine.root().enter();
        let got = run_transaction(|| Ok(41 + 1), &[]).unwrap();
        assert_eq!(got, 42);
    }

    #[test]
    fn effects_land_in_the_parent() {
        let (engine, store) = mem_engine();
        let root = engine.root();
        let _scope = root.enter();
        let cell = Cell::new(&store);
        run_transaction(
            || {
                cell.set(&scope::current(), 7)?;
                Ok(())
            },
            &[],
        )
        .unwrap();
        assert_eq!(cell.get(&root).unwrap(), Some(Value::I64(7)));
    }

    #[test]
    fn body_error_discards_and_propagates() {
        let (engine, store) = mem_engine();
        let root = engine.root();
        let _scope = root.enter();
        let cell = Cell::new(&store);
        let mut trace = PubTrace::new("body-error");
        let err = run_reported::<(), _, _>(
            || {
                cell.set(&scope::current(), 1)?;
                Err(Error::store("flaky collaborator"))
            },
            &[rerun_n_times(5)],
            &mut trace,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        // No partial effects, no retries, one failure notification.
        assert_eq!(cell.get(&root).unwrap(), None);
        assert_eq!(trace.attempts(), 1);
        assert_eq!(trace.failures(), 1);
    }

    #[test]
    fn zero_budget_means_one_attempt() {
        let err = conflicting_run(&[rerun_n_times(0)]).unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 1 }));
    }

    #[test]
    fn budget_n_means_n_plus_one_attempts() {
        let err = conflicting_run(&[rerun_n_times(3)]).unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 4 }));
    }

    #[test]
    fn exhaustion_reports_failure_exactly_once() {
        let (engine, store) = mem_engine();
        let root = engine.root();
        let cell = Cell::new(&store);
        cell.set(&root, 0).unwrap();
        let _scope = root.enter();

        let mut trace = PubTrace::new("exhausted");
        let err = run_reported(
            || {
                let _ = cell.get(&scope::current())?;
                cell.set(&root, 1)
            },
            &[rerun_n_times(0)],
            &mut trace,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 1 }));
        assert_eq!(trace.attempts(), 1);
        assert_eq!(trace.failures(), 1);
        assert_eq!(trace.successes(), 0);
    }

    /// Run a transaction whose publish always conflicts: every attempt
    /// reads a cell that a rival rewrites before the publish.
    fn conflicting_run(options: &[Arc<dyn RetryPolicy>]) -> Result<()> {
        let (engine, store) = mem_engine();
        let root = engine.root();
        let cell = Cell::new(&store);
        cell.set(&root, 0).unwrap();
        let _scope = root.enter();
        let mut beat: i64 = 0;
        run_transaction(
            || {
                let ctx = scope::current();
                let _ = cell.get(&ctx)?;
                // A rival publishes between our read and our publish.
                beat += 1;
                cell.set(&root, 100 + beat)?;
                Ok(())
            },
            options,
        )
    }

    #[test]
    fn conflict_then_success_reports_once() {
        let store = Arc::new(MemStore::new());
        let engine = Engine::new(store.clone());
        let root = engine.root();
        let _scope = root.enter();
        let cell = Cell::new(&store);
        cell.set(&root, 0).unwrap();

        let mut trace = PubTrace::new("second-try");
        let mut first = true;
        run_reported(
            || {
                let ctx = scope::current();
                let _ = cell.get(&ctx)?;
                if first {
                    first = false;
                    // Rival write through the root beats this attempt.
                    cell.set(&root, 99)?;
                }
                cell.set(&ctx, 7)?;
                Ok(())
            },
            &[rerun_n_times(3)],
            &mut trace,
        )
        .unwrap();
        assert_eq!(trace.attempts(), 2);
        assert_eq!(trace.successes(), 1);
        assert_eq!(trace.failures(), 0);
        assert_eq!(cell.get(&root).unwrap(), Some(Value::I64(7)));
    }
}

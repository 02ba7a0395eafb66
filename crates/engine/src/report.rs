//! Merge-report observer for transaction lifecycles
//!
//! A [`MergeReport`] watches one transaction: `reset` fires before a
//! fresh retry sequence starts, `before_run` before each attempt, and
//! exactly one of `note_success`/`note_failure` at the end.

/// Observer hooks for a transaction's retry sequence
///
/// All hooks default to no-ops so implementors override only what they
/// care about.
pub trait MergeReport {
    /// A fresh retry sequence is about to start
    fn reset(&mut self) {}

    /// One attempt is about to run
    fn before_run(&mut self) {}

    /// The transaction published successfully
    fn note_success(&mut self) {}

    /// The transaction gave up (retries exhausted or body error)
    fn note_failure(&mut self) {}
}

/// Report that observes nothing
pub struct NoReport;

impl MergeReport for NoReport {}

/// Counting report that also logs transitions via `tracing`
///
/// Useful in tests and diagnostics: it records how many attempts a
/// transaction made and how it ended.
#[derive(Debug, Default)]
pub struct PubTrace {
    label: String,
    attempts: u32,
    successes: u32,
    failures: u32,
}

impl PubTrace {
    /// Create a trace labelled for log output
    pub fn new(label: impl Into<String>) -> Self {
        PubTrace {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Attempts observed since the last `reset`
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of `note_success` calls observed
    pub fn successes(&self) -> u32 {
        self.successes
    }

    /// Number of `note_failure` calls observed
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl MergeReport for PubTrace {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn before_run(&mut self) {
        self.attempts += 1;
        tracing::debug!(label = %self.label, attempt = self.attempts, "transaction attempt");
    }

    fn note_success(&mut self) {
        self.successes += 1;
        tracing::debug!(label = %self.label, attempts = self.attempts, "transaction succeeded");
    }

    fn note_failure(&mut self) {
        self.failures += 1;
        tracing::debug!(label = %self.label, attempts = self.attempts, "transaction failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_trace_counts_attempts() {
        let mut trace = PubTrace::new("t");
        trace.reset();
        trace.before_run();
        trace.before_run();
        trace.note_success();
        assert_eq!(trace.attempts(), 2);
        assert_eq!(trace.successes(), 1);
        assert_eq!(trace.failures(), 0);
    }

    #[test]
    fn reset_clears_attempts_only() {
        let mut trace = PubTrace::new("t");
        trace.before_run();
        trace.note_failure();
        trace.reset();
        assert_eq!(trace.attempts(), 0);
        assert_eq!(trace.failures(), 1);
    }
}

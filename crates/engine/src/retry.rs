//! Composable retry policies and the three-valued continuation signal
//!
//! A [`RetryPolicy`] is pure configuration and may be reused across
//! transactions; [`RetryPolicy::start`] mints the per-transaction cursor
//! ([`RetryControl`]) that is consulted after each failed publish. The
//! answers of simultaneously-supplied policies are folded with
//! [`KeepGoing::having_seen`]: a hard stop beats a forced continue, and a
//! forced continue beats the advisory "okay to stop".

use std::sync::Arc;

/// Three-valued continuation signal
///
/// The combining operator is associative and commutative with identity
/// [`KeepGoing::Okay`]; the retry loop continues only when the fold over
/// all controls is [`KeepGoing::Yes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepGoing {
    /// Hard stop; absorbs every other answer
    No,
    /// Advisory "no opinion / okay to stop"; the identity element
    Okay,
    /// Forced continue; overrides `Okay` but never `No`
    Yes,
}

impl KeepGoing {
    /// Fold step: combine this accumulated answer with one more control's
    pub fn having_seen(self, other: KeepGoing) -> KeepGoing {
        match (self, other) {
            (KeepGoing::No, _) | (_, KeepGoing::No) => KeepGoing::No,
            (KeepGoing::Yes, _) | (_, KeepGoing::Yes) => KeepGoing::Yes,
            (KeepGoing::Okay, KeepGoing::Okay) => KeepGoing::Okay,
        }
    }
}

/// Per-transaction retry cursor
///
/// Stateful: each call to [`RetryControl::try_again`] may consume budget
/// (for example a remaining-tries counter).
pub trait RetryControl: Send {
    /// Asked after a failed publish: should the transaction continue?
    fn try_again(&mut self) -> KeepGoing;
}

/// A retry strategy; a factory of [`RetryControl`]s
pub trait RetryPolicy: Send + Sync {
    /// Create the cursor for one transaction's retry loop
    fn start(&self) -> Box<dyn RetryControl>;
}

/// Retry up to `n` times, then stop hard
///
/// The control answers [`KeepGoing::Yes`] while its counter is positive
/// (decrementing it) and [`KeepGoing::No`] once exhausted, so a
/// transaction configured with `rerun_n_times(n)` makes at most `n + 1`
/// attempts.
pub fn rerun_n_times(n: u32) -> Arc<dyn RetryPolicy> {
    Arc::new(ReRunNTimes { tries: n })
}

struct ReRunNTimes {
    tries: u32,
}

impl RetryPolicy for ReRunNTimes {
    fn start(&self) -> Box<dyn RetryControl> {
        Box::new(ReRunControl {
            remaining: self.tries,
        })
    }
}

struct ReRunControl {
    remaining: u32,
}

impl RetryControl for ReRunControl {
    fn try_again(&mut self) -> KeepGoing {
        if self.remaining > 0 {
            self.remaining -= 1;
            KeepGoing::Yes
        } else {
            KeepGoing::No
        }
    }
}

/// Fold every control's answer; `Okay` when there are no controls
pub(crate) fn consult(controls: &mut [Box<dyn RetryControl>]) -> KeepGoing {
    controls
        .iter_mut()
        .map(|c| c.try_again())
        .fold(KeepGoing::Okay, KeepGoing::having_seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_keep_going() -> impl Strategy<Value = KeepGoing> {
        prop_oneof![
            Just(KeepGoing::No),
            Just(KeepGoing::Okay),
            Just(KeepGoing::Yes),
        ]
    }

    proptest! {
        #[test]
        fn having_seen_is_associative(
            a in any_keep_going(),
            b in any_keep_going(),
            c in any_keep_going(),
        ) {
            prop_assert_eq!(
                a.having_seen(b).having_seen(c),
                a.having_seen(b.having_seen(c))
            );
        }

        #[test]
        fn having_seen_is_commutative(a in any_keep_going(), b in any_keep_going()) {
            prop_assert_eq!(a.having_seen(b), b.having_seen(a));
        }

        #[test]
        fn okay_is_the_identity(a in any_keep_going()) {
            prop_assert_eq!(KeepGoing::Okay.having_seen(a), a);
            prop_assert_eq!(a.having_seen(KeepGoing::Okay), a);
        }

        #[test]
        fn no_absorbs_everything(a in any_keep_going()) {
            prop_assert_eq!(KeepGoing::No.having_seen(a), KeepGoing::No);
        }
    }

    #[test]
    fn forced_continue_overrides_advisory_stop() {
        assert_eq!(
            KeepGoing::Okay.having_seen(KeepGoing::Yes),
            KeepGoing::Yes
        );
    }

    #[test]
    fn forced_continue_never_overrides_hard_stop() {
        assert_eq!(KeepGoing::Yes.having_seen(KeepGoing::No), KeepGoing::No);
    }

    #[test]
    fn rerun_n_times_counts_down_then_stops() {
        let policy = rerun_n_times(2);
        let mut control = policy.start();
        assert_eq!(control.try_again(), KeepGoing::Yes);
        assert_eq!(control.try_again(), KeepGoing::Yes);
        assert_eq!(control.try_again(), KeepGoing::No);
        assert_eq!(control.try_again(), KeepGoing::No);
    }

    #[test]
    fn rerun_zero_stops_immediately() {
        let mut control = rerun_n_times(0).start();
        assert_eq!(control.try_again(), KeepGoing::No);
    }

    #[test]
    fn policies_are_reusable_across_transactions() {
        let policy = rerun_n_times(1);
        let mut first = policy.start();
        assert_eq!(first.try_again(), KeepGoing::Yes);
        assert_eq!(first.try_again(), KeepGoing::No);
        // A fresh control starts with a fresh budget.
        let mut second = policy.start();
        assert_eq!(second.try_again(), KeepGoing::Yes);
    }

    #[test]
    fn consult_with_no_controls_is_okay() {
        assert_eq!(consult(&mut []), KeepGoing::Okay);
    }

    #[test]
    fn consult_folds_in_order() {
        let mut controls: Vec<Box<dyn RetryControl>> =
            vec![rerun_n_times(1).start(), rerun_n_times(0).start()];
        // Yes from the first, No from the second: No wins.
        assert_eq!(consult(&mut controls), KeepGoing::No);
    }
}

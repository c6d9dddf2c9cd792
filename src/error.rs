//! Crate-wide error taxonomy.
//!
//! Every fallible public method returns [`DesResult<T>`]. The kernel never retries or
//! swallows an error internally: a failing call surfaces to the caller and the
//! simulation state is left exactly as it was after the triggering event was extracted
//! from its queue (see `Sandbox::run_once`).

use crate::time::Instant;
use thiserror::Error;

/// The error kinds a [`crate::Sandbox`] or [`crate::HourCounter`] can raise.
///
/// `BadScheduleArg`, `ArityMismatch`, `MissingPredicate` and `InvalidPredicate` name the
/// failure modes of the dynamically-typed original this kernel is modeled on. This
/// crate's typed `schedule`/`run`/`warmup`/`Action` surfaces make those particular
/// mistakes unrepresentable at the call site, so the variants stay part of the public
/// taxonomy (for parity with the spec this kernel implements, and so a future dynamic
/// entry point has somewhere to report into) without a construction site in this crate.
#[derive(Debug, Error)]
pub enum DesError {
    /// `schedule` was asked to run at a time or with an action shape it could not
    /// resolve.
    #[error("bad schedule argument: {reason}")]
    BadScheduleArg {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// An [`crate::Action`] was asked to add a callable whose residual arity does not
    /// match the arity it was declared with.
    #[error("arity mismatch: action declared {declared} argument(s), callable takes {actual}")]
    ArityMismatch {
        /// Arity the `Action` was declared with.
        declared: usize,
        /// Arity of the callable that was rejected.
        actual: usize,
    },

    /// An hour counter observed a count at a clock time earlier than its `last_time`.
    #[error("clock out of order: observation at {attempted} is before last observation at {last_time}")]
    ClockOutOfOrder {
        /// The time of the rejected observation.
        attempted: Instant,
        /// The hour counter's current `last_time`.
        last_time: Instant,
    },

    /// An explicit clock time was passed to an hour-counter method but did not match
    /// the owning sandbox's current clock.
    #[error("clock mismatch: {given} does not match sandbox clock {sandbox_clock}")]
    ClockMismatch {
        /// The clock time the caller supplied.
        given: Instant,
        /// The owning sandbox's actual clock time.
        sandbox_clock: Instant,
    },

    /// `run`/`warmup` was called without a predicate keyword.
    #[error("missing predicate: run/warmup requires exactly one predicate")]
    MissingPredicate,

    /// `run`/`warmup` was called with an unrecognized predicate keyword.
    #[error("invalid predicate: {keyword} is not a recognized predicate")]
    InvalidPredicate {
        /// The unrecognized keyword.
        keyword: String,
    },
}

/// Convenience alias used throughout this crate.
pub type DesResult<T> = Result<T, DesError>;

//! Simulated-time arithmetic shared by the sandbox tree and hour counters.
//!
//! The kernel represents the simulated clock as [`chrono::DateTime<chrono::Utc>`] and
//! durations as [`chrono::Duration`], so every downstream crate that already speaks
//! `chrono` can schedule against it without a conversion layer.

use chrono::{DateTime, Duration, Utc};

/// A simulated instant.
pub type Instant = DateTime<Utc>;

/// Convert a [`Duration`] to a fractional number of hours, the unit every
/// [`crate::HourCounter`] statistic is expressed in.
pub fn hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.0
}

//! An object-oriented discrete-event simulation kernel.
//!
//! A simulation is a tree of [`Sandbox`] nodes sharing one clock and one tree-wide
//! event queue. Each node schedules closures to run at a future simulated time, a
//! driver loop (`run_once`/`run_until`/...) repeatedly pops and invokes the
//! chronologically earliest one, and [`HourCounter`]s attached to any node accumulate
//! time-weighted statistics (rates, averages, percentiles, histograms) over whatever
//! integer-valued state that node's model updates as it runs.
//!
//! ```
//! use o2des::{Sandbox, ScheduleTime};
//! use chrono::Duration;
//!
//! let sandbox = Sandbox::new();
//! let hc = sandbox.main_hc();
//! let t0 = sandbox.clock_time();
//!
//! hc.observe_change(1, None).unwrap();
//! sandbox.schedule(
//!     || (),
//!     Some(ScheduleTime::At(t0 + Duration::hours(1))),
//!     Some("departure".to_string()),
//! );
//! sandbox.run_until(t0 + Duration::hours(2));
//! assert_eq!(hc.average_count(), 1.0);
//! ```

mod action;
mod error;
mod event;
mod hour_counter;
mod sandbox;
mod time;

pub use action::{Action, IntoSubactions};
pub use error::{DesError, DesResult};
pub use event::Event;
pub use hour_counter::{HistogramBucket, HourCounter, ReadOnlyHourCounter};
pub use sandbox::{
    PauseHandle, RunPredicate, Sandbox, SandboxConfig, ScheduleTime, WarmupPredicate,
};
pub use time::{hours, Instant};

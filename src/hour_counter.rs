//! Time-weighted statistics over an integer-valued state variable.
//!
//! An [`HourCounter`] is always owned by exactly one [`crate::Sandbox`] and reads that
//! sandbox's clock lazily (`update_to_clock_time`) rather than being driven directly by
//! the kernel loop.

use crate::error::{DesError, DesResult};
use crate::sandbox::{clock_time_from_weak, SandboxWeak};
use crate::time::{hours, Instant};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

struct HourCounterInner {
    sandbox: SandboxWeak,
    initial_time: Instant,
    last_time: Instant,
    last_count: i64,
    cum_value: f64,
    total_hours: f64,
    total_increment: i64,
    total_decrement: i64,
    paused: bool,
    hours_for_count: BTreeMap<i64, f64>,
    keep_history: bool,
    history: Option<BTreeMap<Instant, i64>>,
    read_only_cache: Option<Weak<RefCell<HourCounterInner>>>,
}

type HcHandle = Rc<RefCell<HourCounterInner>>;

/// A time-weighted integer counter: observe count changes and read back running
/// statistics (rates, averages, percentiles, a histogram) about the time spent at each
/// value.
pub struct HourCounter(HcHandle);

impl Clone for HourCounter {
    fn clone(&self) -> Self {
        HourCounter(self.0.clone())
    }
}

/// A histogram bucket produced by [`HourCounter::histogram`]: the time spent (and its
/// share of the total) at counts in `[lower_bound, lower_bound + width)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBucket {
    /// Inclusive lower bound of this bucket's count range.
    pub lower_bound: i64,
    /// Total hours observed at a count within this bucket.
    pub hours: f64,
    /// `hours` as a fraction of the total hours observed across every bucket.
    pub hour_ratio: f64,
    /// Running sum of `hour_ratio` up to and including this bucket.
    pub cumulative_hour_ratio: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl HourCounter {
    pub(crate) fn new(sandbox: SandboxWeak, keep_history: bool) -> Self {
        let initial_time = Instant::MIN_UTC;
        HourCounter(Rc::new(RefCell::new(HourCounterInner {
            sandbox,
            initial_time,
            last_time: initial_time,
            last_count: 0,
            cum_value: 0.0,
            total_hours: 0.0,
            total_increment: 0,
            total_decrement: 0,
            paused: false,
            hours_for_count: BTreeMap::new(),
            keep_history,
            history: keep_history.then(BTreeMap::new),
            read_only_cache: None,
        })))
    }

    fn sandbox_clock(&self) -> Instant {
        clock_time_from_weak(&self.0.borrow().sandbox)
    }

    fn check_clock_time(&self, clock_time: Option<Instant>) -> DesResult<()> {
        if let Some(given) = clock_time {
            let sandbox_clock = self.sandbox_clock();
            if given != sandbox_clock {
                return Err(DesError::ClockMismatch {
                    given,
                    sandbox_clock,
                });
            }
        }
        Ok(())
    }

    /// Clock time on last observation.
    pub fn last_time(&self) -> Instant {
        self.0.borrow().last_time
    }

    /// Count value on last observation.
    pub fn last_count(&self) -> i64 {
        self.0.borrow().last_count
    }

    /// Cumulative count value (integral of count over time, in hours).
    pub fn cum_value(&self) -> f64 {
        self.0.borrow().cum_value
    }

    /// Total working hours since the initial time (excludes paused spans).
    pub fn total_hours(&self) -> f64 {
        self.0.borrow().total_hours
    }

    /// Total amount by which the observed count has increased.
    pub fn total_increment(&self) -> i64 {
        self.0.borrow().total_increment
    }

    /// Total amount by which the observed count has decreased.
    pub fn total_decrement(&self) -> i64 {
        self.0.borrow().total_decrement
    }

    /// Whether the counter is currently paused.
    pub fn paused(&self) -> bool {
        self.0.borrow().paused
    }

    /// Whether history is being retained per-observation.
    pub fn keep_history(&self) -> bool {
        self.0.borrow().keep_history
    }

    /// Set the running count to `count` as of `clock_time` (the sandbox's current clock
    /// if omitted).
    ///
    /// Fails with [`DesError::ClockOutOfOrder`] if the resolved time is earlier than
    /// `last_time`, or [`DesError::ClockMismatch`] if an explicit `clock_time` disagrees
    /// with the owning sandbox's clock.
    pub fn observe_count(&self, count: i64, clock_time: Option<Instant>) -> DesResult<()> {
        self.check_clock_time(clock_time)?;
        let sandbox_clock = self.sandbox_clock();
        let mut inner = self.0.borrow_mut();
        if sandbox_clock < inner.last_time {
            return Err(DesError::ClockOutOfOrder {
                attempted: sandbox_clock,
                last_time: inner.last_time,
            });
        }
        if !inner.paused {
            let delta_hours = hours(sandbox_clock - inner.last_time);
            let last_count = inner.last_count;
            inner.total_hours += delta_hours;
            inner.cum_value += delta_hours * last_count as f64;
            if count > last_count {
                inner.total_increment += count - last_count;
            } else {
                inner.total_decrement += last_count - count;
            }
            *inner.hours_for_count.entry(last_count).or_insert(0.0) += delta_hours;
        }
        if inner.keep_history {
            inner
                .history
                .get_or_insert_with(BTreeMap::new)
                .insert(sandbox_clock, count);
        }
        inner.last_time = sandbox_clock;
        inner.last_count = count;
        Ok(())
    }

    /// Equivalent to `observe_count(last_count + change, clock_time)`.
    pub fn observe_change(&self, change: i64, clock_time: Option<Instant>) -> DesResult<()> {
        let last_count = self.0.borrow().last_count;
        self.observe_count(last_count + change, clock_time)
    }

    /// Pause time accrual. Idempotent. Flushes accrual up to `clock_time` first.
    pub fn pause(&self, clock_time: Option<Instant>) -> DesResult<()> {
        if self.0.borrow().paused {
            return Ok(());
        }
        self.check_clock_time(clock_time)?;
        let last_count = self.0.borrow().last_count;
        self.observe_count(last_count, clock_time)?;
        self.0.borrow_mut().paused = true;
        Ok(())
    }

    /// Resume time accrual. Idempotent.
    pub fn resume(&self, clock_time: Option<Instant>) -> DesResult<()> {
        if !self.0.borrow().paused {
            return Ok(());
        }
        self.check_clock_time(clock_time)?;
        let sandbox_clock = self.sandbox_clock();
        let mut inner = self.0.borrow_mut();
        inner.last_time = sandbox_clock;
        inner.paused = false;
        Ok(())
    }

    /// Reset all running statistics (but not `last_count`/`paused`) to the current
    /// clock time. Called automatically as part of `Sandbox::warmup*`.
    pub fn warmup(&self) {
        let sandbox_clock = self.sandbox_clock();
        let mut inner = self.0.borrow_mut();
        inner.initial_time = sandbox_clock;
        inner.last_time = sandbox_clock;
        inner.cum_value = 0.0;
        inner.total_hours = 0.0;
        inner.total_increment = 0;
        inner.total_decrement = 0;
        inner.hours_for_count.clear();
    }

    /// Flush accrual up to the sandbox's current clock time if it has moved since the
    /// last observation. Called lazily by every derived-statistic getter.
    pub fn update_to_clock_time(&self) {
        let sandbox_clock = self.sandbox_clock();
        if self.0.borrow().last_time != sandbox_clock {
            let last_count = self.0.borrow().last_count;
            self.observe_count(last_count, None)
                .expect("sandbox clock moved backward relative to an hour counter it owns");
        }
    }

    /// Average number of increments observed per hour.
    pub fn increment_rate(&self) -> f64 {
        self.update_to_clock_time();
        let inner = self.0.borrow();
        if inner.total_hours == 0.0 {
            0.0
        } else {
            inner.total_increment as f64 / inner.total_hours
        }
    }

    /// Average number of decrements observed per hour.
    pub fn decrement_rate(&self) -> f64 {
        self.update_to_clock_time();
        let inner = self.0.borrow();
        if inner.total_hours == 0.0 {
            0.0
        } else {
            inner.total_decrement as f64 / inner.total_hours
        }
    }

    /// Time-weighted average of the observed count.
    pub fn average_count(&self) -> f64 {
        self.update_to_clock_time();
        let inner = self.0.borrow();
        if inner.total_hours == 0.0 {
            0.0
        } else {
            inner.cum_value / inner.total_hours
        }
    }

    /// Average number of hours a unit of count stays before being decremented. Zero if
    /// no decrement has been observed yet.
    pub fn average_duration(&self) -> f64 {
        self.update_to_clock_time();
        let inner = self.0.borrow();
        if inner.total_decrement == 0 {
            0.0
        } else {
            inner.cum_value / inner.total_decrement as f64
        }
    }

    /// Fraction of the observation window during which the counter was not paused.
    pub fn working_time_ratio(&self) -> f64 {
        self.update_to_clock_time();
        let inner = self.0.borrow();
        if inner.last_time == inner.initial_time {
            return 0.0;
        }
        let window = hours(inner.last_time - inner.initial_time);
        if window == 0.0 {
            0.0
        } else {
            inner.total_hours / window
        }
    }

    /// The count `c*` such that cumulative hours at counts `<= c*` first reaches
    /// `ratio`% of total observed hours. Returns `f64::INFINITY` if no observation has
    /// ever been recorded.
    pub fn percentile(&self, ratio: f64) -> f64 {
        let inner = self.0.borrow();
        let total: f64 = inner.hours_for_count.values().sum();
        let mut threshold = total * ratio / 100.0;
        for (&count, &hrs) in inner.hours_for_count.iter() {
            threshold -= hrs;
            if threshold <= 0.0 {
                return count as f64;
            }
        }
        f64::INFINITY
    }

    /// Bucket the time spent at each observed count into half-open `[k*width,
    /// (k+1)*width)` intervals. A count exactly on a positive bucket boundary falls
    /// into the lower bucket. Buckets are returned in ascending lower-bound order.
    pub fn histogram(&self, width: i64) -> Vec<HistogramBucket> {
        let inner = self.0.borrow();
        if inner.hours_for_count.is_empty() {
            return Vec::new();
        }
        let mut lb_to_hours: BTreeMap<i64, f64> = BTreeMap::new();
        for (&count, &hrs) in inner.hours_for_count.iter() {
            let mut lower_bound = count.div_euclid(width) * width;
            if lower_bound > 0 && lower_bound == count {
                lower_bound -= width;
            }
            *lb_to_hours.entry(lower_bound).or_insert(0.0) += hrs;
        }
        let total: f64 = lb_to_hours.values().sum();
        let mut cumulative = 0.0;
        lb_to_hours
            .into_iter()
            .map(|(lower_bound, hrs)| {
                cumulative += hrs;
                let hour_ratio = if total == 0.0 { 0.0 } else { hrs / total };
                let cumulative_hour_ratio = if total == 0.0 { 0.0 } else { cumulative / total };
                HistogramBucket {
                    lower_bound,
                    hours: round2(hrs),
                    hour_ratio: round2(hour_ratio),
                    cumulative_hour_ratio: round2(cumulative_hour_ratio),
                }
            })
            .collect()
    }

    /// Scatter points of `(clock time, count)` recorded at each observation, oldest
    /// first. `None` if history was not enabled via `Sandbox::add_hour_counter`.
    pub fn history(&self) -> Option<Vec<(Instant, i64)>> {
        self.0
            .borrow()
            .history
            .as_ref()
            .map(|h| h.iter().map(|(&t, &c)| (t, c)).collect())
    }

    /// A read-only view over this counter's statistics. Repeat calls return a view over
    /// the same underlying counter rather than constructing a new one each time.
    pub fn as_read_only(&self) -> ReadOnlyHourCounter {
        if let Some(cached) = self.0.borrow().read_only_cache.as_ref().and_then(Weak::upgrade) {
            return ReadOnlyHourCounter(cached);
        }
        self.0.borrow_mut().read_only_cache = Some(Rc::downgrade(&self.0));
        ReadOnlyHourCounter(self.0.clone())
    }
}

/// A read-only view over an [`HourCounter`]'s statistics, returned by
/// [`HourCounter::as_read_only`]. Carries no method capable of mutating the counter.
pub struct ReadOnlyHourCounter(HcHandle);

impl Clone for ReadOnlyHourCounter {
    fn clone(&self) -> Self {
        ReadOnlyHourCounter(self.0.clone())
    }
}

macro_rules! delegate_getter {
    ($name:ident, $ret:ty) => {
        pub fn $name(&self) -> $ret {
            HourCounter(self.0.clone()).$name()
        }
    };
}

impl ReadOnlyHourCounter {
    delegate_getter!(last_time, Instant);
    delegate_getter!(last_count, i64);
    delegate_getter!(cum_value, f64);
    delegate_getter!(total_hours, f64);
    delegate_getter!(total_increment, i64);
    delegate_getter!(total_decrement, i64);
    delegate_getter!(increment_rate, f64);
    delegate_getter!(decrement_rate, f64);
    delegate_getter!(average_count, f64);
    delegate_getter!(average_duration, f64);
    delegate_getter!(working_time_ratio, f64);
    delegate_getter!(paused, bool);

    /// See [`HourCounter::percentile`].
    pub fn percentile(&self, ratio: f64) -> f64 {
        HourCounter(self.0.clone()).percentile(ratio)
    }

    /// See [`HourCounter::histogram`].
    pub fn histogram(&self, width: i64) -> Vec<HistogramBucket> {
        HourCounter(self.0.clone()).histogram(width)
    }

    /// See [`HourCounter::history`].
    pub fn history(&self) -> Option<Vec<(Instant, i64)>> {
        HourCounter(self.0.clone()).history()
    }
}

//! The node type of the simulation tree: an event queue, a clock, a set of hour
//! counters, and (for the root) the driver loop itself.

use crate::action::Action;
use crate::error::{DesError, DesResult};
use crate::event::Event;
use crate::hour_counter::HourCounter;
use crate::time::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant as WallInstant;

static SANDBOX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Strong handle to a sandbox node; shared between its parent's `children` list and
/// every [`Sandbox`] wrapper returned to callers.
pub(crate) type SandboxHandle = Rc<RefCell<SandboxInner>>;
/// Weak back-reference, held by children (to their parent) and by [`crate::Event`]s and
/// [`HourCounter`]s (to their owner), to avoid reference cycles.
pub(crate) type SandboxWeak = Weak<RefCell<SandboxInner>>;

/// Construction-time knobs for a [`Sandbox`], mirroring the fields a fresh sandbox is
/// seeded with.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Human-readable label, used in `code()` and log output. Defaults to
    /// `Sandbox#<index>` if omitted.
    pub code: Option<String>,
    /// Seed for this sandbox's private RNG.
    pub seed: u64,
    /// Whether this sandbox should keep a log of every event it has ever run
    /// (`debug_mode`).
    pub debug_mode: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            code: None,
            seed: 0,
            debug_mode: false,
        }
    }
}

pub(crate) struct SandboxInner {
    index: u64,
    code: Option<String>,
    parent: Option<SandboxWeak>,
    children: Vec<Sandbox>,
    hour_counters: Vec<HourCounter>,
    main_hc: Option<HourCounter>,
    on_warmup: Action<()>,
    future_event_list: BinaryHeap<Event>,
    clock_time: Instant,
    event_count: u64,
    event_index: Arc<AtomicU64>,
    is_first_event_scheduled: bool,
    first_event_clock_time: Option<Instant>,
    seed: u64,
    rng: StdRng,
    debug_mode: bool,
    pause_gate: Option<Arc<PauseGate>>,
    real_time_for_last_run: Option<WallInstant>,
}

/// A node in the simulation tree.
///
/// Cloning a `Sandbox` is cheap and shares state (it clones the underlying
/// [`Rc`]); every clone refers to the same node.
pub struct Sandbox(pub(crate) SandboxHandle);

impl Clone for Sandbox {
    fn clone(&self) -> Self {
        Sandbox(self.0.clone())
    }
}

struct PauseGate {
    waiting: Mutex<bool>,
    condvar: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            waiting: Mutex::new(true),
            condvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut guard = self.waiting.lock().expect("pause gate mutex poisoned");
        while *guard {
            guard = self
                .condvar
                .wait(guard)
                .expect("pause gate mutex poisoned");
        }
    }

    fn release(&self) {
        let mut guard = self.waiting.lock().expect("pause gate mutex poisoned");
        *guard = false;
        self.condvar.notify_all();
    }
}

/// A `Send`-able capability to resume a paused sandbox from another OS thread.
///
/// A [`Sandbox`] itself is built on `Rc`/`RefCell` and cannot cross threads. Obtain a
/// handle with [`Sandbox::pause_handle`] *before* calling [`Sandbox::pause`] on the
/// driving thread, move the handle to whichever thread should be able to release it,
/// and call [`PauseHandle::resume`] there.
#[derive(Clone)]
pub struct PauseHandle(Arc<PauseGate>);

impl PauseHandle {
    /// Release the paused driver loop. Returns `false` if it had already resumed.
    pub fn resume(&self) -> bool {
        self.0.release();
        true
    }
}

/// How a future event's clock time is resolved, relative to the scheduling sandbox's
/// current clock.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleTime {
    /// `now + delay`.
    After(chrono::Duration),
    /// An absolute instant, which must not be earlier than `now`.
    At(Instant),
}

/// The stopping condition for [`Sandbox::run`].
#[derive(Debug, Clone, Copy)]
pub enum RunPredicate {
    /// Run exactly one event.
    Once,
    /// Run until the clock would pass `Instant`.
    Terminate(Instant),
    /// Run until the clock has advanced by `Duration` from its value at call time.
    Duration(chrono::Duration),
    /// Run exactly `u64` events.
    EventCount(u64),
    /// Advance the clock by wall-clock elapsed time scaled by this factor, relative to
    /// the previous `run_at_speed` call (a no-op advance on the first call).
    Speed(f64),
}

/// The stopping condition for [`Sandbox::warmup`].
#[derive(Debug, Clone, Copy)]
pub enum WarmupPredicate {
    /// Warm up until the clock would pass this instant.
    Till(Instant),
    /// Warm up for this much simulated duration from now.
    Period(chrono::Duration),
}

pub(crate) fn clock_time_of(handle: &SandboxHandle) -> Instant {
    let mut current = handle.clone();
    loop {
        let parent = current.borrow().parent.clone();
        match parent.and_then(|weak| weak.upgrade()) {
            Some(next) => current = next,
            None => return current.borrow().clock_time,
        }
    }
}

pub(crate) fn clock_time_from_weak(weak: &SandboxWeak) -> Instant {
    let handle = weak
        .upgrade()
        .expect("hour counter outlived the sandbox that owns it");
    clock_time_of(&handle)
}

impl Sandbox {
    /// Construct a root sandbox with default configuration.
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default())
    }

    /// Construct a root sandbox with the given configuration.
    pub fn with_config(config: SandboxConfig) -> Self {
        let index = SANDBOX_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        let handle = Rc::new(RefCell::new(SandboxInner {
            index,
            code: config.code,
            parent: None,
            children: Vec::new(),
            hour_counters: Vec::new(),
            main_hc: None,
            on_warmup: Action::new(),
            future_event_list: BinaryHeap::new(),
            clock_time: Instant::MIN_UTC,
            event_count: 0,
            event_index: Arc::new(AtomicU64::new(0)),
            is_first_event_scheduled: false,
            first_event_clock_time: None,
            seed: config.seed,
            rng: StdRng::seed_from_u64(config.seed),
            debug_mode: config.debug_mode,
            pause_gate: None,
            real_time_for_last_run: None,
        }));
        let sandbox = Sandbox(handle);
        let main_hc = HourCounter::new(sandbox.downgrade(), false);
        sandbox.0.borrow_mut().main_hc = Some(main_hc.clone());
        sandbox.splice_hc_warmup(&main_hc);
        sandbox
    }

    pub(crate) fn downgrade(&self) -> SandboxWeak {
        Rc::downgrade(&self.0)
    }

    /// Splice `hc.warmup()` into this sandbox's own `on_warmup` bus, so that invoking
    /// `on_warmup` (directly, or via a parent's spliced-in copy) resets `hc` too.
    fn splice_hc_warmup(&self, hc: &HourCounter) {
        let hc = hc.clone();
        self.0.borrow_mut().on_warmup.add(move |()| hc.warmup());
    }

    /// Create a child sandbox under `self`, registering it and splicing its whole
    /// `on_warmup` bus into `self`'s, so warming up `self` warms up the child too.
    pub fn add_child(&self, config: SandboxConfig) -> Sandbox {
        let index = SANDBOX_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        let event_index = self.0.borrow().event_index.clone();
        let seed = config.seed;
        let handle = Rc::new(RefCell::new(SandboxInner {
            index,
            code: config.code,
            parent: Some(self.downgrade()),
            children: Vec::new(),
            hour_counters: Vec::new(),
            main_hc: None,
            on_warmup: Action::new(),
            future_event_list: BinaryHeap::new(),
            clock_time: Instant::MIN_UTC,
            event_count: 0,
            event_index,
            is_first_event_scheduled: false,
            first_event_clock_time: None,
            seed,
            rng: StdRng::seed_from_u64(seed),
            debug_mode: config.debug_mode,
            pause_gate: None,
            real_time_for_last_run: None,
        }));
        let child = Sandbox(handle);
        let main_hc = HourCounter::new(child.downgrade(), false);
        child.0.borrow_mut().main_hc = Some(main_hc.clone());
        child.splice_hc_warmup(&main_hc);
        self.0.borrow_mut().children.push(child.clone());
        self.0.borrow_mut().on_warmup.add(child.on_warmup());
        child
    }

    /// Register a new hour counter owned by this sandbox, splicing its warmup into this
    /// sandbox's `on_warmup` bus so it resets along with every other counter here.
    pub fn add_hour_counter(&self, keep_history: bool) -> HourCounter {
        let hc = HourCounter::new(self.downgrade(), keep_history);
        self.0.borrow_mut().hour_counters.push(hc.clone());
        self.splice_hc_warmup(&hc);
        hc
    }

    /// This sandbox's always-present, unlabeled hour counter.
    pub fn main_hc(&self) -> HourCounter {
        self.0
            .borrow()
            .main_hc
            .clone()
            .expect("main hour counter is created in Sandbox::new/add_child")
    }

    /// Every hour counter this sandbox owns, `main_hc` excluded.
    pub fn hour_counters(&self) -> Vec<HourCounter> {
        self.0.borrow().hour_counters.clone()
    }

    /// Direct children of this sandbox.
    pub fn children(&self) -> Vec<Sandbox> {
        self.0.borrow().children.clone()
    }

    /// Walk up to the root of the tree. Returns `self` if it has no parent.
    pub fn root(&self) -> Sandbox {
        let mut current = self.0.clone();
        loop {
            let parent = current.borrow().parent.clone();
            match parent.and_then(|weak| weak.upgrade()) {
                Some(next) => current = next,
                None => return Sandbox(current),
            }
        }
    }

    /// The simulated clock time, resolved from the root of the tree: every sandbox in a
    /// tree shares one clock.
    pub fn clock_time(&self) -> Instant {
        clock_time_of(&self.0)
    }

    /// Kernel-assigned identifier, unique within the process.
    pub fn index(&self) -> u64 {
        self.0.borrow().index
    }

    /// Human-readable label: the one supplied at construction, or `Sandbox#<index>`.
    pub fn code(&self) -> String {
        let inner = self.0.borrow();
        inner
            .code
            .clone()
            .unwrap_or_else(|| format!("Sandbox#{}", inner.index))
    }

    /// Count of events owned by this sandbox (i.e. scheduled on it, not a descendant)
    /// that have been invoked.
    pub fn event_count(&self) -> u64 {
        self.0.borrow().event_count
    }

    /// This sandbox's RNG seed.
    pub fn seed(&self) -> u64 {
        self.0.borrow().seed
    }

    /// Replace this sandbox's RNG with a fresh one seeded from `seed`.
    pub fn reseed(&self, seed: u64) {
        let mut inner = self.0.borrow_mut();
        inner.seed = seed;
        inner.rng = StdRng::seed_from_u64(seed);
    }

    /// Run `f` with mutable access to this sandbox's private RNG.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.0.borrow_mut().rng)
    }

    /// Whether this sandbox logs every event it runs at `trace` level.
    pub fn debug_mode(&self) -> bool {
        self.0.borrow().debug_mode
    }

    /// Toggle per-event trace logging for this sandbox.
    pub fn set_debug_mode(&self, value: bool) {
        self.0.borrow_mut().debug_mode = value;
    }

    /// Whether any sandbox in this tree has ever scheduled an event.
    pub fn is_first_event_scheduled(&self) -> bool {
        self.root().0.borrow().is_first_event_scheduled
    }

    /// The clock time of the very first event ever scheduled anywhere in this tree.
    pub fn first_event_clock_time(&self) -> Option<Instant> {
        self.root().0.borrow().first_event_clock_time
    }

    /// The action bus that resets every hour counter owned anywhere in this sandbox's
    /// subtree: `add_hour_counter` (and the always-present `main_hc`) splice `hc.warmup`
    /// into this bus directly, and `add_child` splices the whole child `on_warmup` into
    /// the parent's, so invoking the root's `on_warmup` warms up the entire tree.
    pub fn on_warmup(&self) -> Action<()> {
        self.0.borrow().on_warmup.clone()
    }

    /// Schedule `action` to run at a time resolved from `when` (`self`'s current clock
    /// if omitted), tagging it with `tag` for logging/ordering diagnostics.
    ///
    /// Returns the resolved scheduled time.
    pub fn schedule<F>(&self, action: F, when: Option<ScheduleTime>, tag: Option<String>) -> Instant
    where
        F: FnOnce() + 'static,
    {
        let now = self.clock_time();
        let scheduled_time = match when {
            None => now,
            Some(ScheduleTime::After(delay)) => now + delay,
            Some(ScheduleTime::At(at)) => at,
        };
        let root = self.root();
        {
            let mut root_inner = root.0.borrow_mut();
            if !root_inner.is_first_event_scheduled {
                root_inner.is_first_event_scheduled = true;
                root_inner.first_event_clock_time = Some(now);
            }
        }
        let index = self
            .0
            .borrow()
            .event_index
            .fetch_add(1, AtomicOrdering::Relaxed);
        let event = Event::new(index, scheduled_time, self.downgrade(), tag, Box::new(action));
        tracing::debug!(
            sandbox = %self.code(),
            time = %scheduled_time,
            "event scheduled"
        );
        self.0.borrow_mut().future_event_list.push(event);
        scheduled_time
    }

    /// The earliest scheduled time across this sandbox's own queue and every
    /// descendant's, or `None` if the whole subtree has no pending events.
    pub fn head_event_time(&self) -> Option<Instant> {
        self.peek_key().map(|(time, _)| time)
    }

    fn peek_key(&self) -> Option<(Instant, u64)> {
        let inner = self.0.borrow();
        let mut best = inner.future_event_list.peek().map(Event::sort_key);
        for child in &inner.children {
            if let Some(child_key) = child.peek_key() {
                best = Some(match best {
                    Some(current) if current <= child_key => current,
                    _ => child_key,
                });
            }
        }
        best
    }

    /// Remove and return the chronologically earliest event across this sandbox's own
    /// queue and every descendant's, breaking ties by insertion order.
    fn extract_head(&self) -> Option<Event> {
        let inner = self.0.borrow();
        let own_key = inner.future_event_list.peek().map(Event::sort_key);
        let children = inner.children.clone();
        drop(inner);

        let mut best: Option<(usize, (Instant, u64))> = None;
        for (i, child) in children.iter().enumerate() {
            if let Some(key) = child.peek_key() {
                if best.as_ref().map_or(true, |(_, b)| key < *b) {
                    best = Some((i, key));
                }
            }
        }

        if own_key.is_none() && best.is_none() {
            return None;
        }

        let own_is_best = match (&own_key, &best) {
            (Some(_), None) => true,
            (Some(own), Some((_, child_key))) => own <= child_key,
            (None, Some(_)) => false,
            (None, None) => unreachable!("handled by the early return above"),
        };

        if own_is_best {
            self.0.borrow_mut().future_event_list.pop()
        } else {
            let (child_idx, _) = best.expect("own_is_best is false only when a child key exists");
            children[child_idx].extract_head()
        }
    }

    /// Run exactly one event, the chronologically earliest across the whole tree.
    /// Returns `false` if no event remains anywhere in the tree.
    pub fn run_once(&self) -> bool {
        let root = self.root();
        let event = match root.extract_head() {
            Some(event) => event,
            None => {
                tracing::warn!("run_once called with an empty queue");
                return false;
            }
        };
        let scheduled_time = event.scheduled_time();
        if let Some(owner_handle) = event.owner().upgrade() {
            owner_handle.borrow_mut().event_count += 1;
        }
        let owner_debug = event
            .owner()
            .upgrade()
            .map(|h| Sandbox(h).debug_mode())
            .unwrap_or(false);
        root.0.borrow_mut().clock_time = scheduled_time;
        if owner_debug {
            tracing::trace!(event = %event, time = %scheduled_time, "dispatching event");
        }
        event.invoke();
        true
    }

    /// Run events until the clock would pass `terminate`. Returns `false` if the queue
    /// emptied before reaching it, `true` if `terminate` was reached exactly.
    pub fn run_until(&self, terminate: Instant) -> bool {
        let root = self.root();
        loop {
            match root.head_event_time() {
                None => {
                    root.0.borrow_mut().clock_time = terminate;
                    return false;
                }
                Some(next) if next > terminate => {
                    root.0.borrow_mut().clock_time = terminate;
                    return true;
                }
                Some(_) => {
                    root.run_once();
                }
            }
        }
    }

    /// Run events for `period` of simulated time from the current clock.
    pub fn run_for_period(&self, period: chrono::Duration) -> bool {
        self.run_until(self.clock_time() + period)
    }

    /// Run exactly `count` events.
    pub fn run_multiple_times(&self, mut count: u64) -> bool {
        while count > 0 {
            if !self.run_once() {
                return false;
            }
            count -= 1;
        }
        true
    }

    /// Advance the clock by the wall-clock time elapsed since the previous
    /// `run_at_speed` call, scaled by `speed`. A no-op (returns `true`, advances
    /// nothing) on the first call for a given sandbox tree.
    pub fn run_at_speed(&self, speed: f64) -> bool {
        let root = self.root();
        let now = WallInstant::now();
        let previous = root.0.borrow().real_time_for_last_run;
        let result = match previous {
            Some(prev) => {
                let elapsed_secs = now.duration_since(prev).as_secs_f64();
                let scaled_ms = (elapsed_secs * speed * 1000.0).round() as i64;
                root.run_until(root.clock_time() + chrono::Duration::milliseconds(scaled_ms))
            }
            None => true,
        };
        root.0.borrow_mut().real_time_for_last_run = Some(now);
        result
    }

    /// Dispatch on a [`RunPredicate`].
    pub fn run(&self, predicate: RunPredicate) -> bool {
        match predicate {
            RunPredicate::Once => self.run_once(),
            RunPredicate::Terminate(at) => self.run_until(at),
            RunPredicate::Duration(duration) => self.run_for_period(duration),
            RunPredicate::EventCount(count) => self.run_multiple_times(count),
            RunPredicate::Speed(speed) => self.run_at_speed(speed),
        }
    }

    /// Run until the clock would pass `till`, then fire every hour counter's and the
    /// tree's `on_warmup` handlers (resetting accumulated statistics).
    pub fn warmup_until(&self, till: Instant) -> bool {
        let root = self.root();
        let result = root.run_until(till);
        let action = root.0.borrow().on_warmup.clone();
        action.invoke(());
        tracing::info!(till = %till, "warmup complete");
        result
    }

    /// Warm up for `period` of simulated time from the current clock.
    pub fn warmup_for_period(&self, period: chrono::Duration) -> bool {
        let till = self.clock_time() + period;
        self.warmup_until(till)
    }

    /// Dispatch on a [`WarmupPredicate`].
    pub fn warmup(&self, predicate: WarmupPredicate) -> bool {
        match predicate {
            WarmupPredicate::Till(till) => self.warmup_until(till),
            WarmupPredicate::Period(period) => self.warmup_for_period(period),
        }
    }

    /// Obtain a `Send`-able handle capable of releasing a subsequent [`Sandbox::pause`]
    /// call from another thread. Lazily creates the underlying gate if none exists yet.
    pub fn pause_handle(&self) -> PauseHandle {
        let root = self.root();
        let mut inner = root.0.borrow_mut();
        let gate = inner
            .pause_gate
            .get_or_insert_with(|| Arc::new(PauseGate::new()))
            .clone();
        PauseHandle(gate)
    }

    /// Block the calling thread until released by [`PauseHandle::resume`] or
    /// [`Sandbox::resume`].
    pub fn pause(&self) -> bool {
        let handle = self.pause_handle();
        tracing::info!("sandbox paused");
        handle.0.wait();
        self.root().0.borrow_mut().pause_gate = None;
        true
    }

    /// Release a pending [`Sandbox::pause`] call. Returns `false` if nothing was
    /// paused.
    pub fn resume(&self) -> bool {
        let root = self.root();
        let gate = root.0.borrow_mut().pause_gate.take();
        match gate {
            Some(gate) => {
                gate.release();
                tracing::info!("sandbox resumed");
                true
            }
            None => false,
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Sandbox {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    fn t0() -> Instant {
        Instant::MIN_UTC + Duration::days(365 * 50)
    }

    #[test]
    fn events_dispatch_in_scheduled_order_across_ties() {
        let sandbox = Sandbox::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));

        let l = log.clone();
        sandbox.schedule(move || l.borrow_mut().push("b"), Some(ScheduleTime::At(t0())), None);
        let l = log.clone();
        sandbox.schedule(move || l.borrow_mut().push("a"), Some(ScheduleTime::At(t0())), None);
        let l = log.clone();
        sandbox.schedule(
            move || l.borrow_mut().push("c"),
            Some(ScheduleTime::At(t0() + Duration::hours(1))),
            None,
        );

        sandbox.run_until(t0() + Duration::hours(2));
        assert_eq!(*log.borrow(), vec!["b", "a", "c"]);
    }

    #[test]
    fn nested_children_feed_a_single_tree_wide_queue() {
        let root = Sandbox::new();
        let child = root.add_child(SandboxConfig::default());
        let log = StdRc::new(StdRefCell::new(Vec::new()));

        let l = log.clone();
        root.schedule(move || l.borrow_mut().push("root"), Some(ScheduleTime::At(t0() + Duration::hours(2))), None);
        let l = log.clone();
        child.schedule(move || l.borrow_mut().push("child"), Some(ScheduleTime::At(t0() + Duration::hours(1))), None);

        root.run_until(t0() + Duration::hours(3));
        assert_eq!(*log.borrow(), vec!["child", "root"]);
        assert_eq!(child.event_count(), 1);
        assert_eq!(root.event_count(), 1);
    }

    #[test]
    fn run_until_reports_whether_terminate_was_reached() {
        let sandbox = Sandbox::new();
        sandbox.schedule(|| (), Some(ScheduleTime::At(t0())), None);
        sandbox.schedule(|| (), Some(ScheduleTime::At(t0() + Duration::hours(5))), None);
        // the first event fires; the second is still pending beyond the terminate instant
        assert!(sandbox.run_until(t0() + Duration::hours(1)));
        // the second event fires and the queue empties before this terminate instant
        assert!(!sandbox.run_until(t0() + Duration::hours(6)));
    }

    #[test]
    fn run_multiple_times_stops_early_on_empty_queue() {
        let sandbox = Sandbox::new();
        sandbox.schedule(|| (), Some(ScheduleTime::At(t0())), None);
        assert!(!sandbox.run_multiple_times(3));
    }

    #[test]
    fn child_schedule_delegates_clock_to_root() {
        let root = Sandbox::new();
        let child = root.add_child(SandboxConfig::default());
        root.run_until(t0());
        assert_eq!(child.clock_time(), root.clock_time());
    }

    #[test]
    fn first_event_clock_time_is_set_once_tree_wide() {
        let root = Sandbox::new();
        let child = root.add_child(SandboxConfig::default());
        assert!(!root.is_first_event_scheduled());
        child.schedule(|| (), Some(ScheduleTime::At(t0())), None);
        assert!(root.is_first_event_scheduled());
        assert_eq!(root.first_event_clock_time(), Some(Instant::MIN_UTC));
        root.schedule(|| (), Some(ScheduleTime::At(t0() + Duration::hours(1))), None);
        assert_eq!(root.first_event_clock_time(), Some(Instant::MIN_UTC));
    }

    #[test]
    fn warmup_resets_main_hc_but_preserves_its_last_count() {
        let sandbox = Sandbox::new();
        sandbox.main_hc().observe_change(4, None).unwrap();
        sandbox.run_until(t0());
        sandbox.warmup_until(t0());
        assert_eq!(sandbox.main_hc().total_hours(), 0.0);
        assert_eq!(sandbox.main_hc().last_count(), 4);
    }

    #[test]
    fn on_warmup_invoked_directly_resets_this_sandboxs_own_counters() {
        let sandbox = Sandbox::new();
        sandbox.main_hc().observe_change(3, None).unwrap();
        let hc = sandbox.add_hour_counter(false);
        hc.observe_change(7, None).unwrap();
        sandbox.run_until(t0() + Duration::hours(2));
        sandbox.on_warmup().invoke(());
        assert_eq!(sandbox.main_hc().total_hours(), 0.0);
        assert_eq!(hc.total_hours(), 0.0);
    }

    #[test]
    fn warmup_propagates_to_child_hour_counters() {
        let root = Sandbox::new();
        let child = root.add_child(SandboxConfig::default());
        let hc = child.add_hour_counter(false);
        hc.observe_change(2, None).unwrap();
        root.run_until(t0() + Duration::hours(3));
        root.warmup_until(t0() + Duration::hours(3));
        assert_eq!(hc.total_hours(), 0.0);
    }

    #[test]
    fn pause_blocks_until_resumed_from_another_thread() {
        let sandbox = Sandbox::new();
        let handle = sandbox.pause_handle();
        let released = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            handle.resume();
        });
        assert!(sandbox.pause());
        released.join().unwrap();
    }

    #[test]
    fn resume_without_a_pending_pause_is_a_noop() {
        let sandbox = Sandbox::new();
        assert!(!sandbox.resume());
    }

    #[test]
    fn run_at_speed_is_a_noop_on_first_call() {
        let sandbox = Sandbox::new();
        let before = sandbox.clock_time();
        assert!(sandbox.run_at_speed(10.0));
        assert_eq!(sandbox.clock_time(), before);
    }

    #[test]
    fn reseed_changes_subsequent_rng_draws() {
        let sandbox = Sandbox::new();
        sandbox.reseed(42);
        assert_eq!(sandbox.seed(), 42);
        let first: f64 = sandbox.with_rng(|rng| rand::Rng::gen(rng));
        sandbox.reseed(42);
        let second: f64 = sandbox.with_rng(|rng| rand::Rng::gen(rng));
        assert_eq!(first, second);
    }
}

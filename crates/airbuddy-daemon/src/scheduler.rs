//! Background scheduler.
//!
//! One long-lived task that takes a scheduled reading every interval. The
//! warmup before each read is sliced so that a pause lands within one slice
//! and the foreground never waits behind a background warmup.
//!
//! Two things suspend the loop: an operator pause ([`Scheduler::pause`])
//! and foreground holds ([`Scheduler::hold`]). They are tracked apart, so
//! releasing a hold never lifts an operator pause and vice versa.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SamplingEngine;
use crate::reading::Provenance;

/// Scheduler cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Time between cycle starts
    pub interval: Duration,
    /// Sensor warmup before each scheduled read
    pub warmup: Duration,
    /// Warmup slice; bounds pause latency
    pub slice: Duration,
    /// Recheck period while paused
    pub idle_poll: Duration,
    /// Delay before retrying an abandoned cycle
    pub retry_after_abandon: Duration,
    /// Bounded wait for the loop to exit on stop
    pub stop_timeout: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            warmup: Duration::from_secs(30),
            slice: Duration::from_millis(200),
            idle_poll: Duration::from_millis(100),
            retry_after_abandon: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Flags and counters shared between the scheduler handle and its task.
#[derive(Debug, Default)]
struct RunState {
    running: AtomicBool,
    paused: AtomicBool,
    holds: AtomicUsize,
    completed: AtomicU64,
    abandoned: AtomicU64,
    failed: AtomicU64,
}

impl RunState {
    fn suspended(&self) -> bool {
        self.paused.load(Ordering::SeqCst) || self.holds.load(Ordering::SeqCst) > 0
    }
}

/// Keeps the scheduler suspended until dropped.
///
/// Released on drop, so a cancelled or failed foreground cycle still lets
/// the background loop continue.
pub struct SchedulerHold {
    state: Arc<RunState>,
}

impl Drop for SchedulerHold {
    fn drop(&mut self) {
        if self.state.holds.fetch_sub(1, Ordering::SeqCst) == 1 {
            debug!("Scheduler hold released");
        }
    }
}

/// Snapshot of the scheduler for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    /// Paused by the operator
    pub paused: bool,
    /// Held by the foreground
    pub held: bool,
    pub interval_secs: u64,
    pub warmup_secs: u64,
    pub cycles_completed: u64,
    pub cycles_abandoned: u64,
    pub cycles_failed: u64,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the background scheduling task.
pub struct Scheduler {
    engine: Arc<SamplingEngine>,
    state: Arc<RunState>,
    timing: Mutex<SchedulerTiming>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    /// Creates a stopped scheduler.
    pub fn new(engine: Arc<SamplingEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(RunState::default()),
            timing: Mutex::new(SchedulerTiming::default()),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the loop. Returns false (and changes nothing) if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, timing: SchedulerTiming) -> bool {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            debug!("Scheduler already running");
            return false;
        }

        *self.timing.lock().unwrap() = timing;
        self.state.running.store(true, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.engine.clone(),
            self.state.clone(),
            timing,
            cancel.clone(),
        ));
        *worker = Some(Worker { cancel, handle });

        info!(
            "Scheduler started (interval {:?}, warmup {:?})",
            timing.interval, timing.warmup
        );
        true
    }

    /// Requests a pause. Takes effect at the next slice boundary; a read
    /// already in flight completes.
    pub fn pause(&self) {
        if !self.state.paused.swap(true, Ordering::SeqCst) {
            info!("Scheduler paused");
        }
    }

    /// Clears the pause flag. Foreground holds stay in force.
    pub fn resume(&self) {
        if self.state.paused.swap(false, Ordering::SeqCst) {
            info!("Scheduler resumed");
        }
    }

    /// Suspends the loop like [`pause`](Self::pause) for as long as the
    /// returned guard lives.
    pub fn hold(&self) -> SchedulerHold {
        if self.state.holds.fetch_add(1, Ordering::SeqCst) == 0 {
            debug!("Scheduler held");
        }
        SchedulerHold {
            state: self.state.clone(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.state.holds.load(Ordering::SeqCst) > 0
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns the timing of the current (or last) run.
    pub fn timing(&self) -> SchedulerTiming {
        *self.timing.lock().unwrap()
    }

    pub fn status(&self) -> SchedulerStatus {
        let timing = self.timing();
        SchedulerStatus {
            running: self.is_running(),
            paused: self.is_paused(),
            held: self.is_held(),
            interval_secs: timing.interval.as_secs(),
            warmup_secs: timing.warmup.as_secs(),
            cycles_completed: self.state.completed.load(Ordering::SeqCst),
            cycles_abandoned: self.state.abandoned.load(Ordering::SeqCst),
            cycles_failed: self.state.failed.load(Ordering::SeqCst),
        }
    }

    /// Signals the loop to exit and waits up to the stop timeout for it.
    /// Clears the operator pause.
    pub async fn stop(&self) {
        let worker = self.worker.lock().unwrap().take();
        self.state.paused.store(false, Ordering::SeqCst);

        let Some(Worker { cancel, mut handle }) = worker else {
            return;
        };

        cancel.cancel();
        let stop_timeout = self.timing().stop_timeout;
        match tokio::time::timeout(stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!("Scheduler task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Scheduler did not stop within {:?}, aborting",
                    stop_timeout
                );
                handle.abort();
            }
        }
        self.state.running.store(false, Ordering::SeqCst);
    }
}

enum Warmup {
    Complete,
    Paused,
    Cancelled,
}

/// Sleeps out the warmup in slices, checking pause before each slice and
/// once more at the end.
async fn warm_up(state: &RunState, timing: &SchedulerTiming, cancel: &CancellationToken) -> Warmup {
    let mut remaining = timing.warmup;
    while !remaining.is_zero() {
        if state.suspended() {
            return Warmup::Paused;
        }
        let step = remaining.min(timing.slice);
        tokio::select! {
            _ = cancel.cancelled() => return Warmup::Cancelled,
            _ = tokio::time::sleep(step) => {}
        }
        remaining -= step;
    }

    if state.suspended() {
        Warmup::Paused
    } else {
        Warmup::Complete
    }
}

/// Rate limit for repeated sample failures: the first failure after a
/// success is reported, then at most one report per period carrying the
/// number of failures held back since the previous report.
#[derive(Debug)]
struct ErrorThrottle {
    period: Duration,
    last_report: Option<Instant>,
    suppressed: u32,
}

impl ErrorThrottle {
    fn new(period: Duration) -> Self {
        Self {
            period,
            last_report: None,
            suppressed: 0,
        }
    }

    /// Returns the suppressed count to report with this failure, or `None`
    /// if it should be held back.
    fn on_failure(&mut self, now: Instant) -> Option<u32> {
        let due = self
            .last_report
            .map_or(true, |at| now.duration_since(at) >= self.period);
        if due {
            self.last_report = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    fn on_success(&mut self) {
        self.last_report = None;
        self.suppressed = 0;
    }
}

async fn run_loop(
    engine: Arc<SamplingEngine>,
    state: Arc<RunState>,
    timing: SchedulerTiming,
    cancel: CancellationToken,
) {
    // First cycle starts immediately
    let mut next_attempt = Instant::now();
    let mut errors = ErrorThrottle::new(Duration::from_secs(60));

    loop {
        if state.suspended() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(timing.idle_poll) => continue,
            }
        }

        if Instant::now() >= next_attempt {
            match warm_up(&state, &timing, &cancel).await {
                Warmup::Cancelled => break,
                Warmup::Paused => {
                    state.abandoned.fetch_add(1, Ordering::SeqCst);
                    debug!("Scheduled cycle abandoned during warmup");
                    next_attempt = Instant::now() + timing.retry_after_abandon;
                    continue;
                }
                Warmup::Complete => {}
            }

            match engine
                .sample_blocking(Duration::ZERO, Provenance::Scheduled, true)
                .await
            {
                Ok(reading) => {
                    state.completed.fetch_add(1, Ordering::SeqCst);
                    errors.on_success();
                    debug!(
                        "Scheduled cycle complete ({}, {})",
                        reading.provenance, reading.rating
                    );
                }
                Err(e) => {
                    state.failed.fetch_add(1, Ordering::SeqCst);
                    match errors.on_failure(Instant::now()) {
                        Some(0) => warn!("Scheduled sample failed: {}", e),
                        Some(suppressed) => warn!(
                            "Scheduled sample failed: {} ({} more since last report)",
                            e, suppressed
                        ),
                        None => debug!("Scheduled sample failed: {}", e),
                    }
                }
            }
            next_attempt = Instant::now() + timing.interval;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(timing.slice) => {}
        }
    }

    debug!("Scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine_with, Behaviour, ScriptedSensor};
    use crate::records::ReadingLog;

    fn timing(interval: u64, warmup: u64) -> SchedulerTiming {
        SchedulerTiming {
            interval: Duration::from_secs(interval),
            warmup: Duration::from_secs(warmup),
            ..SchedulerTiming::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_warmup_abandons_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, counters) = engine_with(Behaviour::Working(2), &dir);
        let engine = Arc::new(engine);
        let scheduler = Scheduler::new(engine.clone());
        assert!(scheduler.start(timing(600, 30)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.pause();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = scheduler.status();
        assert_eq!(status.cycles_abandoned, 1);
        assert_eq!(status.cycles_completed, 0);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
        assert_eq!(engine.log().count().unwrap(), 0);

        // Retried well before a full interval
        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(scheduler.status().cycles_completed, 1);
        assert_eq!(engine.log().count().unwrap(), 1);
        let last = engine.last_logged().unwrap();
        assert_eq!(last.provenance, Provenance::Scheduled);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_scheduler_never_reads() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, counters) = engine_with(Behaviour::Working(2), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));
        scheduler.pause();
        scheduler.start(timing(10, 1));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_running());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(Behaviour::Failing, &dir);
        let engine = Arc::new(engine);
        let scheduler = Scheduler::new(engine.clone());
        scheduler.start(timing(10, 0));

        tokio::time::sleep(Duration::from_secs(25)).await;

        let status = scheduler.status();
        assert_eq!(status.cycles_failed, 3);
        assert_eq!(status.cycles_completed, 0);
        assert!(status.running);
        assert_eq!(engine.log().count().unwrap(), 0);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(Behaviour::Working(1), &dir);
        let engine = Arc::new(engine);
        let scheduler = Scheduler::new(engine.clone());
        scheduler.start(timing(60, 5));

        // Cycles start at 0, ~65 and ~130 seconds
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(engine.log().count().unwrap(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));

        assert!(scheduler.start(timing(600, 30)));
        assert!(!scheduler.start(timing(5, 0)));
        assert_eq!(scheduler.timing().interval, Duration::from_secs(600));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_pause() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));
        scheduler.start(timing(600, 30));
        scheduler.pause();
        assert!(scheduler.is_paused());

        scheduler.stop().await;
        assert!(!scheduler.is_paused());
        assert!(!scheduler.is_running());

        // Can be started again after a stop
        assert!(scheduler.start(timing(600, 30)));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_warmup() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));
        scheduler.start(timing(600, 30));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let start = Instant::now();
        scheduler.stop().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_background_and_foreground_reads_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, counters) = ScriptedSensor::new(Behaviour::Working(2));
        let sensor = sensor.with_read_time(Duration::from_millis(3));
        let log = ReadingLog::open(dir.path().join("air_records.csv")).unwrap();
        let engine = Arc::new(SamplingEngine::new(Box::new(sensor), log));

        let scheduler = Scheduler::new(engine.clone());
        scheduler.start(SchedulerTiming {
            interval: Duration::from_millis(5),
            warmup: Duration::from_millis(2),
            slice: Duration::from_millis(1),
            idle_poll: Duration::from_millis(1),
            retry_after_abandon: Duration::from_millis(1),
            stop_timeout: Duration::from_secs(2),
        });

        for _ in 0..10 {
            engine.begin_sampling(Duration::from_millis(2), Provenance::Button);
            tokio::time::sleep(Duration::from_millis(3)).await;
            engine.finish_sampling(true).await.unwrap();
        }
        scheduler.stop().await;

        assert_eq!(counters.overlaps.load(Ordering::SeqCst), 0);
        let mut intervals = counters.intervals.lock().unwrap().clone();
        intervals.sort();
        for pair in intervals.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
        assert!(scheduler.status().cycles_completed > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_does_not_lift_operator_pause() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));
        scheduler.start(timing(10, 0));
        scheduler.pause();

        drop(scheduler.hold());
        assert!(scheduler.is_paused());
        assert!(!scheduler.is_held());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_does_not_release_hold() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));
        let hold = scheduler.hold();
        scheduler.start(timing(10, 0));

        scheduler.pause();
        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(scheduler.status().held);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);

        drop(hold);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counters.reads.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[test]
    fn test_nested_holds() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(Behaviour::Working(1), &dir);
        let scheduler = Scheduler::new(Arc::new(engine));

        let outer = scheduler.hold();
        let inner = scheduler.hold();
        drop(inner);
        assert!(scheduler.is_held());
        drop(outer);
        assert!(!scheduler.is_held());
    }

    #[test]
    fn test_error_throttle_counts_suppressed_failures() {
        let start = Instant::now();
        let mut throttle = ErrorThrottle::new(Duration::from_secs(60));

        assert_eq!(throttle.on_failure(start), Some(0));
        assert_eq!(throttle.on_failure(start + Duration::from_secs(10)), None);
        assert_eq!(throttle.on_failure(start + Duration::from_secs(20)), None);
        assert_eq!(throttle.on_failure(start + Duration::from_secs(60)), Some(2));
        assert_eq!(throttle.on_failure(start + Duration::from_secs(70)), None);

        throttle.on_success();
        assert_eq!(throttle.on_failure(start + Duration::from_secs(80)), Some(0));
    }
}

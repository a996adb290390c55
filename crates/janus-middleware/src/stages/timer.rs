//! Timing decorators.
//!
//! [`TimerFilter`] wraps a filter and measures, per request:
//!
//! - `total`: from entering the decorated filter until its response settles,
//! - `downstream`: from calling `next` until the downstream response settles,
//! - `internal`: `total - downstream`, the time spent in the filter itself.
//!
//! [`TimerHandler`] wraps a handler and measures `total` only. Measurements go
//! to a [`TimingRecorder`]; the default [`LogRecorder`] logs them on the
//! `janus::timer` target and feeds the `janus_filter_duration_seconds`
//! histogram. Time is read from a [`Clock`] so tests can drive it by hand.

use crate::filter::{BoxedFilter, Filter, Next};
use janus_core::{Context, Handler, Request, ResponsePromise, SharedHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock based on [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when advanced.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Timings of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Time from entry until the response settled.
    pub total: Duration,
    /// Time spent downstream of the decorated filter, if it called `next`.
    pub downstream: Option<Duration>,
}

impl Timings {
    /// Time spent in the decorated filter itself.
    pub fn internal(&self) -> Duration {
        self.total
            .saturating_sub(self.downstream.unwrap_or(Duration::ZERO))
    }
}

/// Receives timings.
pub trait TimingRecorder: Send + Sync + 'static {
    /// Records the timings of one request through the element called `name`.
    fn record(&self, name: &str, timings: &Timings);
}

/// Logs timings and records them as histograms.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecorder;

impl TimingRecorder for LogRecorder {
    fn record(&self, name: &str, timings: &Timings) {
        let downstream_ms = timings.downstream.map(|d| d.as_secs_f64() * 1_000.0);
        info!(
            target: "janus::timer",
            name,
            total_ms = timings.total.as_secs_f64() * 1_000.0,
            internal_ms = timings.internal().as_secs_f64() * 1_000.0,
            downstream_ms = ?downstream_ms,
            "request timed"
        );

        let name = name.to_string();
        metrics::histogram!("janus_filter_duration_seconds", "name" => name.clone(), "segment" => "total")
            .record(timings.total.as_secs_f64());
        if let Some(downstream) = timings.downstream {
            metrics::histogram!("janus_filter_duration_seconds", "name" => name.clone(), "segment" => "downstream")
                .record(downstream.as_secs_f64());
            metrics::histogram!("janus_filter_duration_seconds", "name" => name, "segment" => "internal")
                .record(timings.internal().as_secs_f64());
        }
    }
}

/// Measures a decorated filter and the chain below it.
pub struct TimerFilter {
    name: String,
    delegate: BoxedFilter,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn TimingRecorder>,
}

impl TimerFilter {
    /// Times `delegate`, reporting under `name` with the system clock and [`LogRecorder`].
    pub fn new<F: Filter>(name: impl Into<String>, delegate: F) -> Self {
        Self {
            name: name.into(),
            delegate: Arc::new(delegate),
            clock: Arc::new(SystemClock::new()),
            recorder: Arc::new(LogRecorder),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the recorder.
    #[must_use]
    pub fn with_recorder<R: TimingRecorder>(mut self, recorder: R) -> Self {
        self.recorder = Arc::new(recorder);
        self
    }
}

impl Filter for TimerFilter {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise {
        let started = self.clock.now();
        let downstream = Arc::new(Mutex::new(None));
        let timed_next = Next::from_handler(DownstreamTimer {
            inner: next.into_handler(),
            clock: Arc::clone(&self.clock),
            elapsed: Arc::clone(&downstream),
        });

        let clock = Arc::clone(&self.clock);
        let recorder = Arc::clone(&self.recorder);
        let name = self.name.clone();
        self.delegate
            .filter(ctx, request, timed_next)
            .then_always(move || {
                let timings = Timings {
                    total: clock.now().saturating_sub(started),
                    downstream: *downstream.lock(),
                };
                recorder.record(&name, &timings);
            })
    }
}

/// Handler placed between the timed filter and the real `next`.
struct DownstreamTimer {
    inner: SharedHandler,
    clock: Arc<dyn Clock>,
    elapsed: Arc<Mutex<Option<Duration>>>,
}

impl Handler for DownstreamTimer {
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        let started = self.clock.now();
        let clock = Arc::clone(&self.clock);
        let elapsed = Arc::clone(&self.elapsed);
        self.inner
            .handle(ctx, request)
            .then_always(move || {
                *elapsed.lock() = Some(clock.now().saturating_sub(started));
            })
    }
}

/// Measures the total time of a handler.
pub struct TimerHandler {
    name: String,
    handler: SharedHandler,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn TimingRecorder>,
}

impl TimerHandler {
    /// Times `handler`, reporting under `name`.
    pub fn new<H: Handler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            clock: Arc::new(SystemClock::new()),
            recorder: Arc::new(LogRecorder),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the recorder.
    #[must_use]
    pub fn with_recorder<R: TimingRecorder>(mut self, recorder: R) -> Self {
        self.recorder = Arc::new(recorder);
        self
    }
}

impl Handler for TimerHandler {
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        let started = self.clock.now();
        let clock = Arc::clone(&self.clock);
        let recorder = Arc::clone(&self.recorder);
        let name = self.name.clone();
        self.handler.handle(ctx, request).then_always(move || {
            let timings = Timings {
                total: clock.now().saturating_sub(started),
                downstream: None,
            };
            recorder.record(&name, &timings);
        })
    }
}

/// Recorder keeping every measurement in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<(String, Timings)>>>,
}

impl MemoryRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All measurements so far, oldest first.
    pub fn records(&self) -> Vec<(String, Timings)> {
        self.records.lock().clone()
    }
}

impl TimingRecorder for MemoryRecorder {
    fn record(&self, name: &str, timings: &Timings) {
        self.records.lock().push((name.to_string(), *timings));
    }
}

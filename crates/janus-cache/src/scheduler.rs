//! Delayed task scheduling.
//!
//! The cache never sleeps itself: it hands eviction tasks to a [`Scheduler`]
//! together with a delay and keeps the returned [`ScheduledTask`] so the
//! eviction can be cancelled. [`TokioScheduler`] runs tasks on a Tokio
//! runtime; [`ManualScheduler`] is a deterministic double that only runs
//! tasks when told to.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

/// A unit of work to run after a delay.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a task after a delay.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` once `delay` has elapsed, unless the returned handle is
    /// cancelled first.
    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask;
}

impl<S> Scheduler for Arc<S>
where
    S: Scheduler + ?Sized,
{
    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask {
        (**self).schedule(task, delay)
    }
}

/// Handle to a scheduled task.
///
/// [`cancel`](Self::cancel) consumes the handle, so a task is cancelled at
/// most once. Dropping the handle does not cancel the task.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ScheduledTask {
    /// Create a handle that runs `cancel` when cancelled.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a handle for a task that cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Prevents the task from running if it has not run yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Runs scheduled tasks on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler for the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Like [`current`](Self::current), but fails instead of panicking.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask {
        trace!(delay_ms = delay.as_millis() as u64, "scheduling task");
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        ScheduledTask::new(move || join.abort())
    }
}

struct ManualTask {
    delay: Duration,
    due: Duration,
    task: Option<Task>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    tasks: Vec<ManualTask>,
}

/// Deterministic scheduler that runs tasks only when time is advanced.
///
/// Every call to [`Scheduler::schedule`] is recorded, in order, so tests can
/// assert how many tasks were scheduled and with which delays.
///
/// # Example
///
/// ```
/// use janus_cache::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
/// scheduler.schedule(Box::new(move || flag.store(true, Ordering::SeqCst)), Duration::from_secs(5));
///
/// assert_eq!(scheduler.advance(Duration::from_secs(4)), 0);
/// assert_eq!(scheduler.advance(Duration::from_secs(1)), 1);
/// assert!(ran.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    /// Create a scheduler at time zero with no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks scheduled so far, including cancelled and executed ones.
    pub fn schedule_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Delays of all scheduled tasks, in scheduling order.
    pub fn delays(&self) -> Vec<Duration> {
        self.state.lock().tasks.iter().map(|t| t.delay).collect()
    }

    /// Returns `true` if the task at `index` was cancelled.
    pub fn is_cancelled(&self, index: usize) -> bool {
        self.state
            .lock()
            .tasks
            .get(index)
            .is_some_and(|t| t.cancelled.load(Ordering::SeqCst))
    }

    /// Number of tasks that have neither run nor been cancelled.
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Advances time by `by` and runs every task that became due and was not
    /// cancelled, earliest first. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let mut due = {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            state
                .tasks
                .iter_mut()
                .filter(|t| t.due <= now && !t.cancelled.load(Ordering::SeqCst))
                .filter_map(|t| t.task.take().map(|task| (t.due, task)))
                .collect::<Vec<_>>()
        };
        due.sort_by_key(|(at, _)| *at);

        let count = due.len();
        for (_, task) in due {
            task();
        }
        count
    }

    /// Runs the task at `index` immediately, even if it was cancelled.
    ///
    /// This models a timer that already fired when its cancellation arrived.
    /// Returns `false` if there is no such task or it already ran.
    pub fn fire(&self, index: usize) -> bool {
        let task = self
            .state
            .lock()
            .tasks
            .get_mut(index)
            .and_then(|t| t.task.take());
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.state.lock();
            let due = state.now + delay;
            state.tasks.push(ManualTask {
                delay,
                due,
                task: Some(task),
                cancelled: Arc::clone(&cancelled),
            });
        }
        ScheduledTask::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("scheduled", &state.tasks.len())
            .finish()
    }
}

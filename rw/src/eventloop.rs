//! The polling event loop
//!
//! Runs one-time setup tasks once, then repeatedly invokes every registered
//! periodic task in registration order, sleeping a fixed interval between
//! cycles until a stop is signaled. Task errors are routed to an optional
//! exception handler; without one they are fatal unless suppression is on.
//!
//! Everything here is cooperative and single-threaded: tasks run to
//! completion one after another, and the only suspension point between
//! cycles is the sleep. A task can stop the loop or retire itself through a
//! [`LoopHandle`]; retirements take effect at the cycle boundary, and each
//! cycle iterates a snapshot of the registration list so in-task mutation is
//! safe.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Default sleep between cycles: check every ten minutes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Environment variable that suppresses unhandled task errors when set
pub const ENV_SUPPRESS: &str = "RW_DEBUG";

/// Boxed future returned by scheduled tasks
pub type TaskFuture = Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>>;

type PeriodicTask = Box<dyn FnMut() -> TaskFuture + Send>;
type OnceTask = Box<dyn FnOnce() -> TaskFuture + Send>;
type ExceptionHandler = Box<dyn FnMut(&eyre::Report) + Send>;

/// Errors escaping [`EventLoop::run`]
#[derive(Debug, Error)]
pub enum LoopError {
    /// A one-time setup task failed; the periodic phase never started
    #[error("setup task failed: {0}")]
    Setup(eyre::Report),

    /// A periodic or one-shot task failed with no handler and no suppression
    #[error("periodic task failed: {0}")]
    Cycle(eyre::Report),
}

/// Handle to a registered periodic task, returned by
/// [`EventLoop::schedule_repeating`] and accepted by `unschedule`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// State shared between the loop and its handles
struct Shared {
    stopped: AtomicBool,
    registered: Mutex<HashSet<TaskId>>,
    retired: Mutex<HashSet<TaskId>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            registered: Mutex::new(HashSet::new()),
            retired: Mutex::new(HashSet::new()),
        }
    }

    /// Move `id` from registered to retired; false when it was not registered
    fn retire(&self, id: TaskId) -> bool {
        let mut registered = self.registered.lock().expect("event loop registry poisoned");
        if !registered.remove(&id) {
            return false;
        }
        self.retired.lock().expect("event loop registry poisoned").insert(id);
        debug!(?id, "task retired");
        true
    }

    fn is_retired(&self, id: TaskId) -> bool {
        self.retired.lock().expect("event loop registry poisoned").contains(&id)
    }
}

/// Cloneable handle for stopping the loop or retiring tasks from anywhere,
/// including from inside a running task's own body
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl LoopHandle {
    /// Request the loop to exit after the current cycle and sleep complete
    pub fn signal_stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    /// Current stop flag
    pub fn should_break(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Remove a periodic task; takes effect at the cycle boundary.
    ///
    /// Returns true iff the task was registered and not yet removed.
    pub fn unschedule(&self, id: TaskId) -> bool {
        self.shared.retire(id)
    }
}

/// A deferred task that runs once, in the first cycle past its delay
struct OneShot {
    scheduled_at: Instant,
    delay: Duration,
    task: OnceTask,
}

/// The scheduler: owned mutable registration lists, a stop flag, and a
/// fixed inter-cycle interval
pub struct EventLoop {
    interval: Duration,
    suppress_errors: bool,
    setup: VecDeque<OnceTask>,
    tasks: Vec<(TaskId, PeriodicTask)>,
    one_shots: Vec<OneShot>,
    handler: Option<ExceptionHandler>,
    next_id: u64,
    shared: Arc<Shared>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl EventLoop {
    /// Create a loop with the given inter-cycle interval.
    ///
    /// The suppression flag is sampled from [`ENV_SUPPRESS`] here, once.
    pub fn new(interval: Duration) -> Self {
        let suppress_errors = std::env::var(ENV_SUPPRESS).map(|v| !v.is_empty()).unwrap_or(false);
        Self {
            interval,
            suppress_errors,
            setup: VecDeque::new(),
            tasks: Vec::new(),
            one_shots: Vec::new(),
            handler: None,
            next_id: 0,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Override the suppression flag sampled from the environment
    pub fn suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    /// Handle for stopping the loop or retiring tasks
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Append a one-time setup task; setup runs in registration order,
    /// before any periodic task, and is drained as it runs
    pub fn schedule_set_up<F, Fut>(&mut self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.setup.push_back(Box::new(move || {
            let fut: TaskFuture = Box::pin(task());
            fut
        }));
    }

    /// Register a periodic task; it participates in every future cycle
    /// until unscheduled
    pub fn schedule_repeating<F, Fut>(&mut self, mut task: F) -> TaskId
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.shared
            .registered
            .lock()
            .expect("event loop registry poisoned")
            .insert(id);
        self.tasks.push((
            id,
            Box::new(move || {
                let fut: TaskFuture = Box::pin(task());
                fut
            }),
        ));
        id
    }

    /// Schedule a task to run once, in the next cycle
    pub fn schedule_once<F, Fut>(&mut self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.schedule_once_after(Duration::ZERO, task);
    }

    /// Schedule a task to run once, in the first cycle after `delay` elapses.
    ///
    /// The task is removed whether it succeeds or fails.
    pub fn schedule_once_after<F, Fut>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.one_shots.push(OneShot {
            scheduled_at: Instant::now(),
            delay,
            task: Box::new(move || {
                let fut: TaskFuture = Box::pin(task());
                fut
            }),
        });
    }

    /// Remove a periodic task; see [`LoopHandle::unschedule`]
    pub fn unschedule(&mut self, id: TaskId) -> bool {
        self.shared.retire(id)
    }

    /// Install the exception handler for periodic task errors
    pub fn set_exception_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&eyre::Report) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Current stop flag
    pub fn should_break(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Request the loop to exit at the next cycle boundary
    pub fn signal_stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    /// Run the loop until stopped or a fatal error.
    ///
    /// Setup tasks run first, each removed from the pending list before it
    /// is invoked, so a re-run never repeats setup that already ran. A
    /// setup failure is always fatal and precedes the periodic phase. Each
    /// cycle then runs due one-shots, every periodic task in registration
    /// order, sleeps, and checks the stop flag.
    pub async fn run(&mut self) -> Result<(), LoopError> {
        debug!(
            setup = self.setup.len(),
            periodic = self.tasks.len(),
            interval = ?self.interval,
            "event loop starting"
        );

        while let Some(task) = self.setup.pop_front() {
            task().await.map_err(LoopError::Setup)?;
        }

        loop {
            self.run_due_one_shots().await?;
            self.run_cycle().await?;
            self.prune_retired();

            tokio::time::sleep(self.interval).await;

            if self.should_break() {
                debug!("stop signaled, event loop exiting");
                return Ok(());
            }
        }
    }

    /// Invoke every due one-shot; each is removed even when it fails
    async fn run_due_one_shots(&mut self) -> Result<(), LoopError> {
        if self.one_shots.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let shots = std::mem::take(&mut self.one_shots);
        for shot in shots {
            if now.duration_since(shot.scheduled_at) >= shot.delay {
                if let Err(err) = (shot.task)().await {
                    self.route_error(err)?;
                }
            } else {
                self.one_shots.push(shot);
            }
        }
        Ok(())
    }

    /// One pass over a snapshot of the periodic list, in registration order
    async fn run_cycle(&mut self) -> Result<(), LoopError> {
        let snapshot: Vec<TaskId> = self.tasks.iter().map(|(id, _)| *id).collect();

        for id in snapshot {
            if self.shared.is_retired(id) {
                continue;
            }
            let Some(index) = self.tasks.iter().position(|(tid, _)| *tid == id) else {
                continue;
            };

            let future = (self.tasks[index].1)();
            if let Err(err) = future.await {
                self.route_error(err)?;
            }
        }
        Ok(())
    }

    /// Route a task error: handler first, then suppression, else fatal
    fn route_error(&mut self, err: eyre::Report) -> Result<(), LoopError> {
        if let Some(handler) = self.handler.as_mut() {
            handler(&err);
            Ok(())
        } else if self.suppress_errors {
            warn!(error = %err, "periodic task failed (suppressed)");
            Ok(())
        } else {
            Err(LoopError::Cycle(err))
        }
    }

    /// Drop closures whose ids were retired since the last boundary
    fn prune_retired(&mut self) {
        let mut retired = self.shared.retired.lock().expect("event loop registry poisoned");
        if retired.is_empty() {
            return;
        }
        self.tasks.retain(|(id, _)| !retired.contains(id));
        retired.clear();
    }
}

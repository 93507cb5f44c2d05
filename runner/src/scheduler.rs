//! Bounded execution of experiments.
//!
//! A [`Scheduler`] accepts [`RunRequest`]s, keeps them in a FIFO admission
//! queue and runs at most `capacity` of them at the same time on a dedicated
//! worker pool. A single control thread moves requests from the queue into
//! the pool and reaps completed runs, it sleeps on a condition variable
//! whenever there is nothing to do.
//!
//! The lifecycle is strictly `Created -> Running -> Draining -> Stopped`:
//! requests may be submitted before `start`, and `stop` lets everything that
//! is already queued or running finish before returning. Running engines are
//! never killed and there is no timeout, a hung engine holds its slot until
//! it exits.
//!
//! Failed runs are reported like any other outcome and never retried,
//! callers that need retries have to re-submit.

mod lanes;

use crate::{
    executors::ProcessRunner,
    experiment::{self, ExperimentError},
    observer::{OutcomeObserver, TracingObserver},
    request::{RunOutcome, RunRequest},
};
use lanes::{Shared, Ticket};
use parking_lot::{Mutex, MutexGuard};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::JoinHandle,
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Number of concurrently running experiments if nothing else is configured
pub const DEFAULT_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid scheduler configuration: {0}")]
    Configuration(String),
    #[error("Cannot {operation} a {state} scheduler")]
    InvalidState {
        operation: &'static str,
        state: SchedulerState,
    },
    #[error("Rejected experiment: {0}")]
    Rejected(#[from] ExperimentError),
    #[error("Failed to spawn the control loop")]
    Spawn(#[from] std::io::Error),
}

pub struct Scheduler {
    capacity: usize,
    shared: Arc<Shared>,
    runner: Arc<ProcessRunner>,
    observer: Arc<dyn OutcomeObserver>,
    workers: Arc<ThreadPool>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler running at most `capacity` experiments at once.
    ///
    /// Outcomes are reported through [`TracingObserver`] unless replaced
    /// with [`Scheduler::with_observer`].
    pub fn new(capacity: usize, runner: ProcessRunner) -> Result<Self, SchedulerError> {
        if capacity < 1 {
            return Err(SchedulerError::Configuration(
                "capacity must be at least 1".to_string(),
            ));
        }

        let workers = ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|index| format!("sdnsim-run-{index}"))
            .build()
            .map_err(|error| SchedulerError::Configuration(error.to_string()))?;

        debug!("Created scheduler with {capacity} slots");

        Ok(Self {
            capacity,
            shared: Arc::new(Shared::new()),
            runner: Arc::new(runner),
            observer: Arc::new(TracingObserver),
            workers: Arc::new(workers),
            control: Mutex::new(None),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lanes.lock().state
    }

    /// number of requests waiting for a slot
    pub fn queued(&self) -> usize {
        self.shared.lanes.lock().queue.len()
    }

    /// number of requests occupying a slot
    pub fn in_flight(&self) -> usize {
        self.shared.lanes.lock().pool.len()
    }

    /// Begin dispatching on a dedicated control thread.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lanes = self.shared.lanes.lock();

        if lanes.state != SchedulerState::Created {
            return Err(SchedulerError::InvalidState {
                operation: "start",
                state: lanes.state,
            });
        }

        let control = ControlLoop {
            capacity: self.capacity,
            shared: self.shared.clone(),
            runner: self.runner.clone(),
            observer: self.observer.clone(),
            workers: self.workers.clone(),
        };

        // the new thread blocks on the lock until the state change below is visible
        let handle = std::thread::Builder::new()
            .name("sdnsim-scheduler".to_string())
            .spawn(move || control.run())?;

        lanes.state = SchedulerState::Running;
        *self.control.lock() = Some(handle);

        info!(
            capacity = self.capacity,
            queued = lanes.queue.len(),
            "Scheduler started"
        );

        Ok(())
    }

    /// Append a request to the admission queue.
    ///
    /// Only allowed before `stop` was called. The experiment name has to be
    /// usable as a single path component.
    pub fn submit(&self, request: RunRequest) -> Result<(), SchedulerError> {
        experiment::check_name(request.name())?;

        let mut lanes = self.shared.lanes.lock();

        match lanes.state {
            SchedulerState::Created | SchedulerState::Running => {}
            state => {
                return Err(SchedulerError::InvalidState {
                    operation: "submit to",
                    state,
                })
            }
        }

        if lanes.is_known(request.name()) {
            warn!(
                experiment = %request.name(),
                "Experiment with the same name is already queued or running, its config and results will be overwritten"
            );
        }

        debug!(experiment = %request.name(), "Queued experiment");

        lanes.queue.push_back(request);
        drop(lanes);
        self.shared.wakeup.notify_all();

        Ok(())
    }

    /// Stop accepting submissions and block until every queued and running
    /// experiment finished.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        let mut lanes = self.shared.lanes.lock();

        if lanes.state != SchedulerState::Running {
            return Err(SchedulerError::InvalidState {
                operation: "stop",
                state: lanes.state,
            });
        }

        info!(
            queued = lanes.queue.len(),
            in_flight = lanes.pool.len(),
            "Draining scheduler"
        );

        lanes.state = SchedulerState::Draining;
        self.shared.wakeup.notify_all();

        while lanes.state != SchedulerState::Stopped {
            self.shared.stopped.wait(&mut lanes);
        }
        drop(lanes);

        if let Some(handle) = self.control.lock().take() {
            if handle.join().is_err() {
                error!("Scheduler control loop panicked");
            }
        }

        info!("Scheduler stopped");

        Ok(())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("capacity", &self.capacity)
            .field("lanes", &self.shared.lanes)
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    /// A scheduler dropped while running drains in the background instead of
    /// leaving its control thread waiting forever.
    fn drop(&mut self) {
        let mut lanes = self.shared.lanes.lock();

        if lanes.state == SchedulerState::Running {
            warn!(
                queued = lanes.queue.len(),
                in_flight = lanes.pool.len(),
                "Scheduler dropped without stop, draining in the background"
            );

            lanes.state = SchedulerState::Draining;
            self.shared.wakeup.notify_all();
        }
    }
}

/// State owned by the control thread
struct ControlLoop {
    capacity: usize,
    shared: Arc<Shared>,
    runner: Arc<ProcessRunner>,
    observer: Arc<dyn OutcomeObserver>,
    workers: Arc<ThreadPool>,
}

impl ControlLoop {
    fn run(self) {
        let mut lanes = self.shared.lanes.lock();

        loop {
            let reaped = lanes.reap();
            let admitted = lanes.admit(self.capacity);

            if reaped.is_empty() && admitted.is_empty() {
                if lanes.state == SchedulerState::Draining && lanes.is_empty() {
                    lanes.state = SchedulerState::Stopped;
                    self.shared.stopped.notify_all();

                    break;
                }

                // releases the lock while waiting, completions and submissions
                // re-acquire it before signaling so no wakeup is lost
                self.shared.wakeup.wait(&mut lanes);
                continue;
            }

            MutexGuard::unlocked(&mut lanes, || self.handle(reaped, admitted));
        }

        debug!("Control loop exited");
    }

    fn handle(&self, reaped: Vec<RunOutcome>, admitted: Vec<(Ticket, RunRequest)>) {
        for outcome in reaped.iter() {
            self.notify("finished", &outcome.name, || self.observer.finished(outcome));
        }

        for (ticket, request) in admitted {
            self.notify("dispatched", request.name(), || self.observer.dispatched(&request));
            self.launch(ticket, request);
        }
    }

    /// A panicking observer must not take the control loop down with it
    fn notify(&self, event: &str, name: &str, callback: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!(
                experiment = %name,
                "Observer panicked on {event}: {}",
                panic_message(&*payload)
            );
        }
    }

    fn launch(&self, ticket: Ticket, request: RunRequest) {
        let runner = self.runner.clone();
        let shared = self.shared.clone();

        self.workers.spawn(move || {
            let started = Instant::now();

            // rayon aborts the process on an unhandled panic, the slot has to be freed either way
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&request)))
                .unwrap_or_else(|payload| {
                    let message = format!("engine panicked: {}", panic_message(&*payload));
                    error!(experiment = %request.name(), "{message}");

                    RunOutcome::failure(request.name(), None, Some(message), started.elapsed())
                });

            shared.complete(ticket, outcome);
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

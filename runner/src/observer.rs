use crate::request::{RunOutcome, RunRequest};
use itertools::Itertools;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives lifecycle events from the scheduler.
///
/// Called from the control loop, so implementations should return quickly.
pub trait OutcomeObserver: Send + Sync {
    fn dispatched(&self, _request: &RunRequest) {}

    fn finished(&self, outcome: &RunOutcome);
}

/// Default observer, forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl OutcomeObserver for TracingObserver {
    fn dispatched(&self, request: &RunRequest) {
        debug!(experiment = %request.name(), output = ?request.output_dir(), "Dispatched experiment");
    }

    fn finished(&self, outcome: &RunOutcome) {
        if outcome.is_success() {
            info!(
                experiment = %outcome.name,
                elapsed = ?outcome.elapsed,
                "Simulation completed"
            );
        } else {
            warn!(experiment = %outcome.name, "Simulation failed: {outcome}");
        }
    }
}

/// Keeps every outcome in memory, in completion order
#[derive(Debug, Default)]
pub struct CollectingObserver {
    outcomes: Mutex<Vec<RunOutcome>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<RunOutcome> {
        self.outcomes.lock().clone()
    }

    /// (succeeded, failed)
    pub fn summary(&self) -> (Vec<RunOutcome>, Vec<RunOutcome>) {
        self.outcomes
            .lock()
            .iter()
            .cloned()
            .partition(RunOutcome::is_success)
    }

    pub fn failed_names(&self) -> String {
        self.outcomes
            .lock()
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.name.as_str())
            .join(", ")
    }
}

impl OutcomeObserver for CollectingObserver {
    fn finished(&self, outcome: &RunOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}

/// Forwards every event to all inner observers, in order
#[derive(Default, Clone)]
pub struct Fanout {
    observers: Vec<Arc<dyn OutcomeObserver>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl OutcomeObserver for Fanout {
    fn dispatched(&self, request: &RunRequest) {
        self.observers
            .iter()
            .for_each(|observer| observer.dispatched(request));
    }

    fn finished(&self, outcome: &RunOutcome) {
        self.observers
            .iter()
            .for_each(|observer| observer.finished(outcome));
    }
}

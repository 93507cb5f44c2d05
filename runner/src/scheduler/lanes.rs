use super::SchedulerState;
use crate::request::{RunOutcome, RunRequest};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};

/// Identifies an admitted run, names are not guaranteed to be unique
pub(super) type Ticket = u64;

/// Everything the control loop and the callers share, behind a single lock
#[derive(Debug)]
pub(super) struct Lanes {
    pub state: SchedulerState,
    /// admission queue, dispatched strictly front to back
    pub queue: VecDeque<RunRequest>,
    /// in-flight runs, never more than the scheduler capacity
    pub pool: BTreeMap<Ticket, RunRequest>,
    /// runs that completed but were not yet reaped by the control loop
    pub finished: Vec<(Ticket, RunOutcome)>,
    next_ticket: Ticket,
}

impl Lanes {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Created,
            queue: VecDeque::new(),
            pool: BTreeMap::new(),
            finished: Vec::new(),
            next_ticket: 0,
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.queue.iter().any(|request| request.name() == name)
            || self.pool.values().any(|request| request.name() == name)
    }

    /// Remove all completed runs from the pool and return their outcomes.
    pub fn reap(&mut self) -> Vec<RunOutcome> {
        self.finished
            .drain(..)
            .filter_map(|(ticket, outcome)| self.pool.remove(&ticket).map(|_| outcome))
            .collect()
    }

    /// Move queued requests into the pool until it is full, oldest first.
    pub fn admit(&mut self, capacity: usize) -> Vec<(Ticket, RunRequest)> {
        let mut admitted = Vec::new();

        while self.pool.len() < capacity {
            let Some(request) = self.queue.pop_front() else {
                break;
            };

            let ticket = self.next_ticket;
            self.next_ticket += 1;

            self.pool.insert(ticket, request.clone());
            admitted.push((ticket, request));
        }

        admitted
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.pool.is_empty() && self.finished.is_empty()
    }
}

#[derive(Debug)]
pub(super) struct Shared {
    pub lanes: Mutex<Lanes>,
    /// signaled on submissions, completions and the start of a drain
    pub wakeup: Condvar,
    /// signaled once the state reaches `Stopped`
    pub stopped: Condvar,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes::new()),
            wakeup: Condvar::new(),
            stopped: Condvar::new(),
        }
    }

    /// report a completed run back to the control loop
    pub fn complete(&self, ticket: Ticket, outcome: RunOutcome) {
        self.lanes.lock().finished.push((ticket, outcome));
        self.wakeup.notify_all();
    }
}

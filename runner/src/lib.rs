//! Run many simulation experiments against an external engine without
//! overwhelming the host.
//!
//! Experiments are described by [`experiment::Experiment`], turned into the
//! engine's config format by a [`serialize::ConfigSerializer`] and executed
//! by an [`executors::Engine`]. The [`scheduler::Scheduler`] bounds how many
//! engines run at the same time.

pub mod collector;
pub mod config;
pub mod executors;
pub mod experiment;
pub mod observer;
pub mod request;
pub mod scheduler;
pub mod serialize;

pub use executors::{Engine, EngineExit, ProcessEngine, ProcessRunner};
pub use experiment::Experiment;
pub use observer::{CollectingObserver, OutcomeObserver, TracingObserver};
pub use request::{RunOutcome, RunRequest, RunStatus};
pub use scheduler::{Scheduler, SchedulerError, SchedulerState};
pub use serialize::{ConfigSerializer, JsonSerializer};

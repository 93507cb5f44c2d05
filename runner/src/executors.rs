pub mod engine;

pub use engine::{Engine, EngineExit, ProcessEngine};

use crate::{
    request::{RunOutcome, RunRequest},
    serialize::{ConfigSerializer, SerializeError},
};
use std::{fs, path::PathBuf, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to materialize config: {0}")]
    Serialize(#[from] SerializeError),
    #[error("Failed to launch engine: {0}")]
    Launch(std::io::Error),
}

/// Executes a single experiment from start to finish.
///
/// Shared between all in-flight runs, it holds no per-run state and does no
/// coordination of its own. Every failure along the way ends up in the
/// returned `RunOutcome` instead of being propagated.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    serializer: Arc<dyn ConfigSerializer>,
    engine: Arc<dyn Engine>,
}

impl ProcessRunner {
    pub fn new(serializer: Arc<dyn ConfigSerializer>, engine: Arc<dyn Engine>) -> Self {
        Self { serializer, engine }
    }

    #[instrument(level = "debug", skip_all, fields(experiment = %request.name()))]
    pub fn run(&self, request: &RunRequest) -> RunOutcome {
        let start = Instant::now();
        let result = self.execute(request);
        let elapsed = start.elapsed();

        match result {
            Ok(exit) if exit.is_success() => {
                debug!("Finished in {} ms", elapsed.as_millis());

                RunOutcome::success(request.name(), elapsed)
            }
            Ok(exit) => RunOutcome::failure(request.name(), exit.code, exit.diagnostic(), elapsed),
            Err(error) => RunOutcome::failure(request.name(), None, Some(error.to_string()), elapsed),
        }
    }

    fn execute(&self, request: &RunRequest) -> Result<EngineExit, RunError> {
        let output = request.output_dir();

        fs::create_dir_all(&output).map_err(|source| RunError::OutputDir {
            path: output.clone(),
            source,
        })?;

        let config = self.serializer.materialize(request.experiment())?;

        self.engine.run(&config, &output).map_err(RunError::Launch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{experiment::tests::experiment, request::RunStatus, serialize::JsonSerializer};
    use parking_lot::Mutex;
    use std::{io, path::Path};

    #[derive(Debug, Default)]
    struct Recording {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
        exit: Option<EngineExit>,
    }

    impl Engine for Recording {
        fn run(&self, config: &Path, output: &Path) -> io::Result<EngineExit> {
            self.calls.lock().push((config.to_path_buf(), output.to_path_buf()));

            match &self.exit {
                Some(exit) => Ok(exit.clone()),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no engine")),
            }
        }
    }

    fn runner(dir: &Path, engine: Arc<Recording>) -> ProcessRunner {
        ProcessRunner::new(Arc::new(JsonSerializer::new(dir.join("configs"))), engine)
    }

    #[test]
    fn materializes_then_invokes_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(Recording {
            exit: Some(EngineExit::ok()),
            ..Default::default()
        });
        let request = RunRequest::new(experiment("baseline"), dir.path().join("results/1_ns"));

        let outcome = runner(dir.path(), engine.clone()).run(&request);

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.name, "baseline");

        let calls = engine.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, dir.path().join("configs/baseline.json"));
        assert_eq!(calls[0].1, dir.path().join("results/1_ns/baseline"));
        assert!(calls[0].0.is_file());
        assert!(calls[0].1.is_dir());
    }

    #[test]
    fn non_zero_exit_is_a_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(Recording {
            exit: Some(EngineExit::failed(Some(1), "Exception in thread main\n")),
            ..Default::default()
        });

        let outcome = runner(dir.path(), engine).run(&RunRequest::new(experiment("broken"), dir.path()));

        assert_eq!(outcome.status, RunStatus::Failure { code: Some(1) });
        assert_eq!(outcome.message.as_deref(), Some("Exception in thread main"));
    }

    #[test]
    fn launch_error_is_a_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(Recording::default());

        let outcome = runner(dir.path(), engine).run(&RunRequest::new(experiment("missing"), dir.path()));

        assert_eq!(outcome.status, RunStatus::Failure { code: None });
        assert!(outcome.message.unwrap().contains("Failed to launch engine"));
    }

    #[test]
    fn output_dir_error_skips_engine() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("results");
        fs::write(&blocker, "").unwrap();
        let engine = Arc::new(Recording {
            exit: Some(EngineExit::ok()),
            ..Default::default()
        });

        let outcome = runner(dir.path(), engine.clone()).run(&RunRequest::new(experiment("blocked"), &blocker));

        assert_eq!(outcome.status, RunStatus::Failure { code: None });
        assert!(outcome.message.unwrap().contains("output directory"));
        assert!(engine.calls.lock().is_empty());
    }
}

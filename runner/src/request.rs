use crate::experiment::Experiment;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// A single experiment waiting for, or occupying, a pool slot
#[derive(Debug, Clone)]
pub struct RunRequest {
    experiment: Arc<Experiment>,
    output_root: PathBuf,
}

impl RunRequest {
    pub fn new(experiment: impl Into<Arc<Experiment>>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            experiment: experiment.into(),
            output_root: output_root.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.experiment.name
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// directory the engine writes its results into, `<output_root>/<name>`
    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// `code` is `None` when the engine never ran or was killed by a signal
    Failure { code: Option<i32> },
}

/// Terminal result of one experiment, produced exactly once per request
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub name: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn success(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status: RunStatus::Success,
            message: None,
            elapsed,
        }
    }

    pub fn failure(
        name: impl Into<String>,
        code: Option<i32>,
        message: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            status: RunStatus::Failure { code },
            message,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            RunStatus::Success => write!(f, "{} succeeded", self.name)?,
            RunStatus::Failure { code: Some(code) } => write!(f, "{} failed with code {code}", self.name)?,
            RunStatus::Failure { code: None } => write!(f, "{} failed", self.name)?,
        }

        match &self.message {
            Some(message) => write!(f, ": {message}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::tests::experiment;

    #[test]
    fn output_dir_is_nested_by_name() {
        let request = RunRequest::new(experiment("5_ns_2"), "results/5_ns");

        assert_eq!(request.name(), "5_ns_2");
        assert_eq!(request.output_dir(), PathBuf::from("results/5_ns/5_ns_2"));
    }

    #[test]
    fn display_outcomes() {
        let elapsed = Duration::from_millis(3);

        assert_eq!(RunOutcome::success("a", elapsed).to_string(), "a succeeded");
        assert_eq!(
            RunOutcome::failure("b", Some(2), Some("bad config".into()), elapsed).to_string(),
            "b failed with code 2: bad config"
        );
        assert_eq!(RunOutcome::failure("c", None, None, elapsed).to_string(), "c failed");
    }
}

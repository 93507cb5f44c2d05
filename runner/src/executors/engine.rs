use std::{
    ffi::OsString,
    fmt::Debug,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, trace};

/// Exit information of a single engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineExit {
    /// `None` if the process was terminated by a signal
    pub code: Option<i32>,
    pub stderr: String,
}

impl EngineExit {
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// last non-empty stderr line, usually the most useful bit of a crash
    pub fn diagnostic(&self) -> Option<String> {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// The simulation engine as seen by the scheduler: something that consumes a
/// config artifact and writes results into a directory.
///
/// An `Err` means the engine could not be launched at all.
pub trait Engine: Send + Sync + Debug {
    fn run(&self, config: &Path, output: &Path) -> io::Result<EngineExit>;
}

/// Runs the engine as a child process: `<exec> [params...] <config> <output>`
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    exec: PathBuf,
    params: Vec<OsString>,
}

impl ProcessEngine {
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self {
            exec: exec.into(),
            params: Vec::new(),
        }
    }

    /// fixed leading arguments, e.g. `-jar backend.jar` for a java engine
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn exec(&self) -> &Path {
        &self.exec
    }
}

impl Engine for ProcessEngine {
    fn run(&self, config: &Path, output: &Path) -> io::Result<EngineExit> {
        debug!(exec = ?self.exec, config = ?config, output = ?output, "Launching engine");

        let result = Command::new(&self.exec)
            .args(&self.params)
            .arg(config)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        trace!("Engine output: {}", String::from_utf8_lossy(&result.stdout));

        Ok(EngineExit {
            code: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        })
    }
}

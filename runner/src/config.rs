use crate::scheduler::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: Error },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    // the simulation engine, invoked once per experiment
    pub engine: EngineConfig,
    // where generated simulation configs are written to
    #[serde(default = "default_config_dir")]
    pub configs: PathBuf,
    // every experiment writes into <output>/<experiment name>
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,
    pub experiments: ExperimentSource,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // maximum number of concurrently running engines
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub exec: PathBuf,
    // fixed arguments placed before the config and output paths
    #[serde(default)]
    pub params: Vec<String>,
}

/// Files and directories that are searched for experiment descriptors
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSource {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    pub path: Option<PathBuf>,
    #[serde(default = "default_glob")]
    pub glob: String,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Report every problem at once instead of piece-by-piece, returns whether
    /// an error was found.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.executor.capacity == 0 {
            error!("executor.capacity must be at least 1");
            contains_error = true;
        }

        let exec = &self.engine.exec;

        if !exec.is_file() {
            error!(
                "Failed to find engine.exec. Either not a file or not found at {}",
                exec.to_string_lossy()
            );

            contains_error = true;
        } else {
            match check_executable(exec) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Engine {} is not executable, wrap it in a script or set the executable bit",
                        exec.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if engine.exec ({}) is an executable: {e}",
                        exec.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        let source = &mut self.experiments;

        if source.path.is_none() && source.paths.is_empty() {
            error!("experiments contains neither 'path' nor 'paths', there is nothing to run");
            contains_error = true;
        } else if let Some(path) = source.path.take() {
            if !source.paths.is_empty() {
                warn!("experiments contains both 'path' and 'paths'. This will be treated as if 'path' is a member of 'paths'");
            }

            // merge path into paths
            source.paths.push(path);
        }

        for path in source.paths.iter() {
            if !path.exists() {
                error!("Experiment path {} does not exist", path.to_string_lossy());
                contains_error = true;
            }
        }

        if self.configs.is_file() {
            error!(
                "configs ({}) must be a directory",
                self.configs.to_string_lossy()
            );
            contains_error = true;
        }

        contains_error
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("configs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_glob() -> String {
    String::from("*.{yaml,yml,json}")
}

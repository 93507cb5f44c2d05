use crate::{
    config::{ConfigErrors, ExperimentSource},
    experiment::Experiment,
};
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Finds experiment descriptor files below the configured paths.
///
/// Files are yielded in lexical order so that submission order, and with it
/// dispatch order, is stable between invocations.
#[derive(Debug)]
pub struct Collector {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Collector {
    pub fn load(source: &ExperimentSource) -> Result<Self, ConfigErrors> {
        let glob = GlobBuilder::new(source.glob.as_str())
            .build()?
            .compile_matcher();

        debug!("Filtering experiments with glob: {glob:?}");

        let mut roots = source.paths.iter().chain(source.path.iter());
        let Some(first) = roots.next() else {
            return Ok(Self {
                paths: Vec::new().into_iter(),
            });
        };

        let mut builder = WalkBuilder::new(first);
        // add other paths
        roots.for_each(|path| {
            builder.add(path);
        });

        let paths = builder
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to search for experiments: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
            .map(DirEntry::into_path)
            .filter(|path| is_experiment_file(&glob, path))
            .sorted()
            .dedup()
            .collect_vec();

        Ok(Self {
            paths: paths.into_iter(),
        })
    }

    /// Parse every collected descriptor, logging each one that fails.
    ///
    /// Returns the parsed experiments and the number of failures.
    pub fn experiments(self) -> (Vec<Experiment>, usize) {
        let mut failed = 0;

        let experiments = self
            .filter_map(|path| match Experiment::load(&path) {
                Ok(experiment) => Some(experiment),
                Err(error) => {
                    error!(path = ?path, "Failed to load experiment: {error}");
                    failed += 1;
                    None
                }
            })
            .collect();

        (experiments, failed)
    }
}

fn is_experiment_file(glob: &GlobMatcher, path: &Path) -> bool {
    glob.is_match(path) || path.file_name().map_or(false, |name| glob.is_match(name))
}

impl Iterator for Collector {
    type Item = PathBuf;

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }

    fn next(&mut self) -> Option<Self::Item> {
        self.paths.next()
    }
}

//! Common test setup: source files in a temporary directory.

use std::path::{Path, PathBuf};

use dataset::DatasetConfig;
use tempfile::TempDir;

use crate::fixtures::{csv_file, SourceFiles, DEMOGRAPHICS_HEADER, EXPERIMENT_HEADER, WEB_HEADER};

/// A temporary data directory holding one run's source files.
///
/// The directory is removed when the value is dropped.
pub struct TestDataDir {
    dir: TempDir,
    pub config: DatasetConfig,
}

impl TestDataDir {
    /// Writes `files` under the default source file names.
    pub fn new(files: &SourceFiles) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DatasetConfig::in_dir(dir.path());

        write(&config.demographics_path, &csv_file(DEMOGRAPHICS_HEADER, &files.demographics));
        write(&config.web_event_paths[0], &csv_file(WEB_HEADER, &files.web_pt_1));
        write(&config.web_event_paths[1], &csv_file(WEB_HEADER, &files.web_pt_2));
        write(&config.assignments_path, &csv_file(EXPERIMENT_HEADER, &files.experiment));

        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A path for run outputs inside the directory.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    /// Replaces one source file's contents verbatim.
    pub fn overwrite(&self, path: &Path, contents: &str) {
        write(path, contents);
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents)
        .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
}

//! Dataset source configuration.

use std::path::{Path, PathBuf};

use experiment_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Locations and format of the three raw sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Client demographics file
    #[serde(default = "default_demographics_path")]
    pub demographics_path: PathBuf,
    /// Web-log partitions, concatenated in this order
    #[serde(default = "default_web_event_paths")]
    pub web_event_paths: Vec<PathBuf>,
    /// Experiment assignment file
    #[serde(default = "default_assignments_path")]
    pub assignments_path: PathBuf,
    /// Field delimiter shared by all sources
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_demographics_path() -> PathBuf {
    PathBuf::from("data/df_final_demo.txt")
}

fn default_web_event_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/df_final_web_data_pt_1.txt"),
        PathBuf::from("data/df_final_web_data_pt_2.txt"),
    ]
}

fn default_assignments_path() -> PathBuf {
    PathBuf::from("data/df_final_experiment_clients.txt")
}

fn default_delimiter() -> char {
    ','
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            demographics_path: default_demographics_path(),
            web_event_paths: default_web_event_paths(),
            assignments_path: default_assignments_path(),
            delimiter: default_delimiter(),
        }
    }
}

impl DatasetConfig {
    /// Points every source at the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let file_name = |p: &Path| p.file_name().map(PathBuf::from).unwrap_or_default();
        let defaults = Self::default();
        Self {
            demographics_path: dir.join(file_name(&defaults.demographics_path)),
            web_event_paths: defaults
                .web_event_paths
                .iter()
                .map(|p| dir.join(file_name(p)))
                .collect(),
            assignments_path: dir.join(file_name(&defaults.assignments_path)),
            delimiter: defaults.delimiter,
        }
    }

    /// The delimiter as the single byte the csv reader expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::config(format!(
                "delimiter {:?} is not a single ASCII character",
                self.delimiter
            )))
        }
    }
}

// Explicit locations and policy for a build. Nothing here is read from
// ambient process state; `main` assembles it from CLI flags/env and hands
// it down.
use std::path::{Path, PathBuf};

pub const DEFAULT_BUCKET_WIDTH: f64 = 1500.0;
pub const ARTIFACT_FILE: &str = "aggregates.json";
pub const THEMES_FILE: &str = "themes.json";

#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub raw_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl DataPaths {
    pub fn new(raw_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn artifact(&self) -> PathBuf {
        self.cache_dir.join(ARTIFACT_FILE)
    }

    pub fn themes(&self) -> PathBuf {
        self.raw_dir.join(THEMES_FILE)
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(Path::new("data").join("raw"), Path::new("data").join("cache"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateConfig {
    pub paths: DataPaths,
    /// Monetary values are rounded to the nearest multiple of this.
    pub bucket_width: f64,
}

impl AggregateConfig {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }

    pub fn with_bucket_width(mut self, width: f64) -> Self {
        self.bucket_width = width;
        self
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self::new(DataPaths::default())
    }
}

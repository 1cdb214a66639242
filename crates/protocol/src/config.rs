use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_CACHE_DIR: &str = "sketch-cache";
pub const DEFAULT_RECORD_DIR: &str = "runs";

#[derive(Debug, Deserialize)]
pub struct LivecodeConfig {
    pub livecode_url: String,
    pub timeout_ms: Option<u64>,
    pub command: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
    pub record_dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

/// A file shipped to the sandbox with every exec; `source` is read from disk.
#[derive(Debug, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub source: PathBuf,
}

impl LivecodeConfig {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn command(&self) -> Vec<String> {
        self.command.clone().unwrap_or_else(crate::default_command)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
    }

    pub fn record_dir(&self) -> PathBuf {
        self.record_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_DIR))
    }
}

//! Error types and load result structures for the rule loader.

use std::path::PathBuf;

use crate::error::RuleError;
use crate::rule::Rule;

/// Problems with the contents of one rule file.
#[derive(Debug, thiserror::Error)]
pub enum RuleFileError {
    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A rule parsed but failed construction-time validation.
    #[error("rule #{index} ('{name}'): {source}")]
    Invalid {
        index: usize,
        name: String,
        #[source]
        source: RuleError,
    },
}

/// Errors that can occur while loading rule files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Filesystem I/O error.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its contents are unusable.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: RuleFileError,
    },
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// All rules in the file were constructed.
    Loaded { rules: Vec<Rule> },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}

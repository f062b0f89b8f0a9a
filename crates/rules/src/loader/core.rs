//! Core [`RuleLoader`] struct: filesystem-backed rule file loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rule::{Rule, RuleDefinition};

use super::error::{LoadError, LoadResult, LoadStatus, Result, RuleFileError};

/// On-disk shape of a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Parse and validate the rules in one YAML document.
pub fn parse_rules(yaml: &str) -> std::result::Result<Vec<Rule>, RuleFileError> {
    let file: RuleFile = serde_yaml::from_str(yaml)?;
    file.rules
        .into_iter()
        .enumerate()
        .map(|(index, def)| {
            let name = def.name.clone();
            Rule::try_from(def).map_err(|source| RuleFileError::Invalid {
                index,
                name,
                source,
            })
        })
        .collect()
}

/// Loads custom rules from a YAML file or a directory of YAML files.
pub struct RuleLoader {
    /// File or directory containing rule YAML.
    path: PathBuf,
}

impl RuleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every rule, failing on the first unreadable or invalid file.
    ///
    /// Construction errors are fatal: a partial rule list must never be
    /// assembled into a rule set.
    pub fn load_rules(&self) -> Result<Vec<Rule>> {
        let mut rules = Vec::new();
        for path in self.rule_files()? {
            let loaded = self.load_file(&path)?;
            info!(path = %path.display(), count = loaded.len(), "loaded rule file");
            rules.extend(loaded);
        }
        Ok(rules)
    }

    /// Load every file and report a status per file without stopping on
    /// errors. Dotfiles and non-YAML files are reported as skipped.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        if self.path.is_file() {
            return Ok(vec![self.load_result(self.path.clone())]);
        }

        let mut results = Vec::new();
        let mut files = Vec::new();
        collect_files(&self.path, &mut files)?;
        files.sort();

        for path in files {
            if is_dotfile(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "dotfile".to_string(),
                    },
                });
            } else if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
            } else {
                results.push(self.load_result(path));
            }
        }
        Ok(results)
    }

    /// Parse a single YAML file into validated rules.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Rule>> {
        let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_rules(&contents).map_err(|source| LoadError::File {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_result(&self, path: PathBuf) -> LoadResult {
        let status = match self.load_file(&path) {
            Ok(rules) => LoadStatus::Loaded { rules },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load rule file");
                LoadStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        LoadResult { path, status }
    }

    /// YAML rule files under the configured path, sorted.
    fn rule_files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        let mut files = Vec::new();
        collect_files(&self.path, &mut files)?;
        files.retain(|p| !is_dotfile(p) && is_yaml(p));
        files.sort();
        Ok(files)
    }
}

/// Recursively collect regular files, skipping dot-directories.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            if !is_dotfile(&path) {
                collect_files(&path, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

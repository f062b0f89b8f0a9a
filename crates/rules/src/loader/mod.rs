//! Filesystem loader for custom rule files.
//!
//! Rule files are YAML documents with a top-level `rules:` list written in
//! the snake_case authoring format of [`crate::rule::RuleDefinition`].
//! A path may name a single file or a directory, which is scanned
//! recursively in sorted order so loads are deterministic.

mod core;
mod error;

#[cfg(test)]
mod tests;

pub use self::core::{parse_rules, RuleFile, RuleLoader};
pub use self::error::{LoadError, LoadResult, LoadStatus, Result, RuleFileError};

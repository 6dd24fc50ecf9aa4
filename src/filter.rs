//! Exclusion rules shared by every direction of transfer
//!
//! A path is excluded when it starts with one of the excluded folder prefixes,
//! or when its file name (or the whole path's tail) matches an excluded file
//! pattern. Globs containing `/` are matched against the whole path. Push, pull and sync all consult the same [`ExclusionFilter`], so a
//! path that is never uploaded is also never materialized locally.

use regex::Regex;
use tracing::warn;

use crate::config::Config;

/// Placeholder in folder rules for the host application's config directory
pub const CONFIG_DIR_TOKEN: &str = "{{configDir}}";

/// Compiled exclusion rules for one operation
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    folder_prefixes: Vec<String>,
    file_patterns: Vec<FilePattern>,
}

#[derive(Debug, Clone)]
enum FilePattern {
    /// Exact file name, or suffix of the full path
    Literal(String),
    /// `*` glob matched against the file name
    Glob(Regex),
    /// `*` glob containing `/`, matched against the whole path
    PathGlob(Regex),
}

impl ExclusionFilter {
    /// Build the filter from configuration, resolving the config-dir token
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.filters.excluded_folders,
            &config.filters.excluded_files,
            &config.vault.config_dir,
        )
    }

    pub fn new(excluded_folders: &[String], excluded_files: &[String], config_dir: &str) -> Self {
        let folder_prefixes = excluded_folders
            .iter()
            .map(|folder| folder.trim())
            .filter(|folder| !folder.is_empty())
            .map(|folder| folder.replace(CONFIG_DIR_TOKEN, config_dir))
            .collect();

        let file_patterns = excluded_files
            .iter()
            .map(|pattern| pattern.trim())
            .filter(|pattern| !pattern.is_empty())
            .filter_map(FilePattern::compile)
            .collect();

        Self {
            folder_prefixes,
            file_patterns,
        }
    }

    /// Check whether a vault-relative path must be skipped
    pub fn is_excluded(&self, path: &str) -> bool {
        if self
            .folder_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return true;
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        self.file_patterns
            .iter()
            .any(|pattern| pattern.matches(name, path))
    }

    /// Folder prefixes after token resolution
    pub fn folder_prefixes(&self) -> &[String] {
        &self.folder_prefixes
    }
}

impl FilePattern {
    fn compile(pattern: &str) -> Option<Self> {
        if !pattern.contains('*') {
            return Some(FilePattern::Literal(pattern.to_string()));
        }

        let pattern_regex = regex::escape(pattern).replace(r"\*", ".*");
        match Regex::new(&format!("^{}$", pattern_regex)) {
            Ok(re) if pattern.contains('/') => Some(FilePattern::PathGlob(re)),
            Ok(re) => Some(FilePattern::Glob(re)),
            Err(e) => {
                warn!("Ignoring invalid exclusion pattern {}: {}", pattern, e);
                None
            }
        }
    }

    fn matches(&self, name: &str, path: &str) -> bool {
        match self {
            FilePattern::Literal(literal) => name == literal || path.ends_with(literal.as_str()),
            FilePattern::Glob(re) => re.is_match(name),
            FilePattern::PathGlob(re) => re.is_match(path),
        }
    }
}

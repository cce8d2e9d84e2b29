//! Mapping from `(kind, name)` to subplugin files.
//!
//! [`PathResolver`] is owned by the host's configuration layer; the loader only
//! consumes it. [`DirectoryResolver`] is the stock implementation over a
//! [`LoaderConfig`].

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use subplug_sdk::SubpluginKind;

use crate::config::{file_prefix, LoaderConfig};

/// A candidate file for one named subplugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    /// Whether the file passed validation and may be opened.
    pub valid: bool,
}

impl Candidate {
    pub fn valid(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            valid: true,
        }
    }

    pub fn invalid(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            valid: false,
        }
    }
}

/// Locates subplugin files.
///
/// Both operations must be idempotent and must not touch the registry.
pub trait PathResolver: Send + Sync {
    /// The file that should provide `(kind, name)`, with a validity verdict.
    fn resolve_one(&self, kind: SubpluginKind, name: &str) -> Candidate;

    /// Every candidate file for `kind`.
    fn resolve_all(&self, kind: SubpluginKind) -> Vec<PathBuf>;
}

/// Resolver over per-kind search directories.
///
/// A subplugin `name` of kind `kind` lives in
/// `<dir>/<file_prefix(kind)><name>.<ext>`; the first directory that has it
/// wins.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    config: LoaderConfig,
}

impl DirectoryResolver {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Resolver over the directories from the environment.
    pub fn from_env() -> Self {
        Self::new(LoaderConfig::from_env())
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Whether `path` is a regular file named like a `kind` subplugin.
    pub fn validate_file(&self, kind: SubpluginKind, path: &Path) -> bool {
        path.is_file() && self.matches_kind(kind, path)
    }

    fn matches_kind(&self, kind: SubpluginKind, path: &Path) -> bool {
        let has_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(file_prefix(kind)))
            .unwrap_or(false);
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == self.config.library_extension)
            .unwrap_or(false);
        has_prefix && has_extension
    }
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathResolver for DirectoryResolver {
    fn resolve_one(&self, kind: SubpluginKind, name: &str) -> Candidate {
        let file_name = self.config.file_name(kind, name);

        // Names are file-name fragments, never paths.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Candidate::invalid(file_name);
        }

        let dirs = self.config.search_paths(kind);
        for dir in dirs {
            let path = dir.join(&file_name);
            if self.validate_file(kind, &path) {
                return Candidate::valid(path);
            }
        }

        let fallback = dirs
            .first()
            .map(|dir| dir.join(&file_name))
            .unwrap_or_else(|| PathBuf::from(&file_name));
        Candidate::invalid(fallback)
    }

    fn resolve_all(&self, kind: SubpluginKind) -> Vec<PathBuf> {
        let mut seen: HashSet<OsString> = HashSet::new();
        let mut found = Vec::new();

        for dir in self.config.search_paths(kind) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };

            let mut paths: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| self.validate_file(kind, path))
                .collect();
            paths.sort();

            for path in paths {
                let Some(file_name) = path.file_name().map(|n| n.to_os_string()) else {
                    continue;
                };
                if seen.insert(file_name) {
                    found.push(path);
                }
            }
        }

        found
    }
}

//! Loader configuration: where each kind of subplugin lives on disk.
//!
//! Values come from the builder API or from environment variables. The core
//! never reads configuration files; hosts that have one can embed
//! [`LoaderConfig`] in their own (it is serde-serializable).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use subplug_sdk::SubpluginKind;

/// Default install root for subplugin libraries
pub const DEFAULT_ROOT: &str = "/usr/lib/subplug";

/// Environment variable names
pub mod env_vars {
    use subplug_sdk::SubpluginKind;

    pub const FILTERS: &str = "SUBPLUG_FILTERS";
    pub const DECODERS: &str = "SUBPLUG_DECODERS";
    pub const CUSTOM_FILTERS: &str = "SUBPLUG_CUSTOMFILTERS";
    pub const CONVERTERS: &str = "SUBPLUG_CONVERTERS";
    /// `true` switches log output to JSON
    pub const LOG_JSON: &str = "SUBPLUG_LOG_JSON";

    /// Path-list variable that prepends search dirs for `kind`
    pub fn search_path_var(kind: SubpluginKind) -> &'static str {
        match kind {
            SubpluginKind::Filter => FILTERS,
            SubpluginKind::Decoder => DECODERS,
            SubpluginKind::EasyCustomFilter => CUSTOM_FILTERS,
            SubpluginKind::Converter => CONVERTERS,
        }
    }
}

/// Sub-directory of [`DEFAULT_ROOT`] for a kind.
pub fn default_dir_name(kind: SubpluginKind) -> &'static str {
    match kind {
        SubpluginKind::Filter => "filters",
        SubpluginKind::Decoder => "decoders",
        SubpluginKind::EasyCustomFilter => "customfilters",
        SubpluginKind::Converter => "converters",
    }
}

/// File-name prefix identifying a library as a subplugin of `kind`.
pub fn file_prefix(kind: SubpluginKind) -> &'static str {
    match kind {
        SubpluginKind::Filter => "libsubplug_filter_",
        SubpluginKind::Decoder => "libsubplug_decoder_",
        SubpluginKind::EasyCustomFilter => "libsubplug_customfilter_",
        SubpluginKind::Converter => "libsubplug_converter_",
    }
}

/// Shared-library extension for the target platform.
pub fn platform_library_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(windows) {
        "dll"
    } else {
        "so"
    }
}

/// Ordered search directories, one list per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPaths {
    pub filters: Vec<PathBuf>,
    pub decoders: Vec<PathBuf>,
    pub custom_filters: Vec<PathBuf>,
    pub converters: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn get(&self, kind: SubpluginKind) -> &[PathBuf] {
        match kind {
            SubpluginKind::Filter => &self.filters,
            SubpluginKind::Decoder => &self.decoders,
            SubpluginKind::EasyCustomFilter => &self.custom_filters,
            SubpluginKind::Converter => &self.converters,
        }
    }

    pub fn get_mut(&mut self, kind: SubpluginKind) -> &mut Vec<PathBuf> {
        match kind {
            SubpluginKind::Filter => &mut self.filters,
            SubpluginKind::Decoder => &mut self.decoders,
            SubpluginKind::EasyCustomFilter => &mut self.custom_filters,
            SubpluginKind::Converter => &mut self.converters,
        }
    }
}

/// Configuration for the default directory resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directories searched per kind, earlier entries win
    #[serde(default)]
    pub search_paths: SearchPaths,

    /// Extension a candidate file must carry
    #[serde(default = "default_library_extension")]
    pub library_extension: String,
}

fn default_library_extension() -> String {
    platform_library_extension().to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: SearchPaths::default(),
            library_extension: default_library_extension(),
        }
    }
}

impl LoaderConfig {
    /// Empty configuration: no search directories at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories from the `SUBPLUG_*` variables followed by the defaults
    /// under [`DEFAULT_ROOT`].
    pub fn from_env() -> Self {
        Self::from_env_with(|var| std::env::var_os(var))
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::default();
        for kind in SubpluginKind::ALL {
            let paths = config.search_paths.get_mut(kind);
            if let Some(value) = lookup(env_vars::search_path_var(kind)) {
                paths.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
            }
            let default_dir = Path::new(DEFAULT_ROOT).join(default_dir_name(kind));
            if !paths.contains(&default_dir) {
                paths.push(default_dir);
            }
        }
        config
    }

    /// Append a search directory for `kind`.
    pub fn with_search_path(mut self, kind: SubpluginKind, path: impl AsRef<Path>) -> Self {
        self.search_paths.get_mut(kind).push(path.as_ref().to_path_buf());
        self
    }

    /// Override the library extension.
    pub fn with_library_extension(mut self, extension: impl Into<String>) -> Self {
        self.library_extension = extension.into();
        self
    }

    pub fn search_paths(&self, kind: SubpluginKind) -> &[PathBuf] {
        self.search_paths.get(kind)
    }

    /// File name a subplugin called `name` of `kind` must have.
    pub fn file_name(&self, kind: SubpluginKind, name: &str) -> String {
        format!("{}{}.{}", file_prefix(kind), name, self.library_extension)
    }
}

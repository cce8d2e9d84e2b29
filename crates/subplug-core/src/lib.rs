//! Subplugin registry and loader.
//!
//! Lets a host framework look up optional native modules ("subplugins") by
//! kind and name without knowing at build time which ones exist. A lookup that
//! misses the registry resolves the module's file, opens it with the platform
//! linker, and expects the module's init entry point to register itself before
//! the open returns.
//!
//! # Architecture
//!
//! ```text
//!   consumer ──get_subplugin(kind, name)──▶ SubpluginLoader
//!                                            │  Registry      (kind → name → payload)
//!                                            │  SearchState   (ByName | LoadAll | Settled)
//!                                            │  HandleSet     (opened modules)
//!                                            ▼
//!                         PathResolver ──path──▶ ModuleLinker ──subplug_init──▶ module
//!                                                                                 │
//!   SubpluginLoader::register_subplugin ◀──────── SubpluginRegistrar ◀────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use subplug_core::prelude::*;
//!
//! let loader = Arc::new(SubpluginLoader::builder().build());
//!
//! if let Some(data) = loader.get_subplugin(SubpluginKind::Filter, "tflite") {
//!     let filter: &FilterVtable = unsafe { data.as_ref() };
//!     // ...
//! }
//!
//! loader.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod handles;
pub mod linker;
pub mod loader;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod search;

pub use config::LoaderConfig;
pub use error::{Result, SubpluginError};
pub use handles::{HandleSet, ReleasePolicy, ReleaseReport};
pub use linker::{ModuleHandle, ModuleLinker, NativeLinker};
pub use loader::{SubpluginLoader, SubpluginLoaderBuilder};
pub use registry::{Registry, RegistryEntry};
pub use resolver::{Candidate, DirectoryResolver, PathResolver};
pub use search::SearchState;

pub use subplug_sdk::{SubpluginData, SubpluginKind, SubpluginRegistrar};

/// Re-exports commonly used types.
pub mod prelude {
    // Loader
    pub use crate::loader::{SubpluginLoader, SubpluginLoaderBuilder};
    pub use crate::search::SearchState;

    // Error handling
    pub use crate::error::{Result, SubpluginError};

    // Seams
    pub use crate::linker::{ModuleHandle, ModuleLinker, NativeLinker};
    pub use crate::resolver::{Candidate, DirectoryResolver, PathResolver};

    // Configuration
    pub use crate::config::LoaderConfig;
    pub use crate::handles::ReleasePolicy;

    // Shared ABI
    pub use subplug_sdk::{SubpluginData, SubpluginKind, SubpluginRegistrar};
}

//! Subplug SDK
//!
//! Types shared by the Subplug loader and the native subplugins it loads.
//! A subplugin is a shared library that exports an init entry point; when the
//! loader opens the library it calls that entry point with a
//! [`SubpluginRegistrar`], and the subplugin registers every name it provides
//! before returning.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use subplug_sdk::prelude::*;
//!
//! static ADD_FILTER: MyFilterVtable = MyFilterVtable { /* ... */ };
//!
//! export_subplugin!(|registrar| {
//!     registrar.register(
//!         SubpluginKind::Filter,
//!         "custom_add",
//!         SubpluginData::from_static(&ADD_FILTER),
//!     );
//! });
//! ```

pub mod data;
pub mod kind;
#[macro_use]
pub mod macros;
pub mod registrar;

pub use data::SubpluginData;
pub use kind::{KindError, SubpluginKind};
pub use registrar::{
    AbiVersionFn, InitFn, RegisterFn, SubpluginRegistrar, SUBPLUG_ABI_SYMBOL, SUBPLUG_ABI_VERSION,
    SUBPLUG_INIT_SYMBOL,
};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::data::SubpluginData;
    pub use crate::kind::SubpluginKind;
    pub use crate::registrar::{SubpluginRegistrar, SUBPLUG_ABI_VERSION};

    // Macros are automatically available due to #[macro_use]
}

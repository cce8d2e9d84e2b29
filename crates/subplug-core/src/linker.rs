//! Platform dynamic linker.
//!
//! [`ModuleLinker`] is the seam between the loader and the OS loader. The
//! production implementation, [`NativeLinker`], opens shared libraries with
//! `libloading` and runs their `subplug_init` entry point.

use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use subplug_sdk::{
    AbiVersionFn, InitFn, SubpluginRegistrar, SUBPLUG_ABI_SYMBOL, SUBPLUG_ABI_VERSION,
    SUBPLUG_INIT_SYMBOL,
};

use crate::error::{Result, SubpluginError};

/// An opened module. Dropping the box without calling [`release`] keeps
/// whatever the implementation does on drop; the loader always calls
/// `release` or deliberately leaks.
///
/// [`release`]: ModuleHandle::release
pub trait ModuleHandle: Send {
    /// File the module was opened from.
    fn path(&self) -> &Path;

    /// Close the module.
    fn release(self: Box<Self>) -> Result<()>;
}

impl fmt::Debug for dyn ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleHandle").field(&self.path()).finish()
    }
}

/// Opens module files and runs their registration entry point.
pub trait ModuleLinker: Send + Sync {
    /// Open `path` and run its init code with `registrar`.
    ///
    /// Called without the loader lock held: the module's init re-enters the
    /// loader through `registrar` on the calling thread.
    fn open(&self, path: &Path, registrar: &SubpluginRegistrar) -> Result<Box<dyn ModuleHandle>>;
}

/// Linker backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLinker;

impl NativeLinker {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLinker for NativeLinker {
    fn open(&self, path: &Path, registrar: &SubpluginRegistrar) -> Result<Box<dyn ModuleHandle>> {
        let library = unsafe { open_library(path) }.map_err(|e| load_failed(path, e))?;

        {
            // Version export is optional; modules built without the SDK macro
            // only need `subplug_init`.
            let abi: std::result::Result<Symbol<AbiVersionFn>, _> =
                unsafe { library.get(SUBPLUG_ABI_SYMBOL) };
            if let Ok(abi) = abi {
                let got = abi();
                if got != SUBPLUG_ABI_VERSION {
                    return Err(load_failed(
                        path,
                        format!("incompatible ABI version: expected {SUBPLUG_ABI_VERSION}, got {got}"),
                    ));
                }
            }

            let init: Symbol<InitFn> = unsafe { library.get(SUBPLUG_INIT_SYMBOL) }
                .map_err(|e| load_failed(path, format!("missing subplug_init: {e}")))?;

            tracing::debug!(path = %path.display(), "Running subplugin init");
            unsafe { init(registrar) };
        }

        Ok(Box::new(NativeModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// A library opened by [`NativeLinker`].
struct NativeModule {
    path: PathBuf,
    library: Library,
}

impl ModuleHandle for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn release(self: Box<Self>) -> Result<()> {
        let NativeModule { path, library } = *self;
        library.close().map_err(|e| SubpluginError::ReleaseFailed {
            path,
            reason: e.to_string(),
        })
    }
}

/// Open with immediate symbol binding, so unresolved symbols fail the load
/// instead of a later call.
#[cfg(unix)]
unsafe fn open_library(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix;

    unsafe { unix::Library::open(Some(path), unix::RTLD_NOW | unix::RTLD_LOCAL) }.map(Library::from)
}

#[cfg(not(unix))]
unsafe fn open_library(path: &Path) -> std::result::Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

fn load_failed(path: &Path, reason: impl ToString) -> SubpluginError {
    SubpluginError::LoadFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

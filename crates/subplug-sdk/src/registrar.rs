//! Registration ABI between the loader and a subplugin's init entry point.

use std::ffi::{c_char, c_void, CString};

use crate::data::SubpluginData;
use crate::kind::SubpluginKind;

/// Subplugin ABI version (must match the loader)
pub const SUBPLUG_ABI_VERSION: u32 = 1;

/// Init entry point every subplugin exports: [`InitFn`].
pub const SUBPLUG_INIT_SYMBOL: &[u8] = b"subplug_init\0";

/// Optional ABI version export: [`AbiVersionFn`].
pub const SUBPLUG_ABI_SYMBOL: &[u8] = b"subplug_abi_version\0";

/// Signature of `subplug_init`.
pub type InitFn = unsafe extern "C" fn(registrar: *const SubpluginRegistrar);

/// Signature of `subplug_abi_version`.
pub type AbiVersionFn = extern "C" fn() -> u32;

/// Host callback behind [`SubpluginRegistrar::register`].
///
/// `kind` is a raw [`SubpluginKind`] discriminant, `name` a NUL-terminated
/// UTF-8 string, `data` the payload pointer. Returns `true` on success.
pub type RegisterFn = unsafe extern "C" fn(
    ctx: *const c_void,
    kind: u32,
    name: *const c_char,
    data: *const c_void,
) -> bool;

/// Handed to a subplugin's init entry point while the loader is opening it.
///
/// The registrar is only valid for the duration of that call; a subplugin
/// must not keep it.
#[repr(C)]
#[derive(Debug)]
pub struct SubpluginRegistrar {
    /// ABI version of the loader that built this registrar
    pub abi_version: u32,
    ctx: *const c_void,
    register_fn: RegisterFn,
}

impl SubpluginRegistrar {
    /// Build a registrar around a host callback.
    ///
    /// # Safety
    /// `register_fn` must accept `ctx`, and `ctx` must stay valid for as long
    /// as the registrar is reachable.
    pub const unsafe fn new(ctx: *const c_void, register_fn: RegisterFn) -> Self {
        Self {
            abi_version: SUBPLUG_ABI_VERSION,
            ctx,
            register_fn,
        }
    }

    /// Register `data` under `(kind, name)`.
    ///
    /// Returns `false` when the name is empty or contains a NUL byte, or when
    /// the loader refuses the entry (for example because the name is already
    /// taken).
    pub fn register(&self, kind: SubpluginKind, name: &str, data: SubpluginData) -> bool {
        if name.is_empty() {
            return false;
        }
        let Ok(name) = CString::new(name) else {
            return false;
        };
        // SAFETY: pointers are valid for the call; ctx validity is guaranteed
        // by whoever constructed the registrar.
        unsafe { (self.register_fn)(self.ctx, kind as u32, name.as_ptr(), data.as_ptr()) }
    }

    /// Register through the raw C-level arguments.
    ///
    /// # Safety
    /// `name` must be null or point to a NUL-terminated string.
    pub unsafe fn register_raw(
        &self,
        kind: u32,
        name: *const c_char,
        data: *const c_void,
    ) -> bool {
        // SAFETY: upheld by the caller and the registrar's constructor.
        unsafe { (self.register_fn)(self.ctx, kind, name, data) }
    }
}

//! Opaque subplugin payloads.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// The opaque, non-null pointer a subplugin registers under its name.
///
/// The registry only *borrows* the pointee. Its lifetime is the subplugin's
/// responsibility: it is typically a `static` inside the subplugin's library and
/// stays valid for as long as that library is loaded. Nothing is freed when an
/// entry is unregistered.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpluginData(NonNull<c_void>);

// SAFETY: the pointer is never dereferenced by the registry; consumers that
// dereference it must know the pointee type, which subplugins publish as
// immutable, thread-safe tables.
unsafe impl Send for SubpluginData {}
unsafe impl Sync for SubpluginData {}

impl SubpluginData {
    /// Wrap a raw pointer, rejecting null.
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// Wrap a reference to a value that lives for the rest of the program.
    pub fn from_static<T: Sync + 'static>(value: &'static T) -> Self {
        Self(NonNull::from(value).cast())
    }

    /// The raw pointer.
    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr().cast_const()
    }

    /// Reinterpret the payload as a `&T`.
    ///
    /// # Safety
    /// The payload must have been created from a `T` that is still alive for
    /// `'a`, i.e. the subplugin that registered it has not been unloaded.
    pub unsafe fn as_ref<'a, T>(self) -> &'a T {
        // SAFETY: upheld by the caller.
        unsafe { self.0.cast::<T>().as_ref() }
    }
}

impl fmt::Debug for SubpluginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubpluginData({:p})", self.0)
    }
}

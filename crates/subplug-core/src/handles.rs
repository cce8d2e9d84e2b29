//! Handle Set: every module handle this loader has opened.
//!
//! Handles are never removed one by one. They are released together when the
//! loader shuts down, unless the C library is one whose `dlclose` at exit is
//! known to abort the process.

use std::fmt;

use crate::linker::ModuleHandle;

/// What to do with module handles at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Close every handle.
    Release,
    /// Leak every handle.
    ///
    /// glibc 2.23 can fail `_dl_close: Assertion 'map->l_init_called'` when a
    /// library is closed during process exit.
    Skip,
}

impl ReleasePolicy {
    /// Policy for the C library this process runs on.
    pub fn detect() -> Self {
        Self::for_libc_version(libc_version().as_deref())
    }

    /// Policy for a `gnu_get_libc_version()` string. Only exactly glibc 2.23
    /// selects [`Skip`](Self::Skip).
    pub fn for_libc_version(version: Option<&str>) -> Self {
        let Some(version) = version else {
            return ReleasePolicy::Release;
        };

        let mut parts = version.trim().split('.');
        let major = parts.next().and_then(|p| p.parse::<u32>().ok());
        let minor = parts.next().and_then(|p| p.parse::<u32>().ok());
        match (major, minor) {
            (Some(2), Some(23)) => ReleasePolicy::Skip,
            _ => ReleasePolicy::Release,
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn libc_version() -> Option<String> {
    // SAFETY: returns a pointer to a static NUL-terminated string.
    let version = unsafe { std::ffi::CStr::from_ptr(libc::gnu_get_libc_version()) };
    version.to_str().ok().map(str::to_owned)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn libc_version() -> Option<String> {
    None
}

/// Outcome of [`HandleSet::release_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Ordered collection of opened module handles.
#[derive(Default)]
pub struct HandleSet {
    handles: Vec<Box<dyn ModuleHandle>>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: Box<dyn ModuleHandle>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle exactly once, newest first.
    ///
    /// Must be called without the loader lock: closing a module runs its
    /// teardown code, which may call back into the loader.
    pub fn release_all(self, policy: ReleasePolicy) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if policy == ReleasePolicy::Skip {
            tracing::warn!(
                count = self.handles.len(),
                "Leaving subplugin modules open at shutdown (glibc 2.23 dlclose defect)"
            );
            report.skipped = self.handles.len();
            for handle in self.handles {
                std::mem::forget(handle);
            }
            return report;
        }

        for handle in self.handles.into_iter().rev() {
            let path = handle.path().to_path_buf();
            match handle.release() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Released subplugin module");
                    report.released += 1;
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to release subplugin module");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl fmt::Debug for HandleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handles.iter()).finish()
    }
}

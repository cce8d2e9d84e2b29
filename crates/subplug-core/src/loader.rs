//! Subplugin loader: lookup, on-demand loading and registration.
//!
//! # Locking
//!
//! One mutex guards the registry, the search states and the handle set. It is
//! released around every call into module code (opening, init, release),
//! because a module's init calls back into [`SubpluginLoader::register_subplugin`]
//! on the same thread while the open is still in progress.
//!
//! Loads are made mutually exclusive with in-flight markers:
//!
//! - a per-kind marker while a `LoadAll` kind is being bulk loaded;
//! - a per-`(kind, name)` marker while a `ByName` module is being opened.
//!
//! A thread that meets another thread's marker waits on a condvar and then
//! re-checks the registry, so a module is opened once even when many threads
//! ask for it at the same time. If that load fails, the waiters get the same
//! error instead of opening the file again.
//!
//! A thread that meets its *own* marker is a module's init looking itself up;
//! it gets `NotFound` instead of waiting on itself. Waits are tracked per
//! thread, and a wait that would close a cycle (two module inits each asking
//! for what the other thread is loading) is refused the same way.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::path::Path;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};
use subplug_sdk::{SubpluginData, SubpluginKind, SubpluginRegistrar};

use crate::error::{Result, SubpluginError};
use crate::handles::{HandleSet, ReleasePolicy, ReleaseReport};
use crate::linker::{ModuleHandle, ModuleLinker, NativeLinker};
use crate::registry::Registry;
use crate::resolver::{DirectoryResolver, PathResolver};
use crate::search::SearchState;

type LoadKey = (SubpluginKind, String);

/// A by-name load in progress.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    owner: ThreadId,
    load_id: u64,
}

/// Everything behind the loader lock.
struct LoaderState {
    registry: Registry,
    search: [SearchState; SubpluginKind::COUNT],
    bulk_in_flight: [Option<ThreadId>; SubpluginKind::COUNT],
    by_name_in_flight: HashMap<LoadKey, InFlight>,
    /// Last failed by-name load per key, for threads that waited on it.
    failed_loads: HashMap<LoadKey, (u64, SubpluginError)>,
    next_load_id: u64,
    /// Waiting thread → thread owning the marker it waits on.
    waits: HashMap<ThreadId, ThreadId>,
    /// `None` once the loader has been shut down.
    handles: Option<HandleSet>,
}

impl LoaderState {
    fn ensure_active(&self) -> Result<()> {
        if self.handles.is_some() {
            Ok(())
        } else {
            Err(SubpluginError::ShutDown)
        }
    }

    /// Whether `me` waiting on `owner` would close a wait cycle.
    fn wait_closes_cycle(&self, me: ThreadId, owner: ThreadId) -> bool {
        let mut current = owner;
        // A thread waits on at most one other, so a chain is at most this long.
        for _ in 0..=self.waits.len() {
            if current == me {
                return true;
            }
            match self.waits.get(&current) {
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }
}

/// The subplugin registry and loader.
///
/// Construct one per host with [`SubpluginLoader::init`] or
/// [`SubpluginLoader::builder`] and share it (for example in an `Arc`) with
/// every consumer. [`shutdown`](Self::shutdown) releases every loaded module;
/// dropping the loader does the same.
pub struct SubpluginLoader {
    state: Mutex<LoaderState>,
    load_done: Condvar,
    resolver: Box<dyn PathResolver>,
    linker: Box<dyn ModuleLinker>,
    release_policy: ReleasePolicy,
}

impl SubpluginLoader {
    /// Create a loader with an empty handle set.
    pub fn init(resolver: impl PathResolver + 'static, linker: impl ModuleLinker + 'static) -> Self {
        Self::builder().resolver(resolver).linker(linker).build()
    }

    pub fn builder() -> SubpluginLoaderBuilder {
        SubpluginLoaderBuilder::new()
    }

    /// Get the payload registered for `(kind, name)`, loading the module that
    /// provides it if needed.
    ///
    /// Failures are logged and reported as `None`; use
    /// [`try_get_subplugin`](Self::try_get_subplugin) for the reason.
    pub fn get_subplugin(&self, kind: SubpluginKind, name: &str) -> Option<SubpluginData> {
        match self.try_get_subplugin(kind, name) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(kind = %kind, name, error = %e, "Subplugin lookup failed");
                None
            }
        }
    }

    /// Like [`get_subplugin`](Self::get_subplugin), returning why the lookup
    /// failed.
    pub fn try_get_subplugin(&self, kind: SubpluginKind, name: &str) -> Result<SubpluginData> {
        if name.is_empty() {
            return Err(SubpluginError::InvalidArgument(
                "subplugin name must not be empty".to_string(),
            ));
        }

        let me = thread::current().id();
        let mut state = self.state.lock();
        state.ensure_active()?;
        state.registry.ensure_table(kind);

        self.settle_bulk_load(&mut state, kind, me)?;

        loop {
            if let Some(data) = state.registry.lookup(kind, name) {
                tracing::trace!(kind = %kind, name, "Subplugin found");
                return Ok(data);
            }

            match state.search[kind.index()] {
                SearchState::ByName => {}
                // LoadAll here means this thread is inside that kind's bulk
                // load, or waiting for it would have deadlocked.
                SearchState::LoadAll | SearchState::Settled => {
                    return Err(SubpluginError::NotFound(format!(
                        "{kind} subplugin '{name}' is not provided by any loaded module"
                    )));
                }
            }

            let key = (kind, name.to_string());
            match state.by_name_in_flight.get(&key).copied() {
                Some(InFlight { owner, .. }) if owner == me => {
                    return Err(SubpluginError::NotFound(format!(
                        "{kind} subplugin '{name}' is still being loaded by this thread"
                    )));
                }
                Some(InFlight { owner, load_id }) => {
                    if !self.wait_for(&mut state, me, owner) {
                        return Err(SubpluginError::NotFound(format!(
                            "{kind} subplugin '{name}' is being loaded by a thread waiting on this one"
                        )));
                    }
                    state.ensure_active()?;
                    if let Some((failed_id, err)) = state.failed_loads.get(&key) {
                        if *failed_id == load_id {
                            return Err(err.clone());
                        }
                    }
                    continue;
                }
                None => {}
            }

            return self.load_by_name(&mut state, kind, name, key, me);
        }
    }

    /// Register `data` under `(kind, name)`.
    ///
    /// Called by modules from their init entry point, through the registrar
    /// the loader hands them. Never overwrites an existing entry.
    pub fn register_subplugin(
        &self,
        kind: SubpluginKind,
        name: &str,
        data: SubpluginData,
    ) -> Result<()> {
        if name.is_empty() {
            tracing::warn!(kind = %kind, "Refusing to register a subplugin without a name");
            return Err(SubpluginError::InvalidArgument(
                "subplugin name must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.ensure_active()?;
        match state.registry.insert(kind, name, data) {
            Ok(()) => {
                tracing::debug!(kind = %kind, name, "Registered subplugin");
                Ok(())
            }
            Err(e) => {
                tracing::error!(kind = %kind, name, error = %e, "Subplugin registration rejected");
                Err(e)
            }
        }
    }

    /// Remove `(kind, name)` from the registry.
    ///
    /// The module that provided it stays loaded: a module may back several
    /// names, and consumers may still hold its payload.
    pub fn unregister_subplugin(&self, kind: SubpluginKind, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        let entry = state.registry.remove(kind, name)?;
        tracing::debug!(kind = %kind, name = entry.name(), "Unregistered subplugin");
        Ok(())
    }

    /// Release every loaded module and clear the registry.
    ///
    /// Idempotent. Every later operation fails with
    /// [`SubpluginError::ShutDown`].
    pub fn shutdown(&self) -> ReleaseReport {
        let handles = {
            let mut state = self.state.lock();
            // Payloads point into the modules about to be closed.
            state.registry.clear();
            state.handles.take()
        };
        self.load_done.notify_all();

        let Some(handles) = handles else {
            return ReleaseReport::default();
        };
        tracing::info!(modules = handles.len(), "Shutting down subplugin loader");
        handles.release_all(self.release_policy)
    }

    /// Current search policy of `kind`.
    pub fn search_state(&self, kind: SubpluginKind) -> SearchState {
        self.state.lock().search[kind.index()]
    }

    /// Registered names of `kind`, sorted.
    pub fn registered_names(&self, kind: SubpluginKind) -> Vec<String> {
        self.state.lock().registry.names(kind)
    }

    /// Number of module handles currently held.
    pub fn loaded_module_count(&self) -> usize {
        self.state.lock().handles.as_ref().map_or(0, HandleSet::len)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().handles.is_none()
    }

    pub fn release_policy(&self) -> ReleasePolicy {
        self.release_policy
    }

    /// Load every candidate of a `LoadAll` kind, once.
    fn settle_bulk_load(
        &self,
        state: &mut MutexGuard<'_, LoaderState>,
        kind: SubpluginKind,
        me: ThreadId,
    ) -> Result<()> {
        let idx = kind.index();
        loop {
            let owner = state.bulk_in_flight[idx];
            match owner {
                Some(owner) if owner == me => return Ok(()),
                Some(owner) => {
                    if !self.wait_for(state, me, owner) {
                        tracing::warn!(kind = %kind, "Not waiting for a bulk load owned by a thread waiting on this one");
                        return Ok(());
                    }
                    state.ensure_active()?;
                }
                None => break,
            }
        }

        if state.search[idx] != SearchState::LoadAll {
            return Ok(());
        }

        state.bulk_in_flight[idx] = Some(me);
        let opened = MutexGuard::unlocked(state, || self.load_all(kind));
        state.bulk_in_flight[idx] = None;
        state.search[idx] = SearchState::Settled;
        self.load_done.notify_all();

        if state.handles.is_none() {
            MutexGuard::unlocked(state, || release_now(opened));
            return Err(SubpluginError::ShutDown);
        }
        if let Some(set) = state.handles.as_mut() {
            for handle in opened {
                set.push(handle);
            }
        }
        Ok(())
    }

    /// Open every candidate the resolver lists for `kind`. Best effort: a
    /// candidate that fails is logged and skipped.
    fn load_all(&self, kind: SubpluginKind) -> Vec<Box<dyn ModuleHandle>> {
        let paths = self.resolver.resolve_all(kind);
        tracing::info!(kind = %kind, candidates = paths.len(), "Loading every subplugin of kind");

        paths
            .iter()
            .filter_map(|path| match self.open_module(path) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(kind = %kind, path = %path.display(), error = %e, "Skipping subplugin candidate");
                    None
                }
            })
            .collect()
    }

    /// Block until some load finishes. Refuses, returning `false`, when
    /// `owner` is already (transitively) waiting on `me`.
    fn wait_for(&self, state: &mut MutexGuard<'_, LoaderState>, me: ThreadId, owner: ThreadId) -> bool {
        if state.wait_closes_cycle(me, owner) {
            return false;
        }
        state.waits.insert(me, owner);
        self.load_done.wait(state);
        state.waits.remove(&me);
        true
    }

    /// Open the single file that should provide `(kind, name)` and check that
    /// it registered itself.
    fn load_by_name(
        &self,
        state: &mut MutexGuard<'_, LoaderState>,
        kind: SubpluginKind,
        name: &str,
        key: LoadKey,
        me: ThreadId,
    ) -> Result<SubpluginData> {
        let candidate = self.resolver.resolve_one(kind, name);
        if !candidate.valid {
            return Err(SubpluginError::NotFound(format!(
                "no valid {kind} subplugin file for '{name}' (candidate {})",
                candidate.path.display()
            )));
        }

        let load_id = state.next_load_id;
        state.next_load_id += 1;
        state.failed_loads.remove(&key);
        state.by_name_in_flight.insert(key.clone(), InFlight { owner: me, load_id });

        let opened = MutexGuard::unlocked(state, || self.open_module(&candidate.path));
        let result = self.adopt_by_name(state, kind, name, &candidate.path, opened);

        // Waiters must find either the marker or the recorded outcome.
        state.by_name_in_flight.remove(&key);
        match &result {
            Err(SubpluginError::ShutDown) | Ok(_) => {}
            Err(e) => {
                state.failed_loads.insert(key, (load_id, e.clone()));
            }
        }
        self.load_done.notify_all();
        result
    }

    /// Keep a freshly opened by-name module if it registered `name`.
    fn adopt_by_name(
        &self,
        state: &mut MutexGuard<'_, LoaderState>,
        kind: SubpluginKind,
        name: &str,
        path: &Path,
        opened: Result<Box<dyn ModuleHandle>>,
    ) -> Result<SubpluginData> {
        let handle = opened.inspect_err(|e| {
            tracing::error!(kind = %kind, name, error = %e, "Cannot open subplugin");
        })?;

        if state.handles.is_none() {
            MutexGuard::unlocked(state, || release_now(vec![handle]));
            return Err(SubpluginError::ShutDown);
        }

        match state.registry.lookup(kind, name) {
            Some(data) => {
                if let Some(set) = state.handles.as_mut() {
                    set.push(handle);
                }
                tracing::info!(kind = %kind, name, path = %path.display(), "Loaded subplugin");
                Ok(data)
            }
            None => {
                tracing::error!(
                    kind = %kind,
                    name,
                    path = %path.display(),
                    "Subplugin did not register itself during init"
                );
                MutexGuard::unlocked(state, || release_now(vec![handle]));
                Err(SubpluginError::NonConformantModule {
                    kind,
                    name: name.to_string(),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    /// Open one module. The caller must not hold the lock.
    fn open_module(&self, path: &Path) -> Result<Box<dyn ModuleHandle>> {
        // SAFETY: `self` outlives the open call, the only time the module may
        // use the registrar.
        let registrar =
            unsafe { SubpluginRegistrar::new(self as *const Self as *const c_void, register_from_module) };
        tracing::debug!(path = %path.display(), "Opening subplugin module");
        self.linker.open(path, &registrar)
    }

    /// Registration coming through the C ABI.
    ///
    /// # Safety
    /// `name` must be null or a NUL-terminated string.
    unsafe fn register_raw(&self, kind: u32, name: *const c_char, data: *const c_void) -> Result<()> {
        let kind = SubpluginKind::try_from(kind)?;
        if name.is_null() {
            return Err(SubpluginError::InvalidArgument(
                "subplugin name is null".to_string(),
            ));
        }
        // SAFETY: non-null and NUL-terminated per the caller.
        let name = unsafe { CStr::from_ptr(name) }.to_str().map_err(|_| {
            SubpluginError::InvalidArgument("subplugin name is not valid UTF-8".to_string())
        })?;
        let data = SubpluginData::from_ptr(data).ok_or_else(|| {
            SubpluginError::InvalidArgument(format!("{kind} subplugin '{name}' has a null payload"))
        })?;
        self.register_subplugin(kind, name, data)
    }
}

impl Drop for SubpluginLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// [`RegisterFn`](subplug_sdk::RegisterFn) handed to modules.
unsafe extern "C" fn register_from_module(
    ctx: *const c_void,
    kind: u32,
    name: *const c_char,
    data: *const c_void,
) -> bool {
    // SAFETY: `ctx` is the loader that built the registrar in `open_module`.
    let loader = unsafe { &*(ctx as *const SubpluginLoader) };
    match unsafe { loader.register_raw(kind, name, data) } {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Subplugin registration through registrar failed");
            false
        }
    }
}

/// Close handles that can no longer be kept.
fn release_now(handles: Vec<Box<dyn ModuleHandle>>) {
    for handle in handles {
        let path = handle.path().to_path_buf();
        if let Err(e) = handle.release() {
            tracing::error!(path = %path.display(), error = %e, "Failed to release subplugin module");
        }
    }
}

/// Builder for [`SubpluginLoader`].
pub struct SubpluginLoaderBuilder {
    resolver: Option<Box<dyn PathResolver>>,
    linker: Option<Box<dyn ModuleLinker>>,
    search: [SearchState; SubpluginKind::COUNT],
    release_policy: Option<ReleasePolicy>,
}

impl SubpluginLoaderBuilder {
    pub fn new() -> Self {
        Self {
            resolver: None,
            linker: None,
            search: SearchState::defaults(),
            release_policy: None,
        }
    }

    /// Path resolver. Defaults to [`DirectoryResolver::from_env`].
    pub fn resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Module linker. Defaults to [`NativeLinker`].
    pub fn linker(mut self, linker: impl ModuleLinker + 'static) -> Self {
        self.linker = Some(Box::new(linker));
        self
    }

    /// Override the starting search policy of one kind.
    pub fn search_state(mut self, kind: SubpluginKind, state: SearchState) -> Self {
        self.search[kind.index()] = state;
        self
    }

    /// Shutdown policy. Defaults to [`ReleasePolicy::detect`].
    pub fn release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = Some(policy);
        self
    }

    pub fn build(self) -> SubpluginLoader {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Box::new(DirectoryResolver::from_env()));
        let linker = self.linker.unwrap_or_else(|| Box::new(NativeLinker::new()));
        let release_policy = self.release_policy.unwrap_or_else(ReleasePolicy::detect);
        if release_policy == ReleasePolicy::Skip {
            tracing::info!("glibc 2.23 detected: subplugin modules will stay open at shutdown");
        }

        SubpluginLoader {
            state: Mutex::new(LoaderState {
                registry: Registry::new(),
                search: self.search,
                bulk_in_flight: [None; SubpluginKind::COUNT],
                by_name_in_flight: HashMap::new(),
                failed_loads: HashMap::new(),
                next_load_id: 0,
                waits: HashMap::new(),
                handles: Some(HandleSet::new()),
            }),
            load_done: Condvar::new(),
            resolver,
            linker,
            release_policy,
        }
    }
}

impl Default for SubpluginLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

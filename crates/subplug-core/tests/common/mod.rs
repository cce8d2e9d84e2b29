//! Test doubles for the path resolver and the platform linker.
//!
//! Scripted "modules" call back through the real `SubpluginRegistrar`, so
//! registration goes through the same C ABI trampoline a native library uses.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use subplug_core::prelude::*;

static PAYLOADS: [u32; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// A distinct payload per index.
pub fn payload(i: usize) -> SubpluginData {
    SubpluginData::from_static(&PAYLOADS[i])
}

pub type InitHook = Arc<dyn Fn(&SubpluginRegistrar) + Send + Sync>;

/// What a scripted module does when opened.
#[derive(Clone)]
pub enum Module {
    /// Registers these entries during init
    Registers(Vec<(SubpluginKind, &'static str, SubpluginData)>),
    /// Opens but registers nothing
    Silent,
    /// Cannot be opened
    Broken,
    /// Arbitrary init code
    Hook(InitHook),
}

impl Module {
    pub fn registers(kind: SubpluginKind, name: &'static str, data: SubpluginData) -> Self {
        Module::Registers(vec![(kind, name, data)])
    }

    pub fn hook(f: impl Fn(&SubpluginRegistrar) + Send + Sync + 'static) -> Self {
        Module::Hook(Arc::new(f))
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub resolve_one: AtomicUsize,
    pub resolve_all: AtomicUsize,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn resolve_all(&self) -> usize {
        self.resolve_all.load(Ordering::SeqCst)
    }
}

pub struct StaticResolver {
    one: HashMap<(SubpluginKind, String), Candidate>,
    all: HashMap<SubpluginKind, Vec<PathBuf>>,
    counters: Arc<Counters>,
}

impl PathResolver for StaticResolver {
    fn resolve_one(&self, kind: SubpluginKind, name: &str) -> Candidate {
        self.counters.resolve_one.fetch_add(1, Ordering::SeqCst);
        self.one
            .get(&(kind, name.to_string()))
            .cloned()
            .unwrap_or_else(|| Candidate::invalid(format!("/missing/{kind}/{name}")))
    }

    fn resolve_all(&self, kind: SubpluginKind) -> Vec<PathBuf> {
        self.counters.resolve_all.fetch_add(1, Ordering::SeqCst);
        self.all.get(&kind).cloned().unwrap_or_default()
    }
}

pub struct ScriptedLinker {
    modules: HashMap<PathBuf, Module>,
    counters: Arc<Counters>,
    delay: Duration,
}

impl ModuleLinker for ScriptedLinker {
    fn open(
        &self,
        path: &Path,
        registrar: &SubpluginRegistrar,
    ) -> subplug_core::Result<Box<dyn ModuleHandle>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        match self.modules.get(path) {
            None | Some(Module::Broken) => {
                return Err(SubpluginError::LoadFailed {
                    path: path.to_path_buf(),
                    reason: "cannot open shared object file".to_string(),
                });
            }
            Some(Module::Registers(entries)) => {
                for (kind, name, data) in entries {
                    registrar.register(*kind, name, *data);
                }
            }
            Some(Module::Silent) => {}
            Some(Module::Hook(hook)) => hook(registrar),
        }

        Ok(Box::new(FakeHandle {
            path: path.to_path_buf(),
            counters: self.counters.clone(),
        }))
    }
}

struct FakeHandle {
    path: PathBuf,
    counters: Arc<Counters>,
}

impl ModuleHandle for FakeHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn release(self: Box<Self>) -> subplug_core::Result<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds a loader over scripted modules.
pub struct Fixture {
    one: HashMap<(SubpluginKind, String), Candidate>,
    all: HashMap<SubpluginKind, Vec<PathBuf>>,
    modules: HashMap<PathBuf, Module>,
    delay: Duration,
    release_policy: ReleasePolicy,
    counters: Arc<Counters>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            one: HashMap::new(),
            all: HashMap::new(),
            modules: HashMap::new(),
            delay: Duration::ZERO,
            release_policy: ReleasePolicy::Release,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A module file that `resolve_one(kind, name)` points at.
    pub fn by_name(mut self, kind: SubpluginKind, name: &str, module: Module) -> Self {
        let path = PathBuf::from(format!("/lib/subplug/{kind}/{name}.so"));
        self.one
            .insert((kind, name.to_string()), Candidate::valid(path.clone()));
        self.modules.insert(path, module);
        self
    }

    /// A candidate the resolver reports as invalid.
    pub fn invalid(mut self, kind: SubpluginKind, name: &str) -> Self {
        let path = PathBuf::from(format!("/lib/subplug/{kind}/{name}.so"));
        self.one
            .insert((kind, name.to_string()), Candidate::invalid(path));
        self
    }

    /// A module file listed by `resolve_all(kind)`.
    pub fn candidate(mut self, kind: SubpluginKind, file: &str, module: Module) -> Self {
        let path = PathBuf::from(format!("/lib/subplug/{kind}/{file}"));
        self.all.entry(kind).or_default().push(path.clone());
        self.modules.insert(path, module);
        self
    }

    /// Time every open takes.
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    pub fn build(self) -> (SubpluginLoader, Arc<Counters>) {
        let counters = self.counters;
        let loader = SubpluginLoader::builder()
            .resolver(StaticResolver {
                one: self.one,
                all: self.all,
                counters: counters.clone(),
            })
            .linker(ScriptedLinker {
                modules: self.modules,
                counters: counters.clone(),
                delay: self.delay,
            })
            .release_policy(self.release_policy)
            .build();
        (loader, counters)
    }
}

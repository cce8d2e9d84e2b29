//! Lifecycle Tests
//!
//! Shutdown and drop behavior, the glibc 2.23 carve-out, and the stock
//! resolver and linker against real files.

mod common;

use std::fs;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use common::{payload, Fixture, Module};
use subplug_core::prelude::*;
use subplug_core::ReleaseReport;

fn three_modules() -> Fixture {
    Fixture::new()
        .by_name(
            SubpluginKind::Filter,
            "tflite",
            Module::registers(SubpluginKind::Filter, "tflite", payload(1)),
        )
        .by_name(
            SubpluginKind::Filter,
            "onnx",
            Module::registers(SubpluginKind::Filter, "onnx", payload(2)),
        )
        .by_name(
            SubpluginKind::Decoder,
            "boxes",
            Module::registers(SubpluginKind::Decoder, "boxes", payload(3)),
        )
}

fn load_three(loader: &SubpluginLoader) {
    assert!(loader.get_subplugin(SubpluginKind::Filter, "tflite").is_some());
    assert!(loader.get_subplugin(SubpluginKind::Filter, "onnx").is_some());
    assert!(loader.get_subplugin(SubpluginKind::Decoder, "boxes").is_some());
    assert_eq!(loader.loaded_module_count(), 3);
}

#[test]
fn test_shutdown_releases_each_module_once() {
    let (loader, counters) = three_modules().build();
    load_three(&loader);

    let report = loader.shutdown();
    assert_eq!(
        report,
        ReleaseReport {
            released: 3,
            failed: 0,
            skipped: 0
        }
    );
    assert_eq!(counters.releases(), 3);
    assert_eq!(loader.loaded_module_count(), 0);

    assert_eq!(loader.shutdown(), ReleaseReport::default());
    drop(loader);
    assert_eq!(counters.releases(), 3);
}

#[test]
fn test_glibc_2_23_leaves_modules_open() {
    let (loader, counters) = three_modules()
        .release_policy(ReleasePolicy::for_libc_version(Some("2.23")))
        .build();
    load_three(&loader);

    let report = loader.shutdown();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.released, 0);
    assert_eq!(counters.releases(), 0);
}

#[test]
fn test_drop_releases_modules() {
    let (loader, counters) = three_modules().build();
    load_three(&loader);

    drop(loader);
    assert_eq!(counters.releases(), 3);
}

#[test]
fn test_shutdown_with_nothing_loaded() {
    let (loader, counters) = three_modules().build();
    assert_eq!(loader.shutdown(), ReleaseReport::default());
    assert_eq!(counters.opens(), 0);
    assert!(loader.is_shut_down());
}

#[test]
fn test_unregister_keeps_module_loaded() {
    let (loader, counters) = three_modules().build();
    assert!(loader.get_subplugin(SubpluginKind::Filter, "tflite").is_some());

    loader
        .unregister_subplugin(SubpluginKind::Filter, "tflite")
        .unwrap();
    assert_eq!(loader.loaded_module_count(), 1);
    assert_eq!(counters.releases(), 0);
}

#[test]
fn test_shutdown_during_load_releases_new_module() {
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (proceed_tx, proceed_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let proceed_rx = Mutex::new(proceed_rx);

    let (loader, counters) = Fixture::new()
        .by_name(
            SubpluginKind::Filter,
            "slow",
            Module::hook(move |registrar| {
                started_tx.lock().unwrap().send(()).unwrap();
                proceed_rx.lock().unwrap().recv().unwrap();
                registrar.register(SubpluginKind::Filter, "slow", payload(1));
            }),
        )
        .build();
    let loader = Arc::new(loader);

    let worker = {
        let loader = loader.clone();
        thread::spawn(move || loader.try_get_subplugin(SubpluginKind::Filter, "slow"))
    };

    started_rx.recv().unwrap();
    let report = loader.shutdown();
    assert_eq!(report, ReleaseReport::default());
    proceed_tx.send(()).unwrap();

    assert_eq!(worker.join().unwrap(), Err(SubpluginError::ShutDown));
    assert_eq!(counters.releases(), 1);
    assert!(loader.registered_names(SubpluginKind::Filter).is_empty());
}

#[test]
fn test_native_linker_rejects_garbage_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("libsubplug_filter_garbage.so"),
        b"definitely not an ELF object",
    )
    .unwrap();

    let config = LoaderConfig::new()
        .with_library_extension("so")
        .with_search_path(SubpluginKind::Filter, dir.path());
    let loader = SubpluginLoader::init(DirectoryResolver::new(config), NativeLinker::new());

    assert!(matches!(
        loader.try_get_subplugin(SubpluginKind::Filter, "garbage"),
        Err(SubpluginError::LoadFailed { .. })
    ));
    assert_eq!(loader.get_subplugin(SubpluginKind::Filter, "garbage"), None);
    assert!(matches!(
        loader.try_get_subplugin(SubpluginKind::Filter, "absent"),
        Err(SubpluginError::NotFound(_))
    ));
    assert_eq!(loader.loaded_module_count(), 0);
}

#[test]
fn test_native_bulk_load_skips_garbage_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b"] {
        fs::write(
            dir.path().join(format!("libsubplug_converter_{name}.so")),
            b"garbage",
        )
        .unwrap();
    }

    let config = LoaderConfig::new()
        .with_library_extension("so")
        .with_search_path(SubpluginKind::Converter, dir.path());
    let loader = SubpluginLoader::init(DirectoryResolver::new(config), NativeLinker::new());

    assert_eq!(loader.get_subplugin(SubpluginKind::Converter, "a"), None);
    assert_eq!(loader.search_state(SubpluginKind::Converter), SearchState::Settled);
    assert_eq!(loader.loaded_module_count(), 0);
}

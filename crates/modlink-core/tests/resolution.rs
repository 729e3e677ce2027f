// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end module resolution against static libraries and real files

use modlink_core::{
    Context, ExportTable, MemoryFs, ModuleError, ModuleRegistry, NativeFn, Origin, RET_VALUE,
    Resolution, SearchPaths, SharedRegistry, StaticLoader, StdFs, Value, declare_module,
};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

unsafe extern "C" fn hello(ctx: *mut Context) -> c_int {
    let ctx = unsafe { &mut *ctx };
    ctx.push("hello from greet");
    RET_VALUE
}

declare_module!(dukopen_greet, |exports| {
    exports.insert_function("hello", hello, 0);
    Ok(())
});

declare_module!(dukopen_net_http, |exports| {
    exports.insert("name", "net.http");
    Ok(())
});

declare_module!(dukopen_broken, |_exports| Err("missing config".to_string()));

static COUNTED_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn dukopen_counted(ctx: *mut Context) -> c_int {
    let calls = COUNTED_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
    let ctx = unsafe { &mut *ctx };
    let mut exports = ExportTable::new();
    exports.insert("calls", calls as f64);
    ctx.push(exports);
    RET_VALUE
}

fn session(native: &str, script: &str) -> (ModuleRegistry, MemoryFs, StaticLoader) {
    let fs = MemoryFs::new();
    let loader = StaticLoader::new();
    let registry =
        ModuleRegistry::with_parts(SearchPaths::new(native, script), loader.clone(), fs.clone());
    (registry, fs, loader)
}

#[test]
fn test_preload_skips_filesystem_and_loader() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    let mut os = ExportTable::new();
    os.insert("platform", "test");
    registry.preload_exports("os", os);
    fs.insert("./os.so", "");
    fs.insert("./os.js", "");

    let mut exports = ExportTable::new();
    let resolution = registry.resolve_module("os", &mut exports).unwrap();

    assert_eq!(resolution, Resolution::ExportsReady(Origin::Preload));
    assert_eq!(exports.get("platform"), Some(&Value::from("test")));
    assert_eq!(fs.exists_calls(), 0);
    assert_eq!(fs.read_calls(), 0);
    assert_eq!(loader.load_count(), 0);
}

#[test]
fn test_greet_end_to_end() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    fs.insert("./greet.so", "");
    loader.add_library("./greet.so", [("dukopen_greet", dukopen_greet as NativeFn)]);

    let mut exports = ExportTable::new();
    let resolution = registry.resolve_module("greet", &mut exports).unwrap();

    assert_eq!(
        resolution,
        Resolution::ExportsReady(Origin::Native(PathBuf::from("./greet.so")))
    );
    let Some(Value::Function(hello)) = exports.get("hello") else {
        panic!("hello is not a function: {:?}", exports);
    };
    assert_eq!(hello.call(&[]).unwrap(), Value::from("hello from greet"));
}

#[test]
fn test_existing_exports_win() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    fs.insert("./greet.so", "");
    loader.add_library("./greet.so", [("dukopen_greet", dukopen_greet as NativeFn)]);

    let mut exports = ExportTable::new();
    exports.insert("hello", "mine");
    registry.resolve_module("greet", &mut exports).unwrap();
    assert_eq!(exports.get("hello"), Some(&Value::from("mine")));
}

#[test]
fn test_missing_symbol_keeps_library_cached() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    fs.insert("./greet.so", "");
    fs.insert("./greet.js", "exports.fallback = true");
    loader.add_library("./greet.so", []);

    let err = registry
        .resolve_module("greet", &mut ExportTable::new())
        .unwrap_err();

    match &err {
        ModuleError::Symbol { module, symbol, .. } => {
            assert_eq!(module, "greet");
            assert_eq!(symbol, "dukopen_greet");
        }
        other => panic!("expected a symbol error, got {:?}", other),
    }
    assert!(err.to_string().contains("dukopen_greet"));
    assert!(registry.library_cache().contains(Path::new("./greet.so")));

    // The cached library is reused, not reloaded
    registry
        .resolve_module("greet", &mut ExportTable::new())
        .unwrap_err();
    assert_eq!(loader.load_count(), 1);
}

#[test]
fn test_load_failure_does_not_fall_through() {
    let (mut registry, fs, _) = session("./?.so", "./?.js");
    fs.insert("./greet.so", "");
    fs.insert("./greet.js", "exports.fallback = true");

    let err = registry
        .resolve_module("greet", &mut ExportTable::new())
        .unwrap_err();
    assert!(matches!(err, ModuleError::Load { .. }));
    assert!(registry.library_cache().is_empty());
}

#[test]
fn test_initializer_error() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    fs.insert("./broken.so", "");
    loader.add_library("./broken.so", [("dukopen_broken", dukopen_broken as NativeFn)]);

    let err = registry
        .resolve_module("broken", &mut ExportTable::new())
        .unwrap_err();
    assert!(matches!(err, ModuleError::Initializer { .. }));
    assert!(err.to_string().contains("missing config"));
}

#[test]
fn test_cache_hit_reinvokes_initializer() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    fs.insert("./counted.so", "");
    loader.add_library("./counted.so", [("dukopen_counted", dukopen_counted as NativeFn)]);

    let before = COUNTED_CALLS.load(Ordering::SeqCst);
    registry.resolve_module("counted", &mut ExportTable::new()).unwrap();
    registry.resolve_module("counted", &mut ExportTable::new()).unwrap();

    assert_eq!(loader.load_count(), 1);
    assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst) - before, 2);
}

#[test]
fn test_sessions_unload_once_each() {
    let loader = StaticLoader::new();
    let fs = MemoryFs::new();
    fs.insert("./greet.so", "");
    loader.add_library("./greet.so", [("dukopen_greet", dukopen_greet as NativeFn)]);

    const SESSIONS: usize = 3;
    for _ in 0..SESSIONS {
        let mut registry = ModuleRegistry::with_parts(
            SearchPaths::new("./?.so", "./?.js"),
            loader.clone(),
            fs.clone(),
        );
        registry.resolve_module("greet", &mut ExportTable::new()).unwrap();
        registry.resolve_module("greet", &mut ExportTable::new()).unwrap();
    }

    assert_eq!(loader.load_count(), SESSIONS);
    assert_eq!(loader.close_count(), SESSIONS);
}

#[test]
fn test_submodule_identifier() {
    let (mut registry, fs, loader) = session("./?.so", "./?.js");
    let path: PathBuf = ["./net", "http.so"].iter().collect();
    fs.insert(path.clone(), "");
    loader.add_library(path.clone(), [("dukopen_net_http", dukopen_net_http as NativeFn)]);

    let mut exports = ExportTable::new();
    let resolution = registry.resolve_module("net.http", &mut exports).unwrap();
    assert_eq!(resolution.origin(), &Origin::Native(path));
    assert_eq!(exports.get("name"), Some(&Value::from("net.http")));
}

#[test]
fn test_not_found_lists_every_candidate() {
    let (mut registry, _, _) = session("./?.so;./lib/?.so", "./?.js");
    let err = registry
        .resolve_module("nothing", &mut ExportTable::new())
        .unwrap_err();

    let ModuleError::NotFound { tried, .. } = &err else {
        panic!("expected not found, got {:?}", err);
    };
    assert_eq!(
        tried,
        &vec![
            PathBuf::from("./nothing.so"),
            PathBuf::from("./lib/nothing.so"),
            PathBuf::from("./nothing.js"),
        ]
    );
    let message = err.to_string();
    assert!(message.contains("no file './lib/nothing.so'"));
}

#[test]
fn test_script_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("util")).unwrap();
    std::fs::write(dir.path().join("util").join("index.js"), "exports.ok = 1;").unwrap();

    let base = dir.path().display();
    let mut registry = ModuleRegistry::with_parts(
        SearchPaths::new(format!("{base}/?.so"), format!("{base}/?.js;{base}/?/index.js")),
        StaticLoader::new(),
        StdFs,
    );

    let mut exports = ExportTable::new();
    match registry.resolve_module("util", &mut exports).unwrap() {
        Resolution::Source { text, origin } => {
            assert_eq!(text, "exports.ok = 1;");
            assert_eq!(origin, Origin::Script(dir.path().join("util/index.js")));
        }
        other => panic!("expected source, got {:?}", other),
    }
    assert!(exports.is_empty());
}

#[test]
fn test_native_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("greet.so");
    std::fs::write(&lib, b"").unwrap();

    let loader = StaticLoader::new();
    loader.add_library(lib.clone(), [("dukopen_greet", dukopen_greet as NativeFn)]);
    let mut registry = ModuleRegistry::with_parts(
        SearchPaths::new(format!("{}/?.so", dir.path().display()), "./?.js"),
        loader.clone(),
        StdFs,
    );

    let mut exports = ExportTable::new();
    registry.resolve_module("greet", &mut exports).unwrap();
    assert!(exports.contains_key("hello"));

    // Removing the file does not evict the loaded library
    std::fs::remove_file(&lib).unwrap();
    assert!(registry.library_cache().contains(&lib));
    assert!(matches!(
        registry.resolve_module("greet", &mut ExportTable::new()),
        Err(ModuleError::NotFound { .. })
    ));
}

#[test]
fn test_shared_registry_across_threads() {
    let loader = StaticLoader::new();
    let fs = MemoryFs::new();
    fs.insert("./greet.so", "");
    loader.add_library("./greet.so", [("dukopen_greet", dukopen_greet as NativeFn)]);

    let shared = SharedRegistry::new(ModuleRegistry::with_parts(
        SearchPaths::new("./?.so", "./?.js"),
        loader.clone(),
        fs,
    ));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let mut exports = ExportTable::new();
                shared.resolve_module("greet", &mut exports).unwrap();
                exports.contains_key("hello")
            })
        })
        .collect();

    for thread in threads {
        assert!(thread.join().unwrap());
    }
    assert_eq!(loader.load_count(), 1);
    assert_eq!(shared.lock().library_cache().len(), 1);
}

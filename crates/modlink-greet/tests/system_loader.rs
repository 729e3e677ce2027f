// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loads the built `greet` cdylib through the operating system loader

use modlink_core::{ExportTable, ModuleRegistry, Origin, Resolution, SearchPaths, Value};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

fn library_name() -> String {
    format!("{}greet{}", DLL_PREFIX, DLL_SUFFIX)
}

/// The cdylib cargo built next to this test binary
fn built_library() -> PathBuf {
    let exe = std::env::current_exe().expect("test binary path");
    let deps = exe.parent().expect("test binary directory");
    [deps, deps.parent().unwrap_or(deps)]
        .iter()
        .map(|dir| dir.join(library_name()))
        .find(|path| path.is_file())
        .unwrap_or_else(|| panic!("{} not found near {}", library_name(), deps.display()))
}

/// A private copy of the library in a fresh directory
fn install(dir: &Path) -> PathBuf {
    let dest = dir.join(library_name());
    std::fs::copy(built_library(), &dest).expect("copy greet library");
    dest
}

fn registry_for(dir: &Path) -> ModuleRegistry {
    let template = format!("{}/{}?{}", dir.display(), DLL_PREFIX, DLL_SUFFIX);
    ModuleRegistry::new(SearchPaths::new(template, format!("{}/?.js", dir.display())))
}

fn call(exports: &ExportTable, name: &str, args: &[Value]) -> Value {
    match exports.get(name) {
        Some(Value::Function(func)) => func.call(args).unwrap(),
        other => panic!("{} should be a function, got {:?}", name, other),
    }
}

#[test]
fn test_require_greet_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = install(dir.path());
    let mut registry = registry_for(dir.path());

    let mut exports = ExportTable::new();
    let resolution = registry.resolve_module("greet", &mut exports).unwrap();
    assert_eq!(resolution, Resolution::ExportsReady(Origin::Native(path.clone())));
    assert_eq!(exports.keys().collect::<Vec<_>>(), vec!["addTwo", "hello", "version"]);

    assert_eq!(call(&exports, "hello", &[Value::from("Ada")]), Value::from("Hello, Ada!"));
    assert_eq!(call(&exports, "hello", &[]), Value::from("Hello from native code!"));
    assert_eq!(
        call(&exports, "addTwo", &[Value::Number(2.0), Value::Number(40.0)]),
        Value::Number(42.0)
    );
    assert_eq!(
        exports.get("version").and_then(Value::as_str),
        Some(modlink_core::VERSION)
    );
    assert_eq!(registry.library_cache().paths(), vec![path]);
}

#[test]
fn test_exports_outlive_real_unload() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path());
    let mut registry = registry_for(dir.path());

    let mut exports = ExportTable::new();
    registry.resolve_module("greet", &mut exports).unwrap();
    drop(registry);

    // The library stays mapped while an exported function is reachable
    assert_eq!(call(&exports, "hello", &[Value::from("Ada")]), Value::from("Hello, Ada!"));
    assert_eq!(call(&exports, "addTwo", &[Value::Number(1.0), Value::Number(1.0)]), Value::Number(2.0));
}

#[test]
fn test_load_lib_initializer() {
    let dir = tempfile::tempdir().unwrap();
    let path = install(dir.path());
    let mut registry = registry_for(dir.path());

    let init = registry
        .load_lib(&path, "dukopen_greet")
        .unwrap()
        .expect("initializer");
    let table = init.call(&[]).unwrap();
    let exports = table.as_object().expect("export table");
    assert!(exports.contains_key("hello"));

    let err = registry.load_lib(&path, "dukopen_missing").unwrap_err();
    assert!(err.to_string().contains("dukopen_missing"));
}

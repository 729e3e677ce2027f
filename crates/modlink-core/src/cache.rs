// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loaded native library cache
//!
//! The cache owns every library mapping of an embedding session. A path is
//! loaded at most once while its entry lives. Each mapping is shared between
//! its cache entry and every [`NativeFunction`] resolved from it, and is
//! closed exactly once, when the last of them lets go: after its
//! [`LibraryFinalizer`] runs and the cache reaches a safe point
//! ([`LibraryCache::collect`]), when the cache is dropped, or later when the
//! last exported function is dropped.

use crate::platform::{LoadError, LoadMode, LoadedLibrary, PlatformLoader, SymbolError};
use crate::value::{NativeFn, NativeFunction};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// A library mapping, closed when dropped
struct Mapping {
    lib: Option<Box<dyn LoadedLibrary>>,
    path: PathBuf,
    unloads: Arc<AtomicUsize>,
}

impl Mapping {
    fn symbol(&self, name: &str) -> Result<NativeFn, SymbolError> {
        match &self.lib {
            Some(lib) => lib.symbol(name),
            None => Err(SymbolError::new(name, "library was unloaded")),
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        let Some(lib) = self.lib.take() else {
            return;
        };
        self.unloads.fetch_add(1, Ordering::SeqCst);
        match lib.close() {
            Ok(()) => tracing::info!("unloaded native library {}", self.path.display()),
            Err(e) => tracing::warn!("failed to unload {}: {}", self.path.display(), e),
        }
    }
}

struct LibraryEntry {
    id: u64,
    mapping: Arc<Mapping>,
    finalizer_registered: bool,
}

#[derive(Default)]
struct Table {
    entries: FxHashMap<PathBuf, LibraryEntry>,
    /// Finalized libraries waiting for the next safe point
    pending: Vec<Arc<Mapping>>,
    torn_down: bool,
}

/// Non-owning reference to a cached library
#[derive(Clone)]
pub struct LibraryHandle {
    id: u64,
    path: PathBuf,
    table: Weak<Mutex<Table>>,
}

impl LibraryHandle {
    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an exported native function taking `nargs` arguments.
    ///
    /// The function keeps the library mapped until it is dropped. Fails if
    /// the library has been finalized or torn down since the handle was
    /// created.
    pub fn function(&self, name: &str, nargs: i32) -> Result<NativeFunction, SymbolError> {
        let table = self
            .table
            .upgrade()
            .ok_or_else(|| SymbolError::new(name, "library cache was torn down"))?;
        let mapping = match table.lock().entries.get(&self.path) {
            Some(entry) if entry.id == self.id => Arc::clone(&entry.mapping),
            _ => return Err(SymbolError::new(name, "library was unloaded")),
        };
        let func = mapping.symbol(name)?;
        Ok(NativeFunction::new(func, nargs).with_owner(mapping))
    }
}

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

/// Unload trigger for the script object that owns a library.
///
/// Finalizing (explicitly or by dropping) detaches the library from the
/// cache and queues it for unloading. A finalizer that outlives its cache
/// does nothing.
pub struct LibraryFinalizer {
    id: u64,
    path: PathBuf,
    table: Weak<Mutex<Table>>,
    done: bool,
}

impl LibraryFinalizer {
    /// Path of the library this finalizer unloads
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the finalizer now
    pub fn finalize(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock();
        if table.torn_down {
            return;
        }
        let entry = match table.entries.remove(&self.path) {
            Some(entry) if entry.id == self.id => entry,
            _ => panic!(
                "library cache corrupted: finalized entry for {} is missing",
                self.path.display()
            ),
        };
        tracing::debug!("library {} finalized, unload deferred", self.path.display());
        table.pending.push(entry.mapping);
    }
}

impl Drop for LibraryFinalizer {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for LibraryFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryFinalizer")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

/// Session-scoped table of loaded native libraries
pub struct LibraryCache {
    loader: Box<dyn PlatformLoader>,
    table: Arc<Mutex<Table>>,
    next_id: u64,
    loads: usize,
    unloads: Arc<AtomicUsize>,
}

impl LibraryCache {
    /// Create an empty cache backed by `loader`
    pub fn new(loader: impl PlatformLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            table: Arc::new(Mutex::new(Table::default())),
            next_id: 0,
            loads: 0,
            unloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return the cached library for `path`, loading it on a miss.
    ///
    /// Failed loads are not cached, so a later request retries. On a hit
    /// `mode` is ignored.
    pub fn get_or_load(&mut self, path: &Path, mode: LoadMode) -> Result<LibraryHandle, LoadError> {
        self.collect();

        if let Some(handle) = self.get(path) {
            tracing::debug!("library cache hit for {}", path.display());
            return Ok(handle);
        }

        let lib = self.loader.load(path, mode)?;
        let id = self.next_id;
        self.next_id += 1;
        self.loads += 1;
        tracing::info!("loaded native library {}", path.display());

        self.table.lock().entries.insert(
            path.to_path_buf(),
            LibraryEntry {
                id,
                mapping: Arc::new(Mapping {
                    lib: Some(lib),
                    path: path.to_path_buf(),
                    unloads: Arc::clone(&self.unloads),
                }),
                finalizer_registered: false,
            },
        );

        Ok(self.handle(id, path))
    }

    /// Look up a cached library without loading
    pub fn get(&self, path: &Path) -> Option<LibraryHandle> {
        let id = self.table.lock().entries.get(path)?.id;
        Some(self.handle(id, path))
    }

    /// Tie the library behind `handle` to a script object's lifetime.
    ///
    /// Returns `None` if a finalizer was already registered for the entry or
    /// the handle is stale.
    pub fn register_unload_on_finalize(&self, handle: &LibraryHandle) -> Option<LibraryFinalizer> {
        let mut table = self.table.lock();
        let entry = table.entries.get_mut(&handle.path)?;
        if entry.id != handle.id || entry.finalizer_registered {
            return None;
        }
        entry.finalizer_registered = true;
        Some(LibraryFinalizer {
            id: entry.id,
            path: handle.path.clone(),
            table: Arc::downgrade(&self.table),
            done: false,
        })
    }

    /// Release every finalized library. Returns how many were closed.
    ///
    /// A library that exported functions still reference stays mapped and
    /// is closed when the last of them is dropped.
    pub fn collect(&mut self) -> usize {
        let pending = std::mem::take(&mut self.table.lock().pending);
        let mut closed = 0;
        for mapping in pending {
            let path = mapping.path.clone();
            match Arc::into_inner(mapping) {
                Some(mapping) => {
                    drop(mapping);
                    closed += 1;
                }
                None => tracing::debug!("library {} still referenced, unload deferred", path.display()),
            }
        }
        closed
    }

    /// Whether `path` is currently loaded
    pub fn contains(&self, path: &Path) -> bool {
        self.table.lock().entries.contains_key(path)
    }

    /// Paths of all loaded libraries
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.table.lock().entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of loaded libraries
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Check if no library is loaded
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    /// Libraries finalized but not yet unloaded
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Total successful loads over the cache's lifetime
    pub fn load_count(&self) -> usize {
        self.loads
    }

    /// Total unloads of libraries this cache loaded, including unloads
    /// that happened after the cache itself was dropped
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    fn handle(&self, id: u64, path: &Path) -> LibraryHandle {
        LibraryHandle {
            id,
            path: path.to_path_buf(),
            table: Arc::downgrade(&self.table),
        }
    }
}

impl Drop for LibraryCache {
    fn drop(&mut self) {
        self.collect();

        let mut entries: Vec<LibraryEntry> = {
            let mut table = self.table.lock();
            table.torn_down = true;
            table.entries.drain().map(|(_, entry)| entry).collect()
        };
        // Newest first, so dependents go before what they link against.
        // Libraries with live exported functions close when those drop.
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        for entry in entries {
            drop(entry);
        }
    }
}

impl std::fmt::Debug for LibraryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryCache")
            .field("paths", &self.paths())
            .field("loads", &self.loads)
            .field("unloads", &self.unload_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticLoader;
    use crate::value::{Context, RET_UNDEFINED, Value};
    use std::os::raw::c_int;

    unsafe extern "C" fn noop(_ctx: *mut Context) -> c_int {
        RET_UNDEFINED
    }

    fn loader() -> StaticLoader {
        let loader = StaticLoader::new();
        loader.add_library("./a.so", [("noop", noop as NativeFn)]);
        loader.add_library("./b.so", [("noop", noop as NativeFn)]);
        loader
    }

    #[test]
    fn test_hit_skips_loader() {
        let stats = loader();
        let mut cache = LibraryCache::new(stats.clone());

        let first = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
        let second = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(stats.load_count(), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(first.function("noop", 0).is_ok());
        assert!(first.function("missing", 0).is_err());
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let stats = StaticLoader::new();
        let mut cache = LibraryCache::new(stats.clone());

        assert!(cache.get_or_load(Path::new("./late.so"), LoadMode::Local).is_err());
        assert!(cache.is_empty());

        stats.add_library("./late.so", [("noop", noop as NativeFn)]);
        assert!(cache.get_or_load(Path::new("./late.so"), LoadMode::Local).is_ok());
        assert_eq!(stats.load_count(), 1);
    }

    #[test]
    fn test_teardown_unloads_each_library_once() {
        let stats = loader();
        {
            let mut cache = LibraryCache::new(stats.clone());
            cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
            cache.get_or_load(Path::new("./b.so"), LoadMode::Local).unwrap();
            cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
        }
        assert_eq!(stats.load_count(), 2);
        assert_eq!(stats.close_count(), 2);
    }

    #[test]
    fn test_finalizer_then_teardown_unloads_once() {
        let stats = loader();
        {
            let mut cache = LibraryCache::new(stats.clone());
            let handle = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
            let finalizer = cache.register_unload_on_finalize(&handle).unwrap();
            assert!(cache.register_unload_on_finalize(&handle).is_none());

            finalizer.finalize();
            assert!(!cache.contains(Path::new("./a.so")));
            assert_eq!(cache.pending_count(), 1);
            assert_eq!(stats.close_count(), 0);
            assert!(handle.function("noop", 0).is_err());

            assert_eq!(cache.collect(), 1);
            assert_eq!(stats.close_count(), 1);
        }
        assert_eq!(stats.close_count(), 1);
    }

    #[test]
    fn test_finalizer_after_teardown_is_noop() {
        let stats = loader();
        let finalizer = {
            let mut cache = LibraryCache::new(stats.clone());
            let handle = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
            cache.register_unload_on_finalize(&handle).unwrap()
        };
        assert_eq!(stats.close_count(), 1);
        drop(finalizer);
        assert_eq!(stats.close_count(), 1);
    }

    #[test]
    fn test_reload_after_finalize() {
        let stats = loader();
        let mut cache = LibraryCache::new(stats.clone());
        let handle = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
        drop(cache.register_unload_on_finalize(&handle));

        let fresh = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
        assert_ne!(fresh.id, handle.id);
        assert_eq!(stats.load_count(), 2);
        assert_eq!(stats.close_count(), 1);
        assert_eq!(cache.unload_count(), 1);
    }

    #[test]
    fn test_function_keeps_library_mapped() {
        let stats = loader();
        let func = {
            let mut cache = LibraryCache::new(stats.clone());
            let handle = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
            let func = handle.function("noop", 0).unwrap();
            assert!(func.is_library_backed());

            cache.register_unload_on_finalize(&handle).unwrap().finalize();
            assert_eq!(cache.collect(), 0);
            assert_eq!(cache.pending_count(), 0);
            assert_eq!(stats.close_count(), 0);
            func
        };

        // The cache is gone but the function still holds the mapping
        assert_eq!(stats.close_count(), 0);
        assert_eq!(func.call(&[]).unwrap(), Value::Undefined);

        let copy = func.clone();
        drop(func);
        assert_eq!(stats.close_count(), 0);
        drop(copy);
        assert_eq!(stats.close_count(), 1);
    }

    #[test]
    fn test_teardown_defers_referenced_library() {
        let stats = loader();
        let mut cache = LibraryCache::new(stats.clone());
        let a = cache.get_or_load(Path::new("./a.so"), LoadMode::Local).unwrap();
        cache.get_or_load(Path::new("./b.so"), LoadMode::Local).unwrap();
        let func = a.function("noop", 0).unwrap();

        let unloads = Arc::clone(&cache.unloads);
        drop(cache);
        assert_eq!(stats.close_count(), 1);
        drop(func);
        assert_eq!(stats.close_count(), 2);
        assert_eq!(unloads.load(Ordering::SeqCst), 2);
    }
}

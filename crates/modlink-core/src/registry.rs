// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry - decides where a module comes from
//!
//! Lookup order, first match wins:
//!
//! 1. the preload table
//! 2. the native search path (shared library + initializer)
//! 3. the script search path (source text for the host engine)
//!
//! A branch that finds a candidate commits to it. A library that exists but
//! fails to load is an error, not a reason to try the script path.

use crate::cache::{LibraryCache, LibraryFinalizer};
use crate::config::SearchPaths;
use crate::error::{ModuleError, Result};
use crate::fs::{HostFs, StdFs};
use crate::platform::{LoadMode, PlatformLoader, SystemLoader};
use crate::resolver::{self, Search};
use crate::symbol;
use crate::value::{ExportTable, NativeFunction, Value};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Initializer name that loads a library with global symbols only
pub const GLOBAL_ONLY_INIT: &str = "*";

/// A pre-registered module
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadEntry {
    /// Ready-made exports
    Exports(ExportTable),
    /// Script source compiled by the host
    Source(String),
}

/// Where a resolved module came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Preload table
    Preload,
    /// Native library at this path
    Native(PathBuf),
    /// Script file at this path
    Script(PathBuf),
}

impl Origin {
    /// Filesystem path, if the module came from a file
    pub fn path(&self) -> Option<&Path> {
        match self {
            Origin::Preload => None,
            Origin::Native(path) | Origin::Script(path) => Some(path),
        }
    }
}

/// Result of resolving a module
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The exports object was populated in place; nothing left to evaluate
    ExportsReady(Origin),
    /// Source text the host must compile in the module's scope
    Source {
        /// Module source
        text: String,
        /// Where the source came from
        origin: Origin,
    },
}

impl Resolution {
    /// Where the module came from
    pub fn origin(&self) -> &Origin {
        match self {
            Resolution::ExportsReady(origin) | Resolution::Source { origin, .. } => origin,
        }
    }
}

/// Where a module would be found, without loading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// Preload table entry
    Preload,
    /// Native library candidate
    Native(PathBuf),
    /// Script source candidate
    Script(PathBuf),
}

/// `require()` resolution for one embedding session.
///
/// The registry owns the session's [`LibraryCache`]; dropping it unloads
/// every library still loaded.
pub struct ModuleRegistry {
    paths: SearchPaths,
    preload: FxHashMap<String, PreloadEntry>,
    cache: LibraryCache,
    fs: Box<dyn HostFs>,
}

impl ModuleRegistry {
    /// Registry using the OS loader and the real filesystem
    pub fn new(paths: SearchPaths) -> Self {
        Self::with_parts(paths, SystemLoader::new(), StdFs)
    }

    /// Registry with explicit collaborators
    pub fn with_parts(
        paths: SearchPaths,
        loader: impl PlatformLoader + 'static,
        fs: impl HostFs + 'static,
    ) -> Self {
        Self {
            paths,
            preload: FxHashMap::default(),
            cache: LibraryCache::new(loader),
            fs: Box::new(fs),
        }
    }

    /// Register ready-made exports under `id`
    pub fn preload_exports(&mut self, id: impl Into<String>, exports: ExportTable) {
        self.preload.insert(id.into(), PreloadEntry::Exports(exports));
    }

    /// Register script source under `id`
    pub fn preload_source(&mut self, id: impl Into<String>, source: impl Into<String>) {
        self.preload.insert(id.into(), PreloadEntry::Source(source.into()));
    }

    /// Whether `id` has a preload entry
    pub fn is_preloaded(&self, id: &str) -> bool {
        self.preload.contains_key(id)
    }

    /// Identifiers in the preload table, sorted
    pub fn preloaded_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.preload.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Active search paths
    pub fn search_paths(&self) -> &SearchPaths {
        &self.paths
    }

    /// The session's library cache
    pub fn library_cache(&self) -> &LibraryCache {
        &self.cache
    }

    /// Mutable access to the session's library cache
    pub fn library_cache_mut(&mut self) -> &mut LibraryCache {
        &mut self.cache
    }

    /// Resolve `id`, populating `exports` in place for preloaded tables and
    /// native modules.
    ///
    /// The native initializer runs on every call, even when its library is
    /// already cached; callers that want load-once semantics cache module
    /// objects by identifier (see [`crate::hook::ModuleSystem`]).
    pub fn resolve_module(&mut self, id: &str, exports: &mut ExportTable) -> Result<Resolution> {
        if id.is_empty() {
            return Err(ModuleError::invalid_identifier(id, "identifier is empty"));
        }

        if let Some(entry) = self.preload.get(id) {
            tracing::debug!("module '{}' served from preload table", id);
            return Ok(match entry {
                PreloadEntry::Exports(table) => {
                    exports.merge_missing(table.clone());
                    Resolution::ExportsReady(Origin::Preload)
                }
                PreloadEntry::Source(text) => Resolution::Source {
                    text: text.clone(),
                    origin: Origin::Preload,
                },
            });
        }

        let mut tried = Vec::new();

        match resolver::resolve(self.fs.as_ref(), &self.paths.native, id)? {
            Search::Found(path) => {
                let table = self.load_native(id, &path)?;
                exports.merge_missing(table);
                return Ok(Resolution::ExportsReady(Origin::Native(path)));
            }
            Search::NotFound(candidates) => tried.extend(candidates),
        }

        match resolver::resolve(self.fs.as_ref(), &self.paths.script, id)? {
            Search::Found(path) => {
                let text = self.read_source(id, &path)?;
                return Ok(Resolution::Source {
                    text,
                    origin: Origin::Script(path),
                });
            }
            Search::NotFound(candidates) => tried.extend(candidates),
        }

        Err(ModuleError::not_found(id, tried))
    }

    /// Find where `id` would be resolved from, without loading anything
    pub fn locate(&self, id: &str) -> Result<Located> {
        if id.is_empty() {
            return Err(ModuleError::invalid_identifier(id, "identifier is empty"));
        }
        if self.is_preloaded(id) {
            return Ok(Located::Preload);
        }

        let mut tried = Vec::new();
        match resolver::resolve(self.fs.as_ref(), &self.paths.native, id)? {
            Search::Found(path) => return Ok(Located::Native(path)),
            Search::NotFound(candidates) => tried.extend(candidates),
        }
        match resolver::resolve(self.fs.as_ref(), &self.paths.script, id)? {
            Search::Found(path) => return Ok(Located::Script(path)),
            Search::NotFound(candidates) => tried.extend(candidates),
        }
        Err(ModuleError::not_found(id, tried))
    }

    /// Load a library directly and return the named function without
    /// calling it.
    ///
    /// With [`GLOBAL_ONLY_INIT`] the library is loaded with global symbols
    /// and `None` is returned. The returned function keeps the library
    /// mapped, even past the registry itself.
    pub fn load_lib(&mut self, path: &Path, init: &str) -> Result<Option<NativeFunction>> {
        let module = path.display().to_string();

        if init == GLOBAL_ONLY_INIT {
            self.cache
                .get_or_load(path, LoadMode::Global)
                .map_err(|e| load_error(&module, path, e.message))?;
            return Ok(None);
        }

        self.lookup(&module, path, init, LoadMode::Local).map(Some)
    }

    /// Attach the library loaded from `path` to a script object's lifetime
    pub fn finalizer(&self, path: &Path) -> Option<LibraryFinalizer> {
        let handle = self.cache.get(path)?;
        self.cache.register_unload_on_finalize(&handle)
    }

    /// Unload libraries whose finalizers have run
    pub fn collect(&mut self) -> usize {
        self.cache.collect()
    }

    fn lookup(&mut self, module: &str, path: &Path, name: &str, mode: LoadMode) -> Result<NativeFunction> {
        let handle = self
            .cache
            .get_or_load(path, mode)
            .map_err(|e| load_error(module, path, e.message))?;

        handle.function(name, 0).map_err(|e| ModuleError::Symbol {
            module: module.to_string(),
            symbol: e.symbol,
            path: path.to_path_buf(),
            message: e.message,
        })
    }

    fn load_native(&mut self, id: &str, path: &Path) -> Result<ExportTable> {
        let symbol = symbol::build(id)?;
        let init = self.lookup(id, path, &symbol, LoadMode::Local)?;

        tracing::debug!("invoking {} from {}", symbol, path.display());
        // Functions in the returned table inherit the library reference
        match init.call(&[]) {
            Ok(Value::Object(table)) => Ok(table),
            Ok(other) => Err(ModuleError::initializer(
                id,
                format!("{} returned {} instead of an export table", symbol, other.type_of()),
            )),
            Err(reason) => Err(ModuleError::initializer(id, reason)),
        }
    }

    fn read_source(&self, id: &str, path: &Path) -> Result<String> {
        let read_error = |source| ModuleError::Read {
            module: id.to_string(),
            path: path.to_path_buf(),
            source,
        };
        let bytes = self.fs.read(path).map_err(read_error)?;
        String::from_utf8(bytes).map_err(|e| read_error(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("paths", &self.paths)
            .field("preload", &self.preloaded_ids())
            .field("cache", &self.cache)
            .finish()
    }
}

fn load_error(module: &str, path: &Path, message: String) -> ModuleError {
    ModuleError::Load {
        module: module.to_string(),
        path: path.to_path_buf(),
        message,
    }
}

/// A registry shared between threads.
///
/// Every resolution, including library loading and the initializer call,
/// runs under one mutex. A library is only closed once no function resolved
/// from it is left, so no thread can be calling into it at that point.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<ModuleRegistry>>,
}

impl SharedRegistry {
    /// Wrap a registry
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Resolve a module under the registry lock
    pub fn resolve_module(&self, id: &str, exports: &mut ExportTable) -> Result<Resolution> {
        self.inner.lock().resolve_module(id, exports)
    }

    /// Lock the registry for a longer sequence of calls
    pub fn lock(&self) -> MutexGuard<'_, ModuleRegistry> {
        self.inner.lock()
    }
}

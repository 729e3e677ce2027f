// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host engine integration.
//!
//! [`ModuleLoader::mod_search`] is the raw hook a scripting engine calls for
//! an unresolved identifier: it returns `undefined` when the exports object
//! was filled in place and a string when there is source to compile.
//!
//! [`ModuleSystem`] builds `require()` on top of it: one record per
//! identifier, cycles, and unloading.

use crate::cache::LibraryFinalizer;
use crate::error::{ModuleError, Result};
use crate::registry::{ModuleRegistry, Origin, Resolution};
use crate::value::{ExportTable, Value};
use rustc_hash::FxHashMap;

/// A scripting engine that can evaluate module source
pub trait ScriptEngine {
    /// Evaluate `source` as the body of module `id`, writing its exports.
    ///
    /// Nested `require()` calls go through `loader`.
    fn evaluate_module(
        &mut self,
        loader: &mut ModuleLoader,
        id: &str,
        source: &str,
        exports: &mut ExportTable,
    ) -> std::result::Result<(), String>;
}

#[derive(Debug)]
struct ModuleRecord {
    exports: ExportTable,
    origin: Option<Origin>,
    // Held only to be dropped or finalized with the record
    finalizer: Option<LibraryFinalizer>,
}

impl ModuleRecord {
    fn loading() -> Self {
        Self {
            exports: ExportTable::new(),
            origin: None,
            finalizer: None,
        }
    }
}

/// Loaded-module table for one session
#[derive(Debug)]
pub struct ModuleLoader {
    // Dropped before the registry so that finalizers queue their libraries
    // and the cache teardown unloads them.
    modules: FxHashMap<String, ModuleRecord>,
    registry: ModuleRegistry,
}

impl ModuleLoader {
    /// Create a loader over `registry`
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            modules: FxHashMap::default(),
            registry,
        }
    }

    /// Resolve `id` for the engine.
    ///
    /// Returns [`Value::Undefined`] when `exports` was populated in place,
    /// or [`Value::String`] with source the engine must compile.
    pub fn mod_search(&mut self, id: &str, exports: &mut ExportTable) -> Result<Value> {
        self.registry.resolve_module(id, exports).map(into_value)
    }

    /// Load `id` once and return its exports.
    ///
    /// A module that is still being evaluated (a require cycle) yields the
    /// exports it has published so far. A module that fails to load is
    /// forgotten so a later require retries it.
    pub fn require(&mut self, engine: &mut dyn ScriptEngine, id: &str) -> Result<ExportTable> {
        if let Some(record) = self.modules.get(id) {
            return Ok(record.exports.clone());
        }

        self.modules.insert(id.to_string(), ModuleRecord::loading());
        match self.instantiate(engine, id) {
            Ok(record) => {
                let exports = record.exports.clone();
                self.modules.insert(id.to_string(), record);
                Ok(exports)
            }
            Err(e) => {
                self.modules.remove(id);
                tracing::debug!("require('{}') failed: {}", id, e);
                Err(e)
            }
        }
    }

    fn instantiate(&mut self, engine: &mut dyn ScriptEngine, id: &str) -> Result<ModuleRecord> {
        let mut exports = ExportTable::new();
        let resolution = self.registry.resolve_module(id, &mut exports)?;
        let origin = resolution.origin().clone();

        if let Value::String(source) = into_value(resolution) {
            engine
                .evaluate_module(self, id, &source, &mut exports)
                .map_err(|message| ModuleError::Script {
                    module: id.to_string(),
                    message,
                })?;
        }

        let finalizer = match &origin {
            Origin::Native(path) => self.registry.finalizer(path),
            _ => None,
        };

        Ok(ModuleRecord {
            exports,
            origin: Some(origin),
            finalizer,
        })
    }

    /// Drop the record for `id` and unload its library.
    ///
    /// Export tables handed out earlier stay usable: a library whose
    /// functions are still referenced is closed when the last one drops.
    /// Returns `false` if `id` was not loaded.
    pub fn unload(&mut self, id: &str) -> bool {
        let Some(record) = self.modules.remove(id) else {
            return false;
        };
        if let Some(finalizer) = record.finalizer {
            finalizer.finalize();
        }
        self.registry.collect();
        true
    }

    /// Whether `id` has a record
    pub fn is_loaded(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Identifiers with a record, sorted
    pub fn loaded_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Where a loaded module came from; `None` while it is still loading
    pub fn origin(&self, id: &str) -> Option<&Origin> {
        self.modules.get(id)?.origin.as_ref()
    }

    /// The underlying registry
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Mutable access to the underlying registry
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }
}

/// `require()` for one engine and one session.
///
/// Dropping it unloads every library the session loaded.
pub struct ModuleSystem<E> {
    engine: E,
    loader: ModuleLoader,
}

impl<E: ScriptEngine> ModuleSystem<E> {
    /// Create a module system
    pub fn new(registry: ModuleRegistry, engine: E) -> Self {
        Self {
            engine,
            loader: ModuleLoader::new(registry),
        }
    }

    /// See [`ModuleLoader::require`]
    pub fn require(&mut self, id: &str) -> Result<ExportTable> {
        self.loader.require(&mut self.engine, id)
    }

    /// See [`ModuleLoader::mod_search`]
    pub fn mod_search(&mut self, id: &str, exports: &mut ExportTable) -> Result<Value> {
        self.loader.mod_search(id, exports)
    }

    /// See [`ModuleLoader::unload`]
    pub fn unload(&mut self, id: &str) -> bool {
        self.loader.unload(id)
    }

    /// See [`ModuleLoader::loaded_ids`]
    pub fn loaded_ids(&self) -> Vec<&str> {
        self.loader.loaded_ids()
    }

    /// The loaded-module table
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// The underlying registry
    pub fn registry(&self) -> &ModuleRegistry {
        self.loader.registry()
    }

    /// Mutable access to the underlying registry
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        self.loader.registry_mut()
    }

    /// The scripting engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the scripting engine
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

fn into_value(resolution: Resolution) -> Value {
    match resolution {
        Resolution::ExportsReady(_) => Value::Undefined,
        Resolution::Source { text, .. } => Value::String(text),
    }
}

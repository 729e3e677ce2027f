// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader for native modules linked into the host executable
//!
//! Libraries are registered under a path together with their exported
//! symbols. Search paths still have to point at something that exists on the
//! host filesystem for the registry to reach the loader.

use super::{LoadError, LoadMode, LoadedLibrary, PlatformLoader, SymbolError};
use crate::value::NativeFn;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type SymbolTable = Arc<FxHashMap<String, NativeFn>>;

#[derive(Default)]
struct Inner {
    libraries: RwLock<FxHashMap<PathBuf, SymbolTable>>,
    loads: AtomicUsize,
    closes: AtomicUsize,
}

/// In-process loader. Clones share registrations and counters.
#[derive(Clone, Default)]
pub struct StaticLoader {
    inner: Arc<Inner>,
}

impl StaticLoader {
    /// Create a loader with no libraries
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library at `path` exporting `symbols`
    pub fn add_library<'a>(
        &self,
        path: impl Into<PathBuf>,
        symbols: impl IntoIterator<Item = (&'a str, NativeFn)>,
    ) {
        let table = symbols
            .into_iter()
            .map(|(name, func)| (name.to_string(), func))
            .collect();
        self.inner.libraries.write().insert(path.into(), Arc::new(table));
    }

    /// Number of successful loads
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Number of closed libraries
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

impl PlatformLoader for StaticLoader {
    fn load(&mut self, path: &Path, _mode: LoadMode) -> Result<Box<dyn LoadedLibrary>, LoadError> {
        let symbols = self
            .inner
            .libraries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::new(path, "no statically linked library at this path"))?;
        self.inner.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticLibrary {
            path: path.to_path_buf(),
            symbols,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct StaticLibrary {
    path: PathBuf,
    symbols: SymbolTable,
    inner: Arc<Inner>,
}

impl LoadedLibrary for StaticLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Result<NativeFn, SymbolError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| SymbolError::new(name, "undefined symbol"))
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

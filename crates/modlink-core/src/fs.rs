// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Filesystem access used by module resolution

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The two filesystem primitives the module system needs.
pub trait HostFs: Send {
    /// Whether `path` exists
    fn exists(&self, path: &Path) -> bool;

    /// Read the whole file at `path`
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl HostFs for StdFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

#[derive(Default)]
struct MemoryFsInner {
    files: RwLock<FxHashMap<PathBuf, Vec<u8>>>,
    exists_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

/// In-memory filesystem for bundled modules.
///
/// Clones share the same files and call counters.
#[derive(Clone, Default)]
pub struct MemoryFs {
    inner: Arc<MemoryFsInner>,
}

impl MemoryFs {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.inner.files.write().insert(path.into(), contents.into());
    }

    /// Remove a file
    pub fn remove(&self, path: &Path) -> bool {
        self.inner.files.write().remove(path).is_some()
    }

    /// Number of `exists` calls so far
    pub fn exists_calls(&self) -> usize {
        self.inner.exists_calls.load(Ordering::Relaxed)
    }

    /// Number of `read` calls so far
    pub fn read_calls(&self) -> usize {
        self.inner.read_calls.load(Ordering::Relaxed)
    }
}

impl HostFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.files.read().contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_calls.fetch_add(1, Ordering::Relaxed);
        self.inner
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}

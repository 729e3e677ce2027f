// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! OS dynamic loading primitives
//!
//! Two backends share one contract and are selected at build time:
//!
//! - `unix`: `dlopen` / `dlsym` / `dlclose`
//! - `windows`: `LoadLibraryExW` / `GetProcAddress` / `FreeLibrary`
//!
//! [`StaticLoader`] serves modules compiled into the host instead.

use crate::value::NativeFn;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod static_loader;
#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

pub use static_loader::StaticLoader;

/// How a library's symbols are exposed to libraries loaded afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Symbols stay private to the library
    #[default]
    Local,
    /// Symbols become available to later loads
    Global,
}

/// The OS loader rejected a library
#[derive(Debug, Clone, Error)]
#[error("could not load library '{}': {message}", .path.display())]
pub struct LoadError {
    /// Path handed to the loader
    pub path: PathBuf,
    /// OS diagnostic
    pub message: String,
}

impl LoadError {
    /// Create a load error for `path`
    pub fn new(path: &Path, message: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// A symbol could not be resolved in a loaded library
#[derive(Debug, Clone, Error)]
#[error("could not find symbol '{symbol}': {message}")]
pub struct SymbolError {
    /// Symbol that was looked up
    pub symbol: String,
    /// OS diagnostic
    pub message: String,
}

impl SymbolError {
    /// Create a symbol error for `symbol`
    pub fn new(symbol: &str, message: impl ToString) -> Self {
        Self {
            symbol: symbol.to_string(),
            message: message.to_string(),
        }
    }
}

/// An OS library mapping.
pub trait LoadedLibrary: Send + Sync {
    /// Path the library was loaded from
    fn path(&self) -> &Path;

    /// Resolve an exported native function.
    ///
    /// The returned pointer is only valid while the library stays loaded.
    fn symbol(&self, name: &str) -> Result<NativeFn, SymbolError>;

    /// Unload the library
    fn close(self: Box<Self>) -> Result<(), String>;
}

/// Loads shared libraries from the filesystem.
pub trait PlatformLoader: Send {
    /// Map the library at `path` into the process
    fn load(&mut self, path: &Path, mode: LoadMode) -> Result<Box<dyn LoadedLibrary>, LoadError>;
}

/// Loader backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl SystemLoader {
    /// Create a new system loader
    pub fn new() -> Self {
        Self
    }
}

impl PlatformLoader for SystemLoader {
    fn load(&mut self, path: &Path, mode: LoadMode) -> Result<Box<dyn LoadedLibrary>, LoadError> {
        tracing::debug!("loading native library {} ({:?})", path.display(), mode);
        let lib = sys::open(path, mode)?;
        Ok(Box::new(lib))
    }
}

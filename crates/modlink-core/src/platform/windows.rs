// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Win32 backend

use super::{LoadError, LoadMode, LoadedLibrary, SymbolError};
use crate::value::NativeFn;
use libloading::os::windows::Library;
use std::path::{Path, PathBuf};

/// Extra flags for `LoadLibraryExW`
const LOAD_FLAGS: u32 = 0;

pub(super) struct WindowsLibrary {
    lib: Library,
    path: PathBuf,
}

pub(super) fn open(path: &Path, _mode: LoadMode) -> Result<WindowsLibrary, LoadError> {
    // Exported symbols are process-global on Windows, so the mode is moot.
    // SAFETY: loading runs DllMain; trusting the module search path is the
    // contract of native modules.
    let lib = unsafe { Library::load_with_flags(path, LOAD_FLAGS) }
        .map_err(|e| LoadError::new(path, e))?;

    Ok(WindowsLibrary {
        lib,
        path: path.to_path_buf(),
    })
}

impl LoadedLibrary for WindowsLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Result<NativeFn, SymbolError> {
        // SAFETY: exported initializers and module functions use the native
        // call convention by contract.
        let sym = unsafe { self.lib.get::<NativeFn>(name.as_bytes()) }
            .map_err(|e| SymbolError::new(name, e))?;
        Ok(*sym)
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        self.lib.close().map_err(|e| e.to_string())
    }
}

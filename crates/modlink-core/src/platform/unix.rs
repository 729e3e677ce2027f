// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! dlfcn backend

use super::{LoadError, LoadMode, LoadedLibrary, SymbolError};
use crate::value::NativeFn;
use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LOCAL, RTLD_NOW};
use std::path::{Path, PathBuf};

pub(super) struct UnixLibrary {
    lib: Library,
    path: PathBuf,
}

pub(super) fn open(path: &Path, mode: LoadMode) -> Result<UnixLibrary, LoadError> {
    let visibility = match mode {
        LoadMode::Local => RTLD_LOCAL,
        LoadMode::Global => RTLD_GLOBAL,
    };

    // SAFETY: loading runs the library's constructors; trusting the module
    // search path is the contract of native modules.
    let lib = unsafe { Library::open(Some(path), RTLD_NOW | visibility) }
        .map_err(|e| LoadError::new(path, e))?;

    Ok(UnixLibrary {
        lib,
        path: path.to_path_buf(),
    })
}

impl LoadedLibrary for UnixLibrary {
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

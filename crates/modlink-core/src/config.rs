// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Search path configuration.
//!
//! Native and script search paths default to current-directory templates and
//! can be overridden through [`CPATH_ENV`] and [`PATH_ENV`]. The environment
//! is read once per process; later changes to it are not observed.

use crate::resolver::{PATH_SEP, TemplateList};
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

/// Environment variable overriding the native library search path
pub const CPATH_ENV: &str = "MODLINK_CPATH";

/// Environment variable overriding the script search path
pub const PATH_ENV: &str = "MODLINK_PATH";

/// Default native library search path
#[cfg(windows)]
pub const DEFAULT_CPATH: &str = "./?.dll;!/?.dll";
/// Default native library search path. `lib?` matches the file names
/// cargo gives `cdylib` crates.
#[cfg(target_os = "macos")]
pub const DEFAULT_CPATH: &str = "./?.dylib;./lib?.dylib;./?.so;./lib/?.dylib";
/// Default native library search path. `lib?` matches the file names
/// cargo gives `cdylib` crates.
#[cfg(all(unix, not(target_os = "macos")))]
pub const DEFAULT_CPATH: &str = "./?.so;./lib?.so;./lib/?.so";

/// Default script search path
pub const DEFAULT_PATH: &str = "./?.js;./?/index.js;./lib/?.js";

/// Replaced by the executable's directory on Windows
pub const EXEC_DIR_MARK: char = '!';

struct EnvSnapshot {
    cpath: Option<String>,
    path: Option<String>,
}

static ENV: LazyLock<EnvSnapshot> = LazyLock::new(|| EnvSnapshot {
    cpath: std::env::var(CPATH_ENV).ok(),
    path: std::env::var(PATH_ENV).ok(),
});

/// Native and script search paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPaths {
    /// Templates for native libraries
    pub native: TemplateList,
    /// Templates for script sources
    pub script: TemplateList,
}

impl SearchPaths {
    /// Create search paths from explicit template lists
    pub fn new(native: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            native: TemplateList::new(native),
            script: TemplateList::new(script),
        }
    }

    /// Search paths from the process environment, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Self {
        Self::from_env_or(None, None)
    }

    /// Like [`SearchPaths::from_env`], with explicit overrides taking
    /// precedence over the environment
    pub fn from_env_or(cpath: Option<&str>, path: Option<&str>) -> Self {
        Self::from_overrides(cpath.or(ENV.cpath.as_deref()), path.or(ENV.path.as_deref()))
    }

    /// Apply override strings the way environment overrides are applied.
    ///
    /// A `;;` inside an override is replaced by the default list.
    pub fn from_overrides(cpath: Option<&str>, path: Option<&str>) -> Self {
        let native = cpath.map_or_else(|| DEFAULT_CPATH.to_string(), |v| expand_defaults(v, DEFAULT_CPATH));
        let script = path.map_or_else(|| DEFAULT_PATH.to_string(), |v| expand_defaults(v, DEFAULT_PATH));
        Self::new(platform_expand(native), platform_expand(script))
    }

    /// Replace the native search path
    pub fn with_native(mut self, templates: impl Into<String>) -> Self {
        self.native = TemplateList::new(templates);
        self
    }

    /// Replace the script search path
    pub fn with_script(mut self, templates: impl Into<String>) -> Self {
        self.script = TemplateList::new(templates);
        self
    }
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self::from_overrides(None, None)
    }
}

/// Replace every `;;` in `value` with `;<default>;`
pub fn expand_defaults(value: &str, default: &str) -> String {
    let doubled = format!("{PATH_SEP}{PATH_SEP}");
    value.replace(&doubled, &format!("{PATH_SEP}{default}{PATH_SEP}"))
}

/// Replace every [`EXEC_DIR_MARK`] with `exe_dir`
pub fn expand_exec_dir(value: &str, exe_dir: &Path) -> String {
    value.replace(EXEC_DIR_MARK, &exe_dir.to_string_lossy())
}

#[cfg(windows)]
fn platform_expand(value: String) -> String {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    match exe_dir {
        Some(dir) => expand_exec_dir(&value, &dir),
        None => {
            tracing::warn!("cannot locate executable directory, '!' left in search path");
            value
        }
    }
}

#[cfg(not(windows))]
fn platform_expand(value: String) -> String {
    value
}

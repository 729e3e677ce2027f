// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # modlink-core
//!
//! `require()`-style module resolution and native library loading for
//! embedded script runtimes.
//!
//! A module identifier is resolved, in order, against:
//!
//! - a preload table of ready-made exports or bundled sources
//! - the native search path, loading a shared library and calling its
//!   `dukopen_<id>` initializer
//! - the script search path, returning source for the host engine
//!
//! Each native library is loaded at most once per session and unloaded
//! exactly once, after its module is unloaded or the session is dropped and
//! no function exported from it is left.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modlink_core::{ExportTable, ModuleRegistry, Resolution, SearchPaths};
//!
//! let mut registry = ModuleRegistry::new(SearchPaths::from_env());
//! let mut exports = ExportTable::new();
//! match registry.resolve_module("greet", &mut exports)? {
//!     Resolution::ExportsReady(origin) => println!("loaded from {:?}", origin),
//!     Resolution::Source { text, .. } => println!("compile {} bytes", text.len()),
//! }
//! # Ok::<(), modlink_core::ModuleError>(())
//! ```
//!
//! ## Search paths
//!
//! Templates are `;` separated and `?` is replaced by the identifier, with
//! `.` turned into a directory separator:
//!
//! ```bash
//! MODLINK_CPATH="./?.so;/usr/lib/modlink/?.so"
//! MODLINK_PATH="./?.js;;"   # ";;" appends the default list
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod hook;
pub mod platform;
pub mod registry;
pub mod resolver;
pub mod symbol;
pub mod value;

// Re-exports
pub use cache::{LibraryCache, LibraryFinalizer, LibraryHandle};
pub use config::SearchPaths;
pub use error::{ModuleError, Result};
pub use fs::{HostFs, MemoryFs, StdFs};
pub use hook::{ModuleLoader, ModuleSystem, ScriptEngine};
pub use platform::{
    LoadError, LoadMode, LoadedLibrary, PlatformLoader, StaticLoader, SymbolError, SystemLoader,
};
pub use registry::{Located, ModuleRegistry, Origin, PreloadEntry, Resolution, SharedRegistry};
pub use resolver::TemplateList;
pub use value::{
    Context, ExportTable, NativeFn, NativeFunction, RET_ERROR, RET_UNDEFINED, RET_VALUE, VARARGS,
    Value,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for module resolution and native library loading

use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for module system operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors raised while resolving or loading a module.
///
/// Every variant surfaces to script code as one catchable exception. The
/// failing module identifier is available through [`ModuleError::module`].
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The shared library exists but the OS loader rejected it
    #[error("error loading module '{module}' from file '{}': {message}", .path.display())]
    Load {
        /// Module identifier
        module: String,
        /// Library path handed to the loader
        path: PathBuf,
        /// Diagnostic reported by the OS loader
        message: String,
    },

    /// The library loaded but does not export the initializer
    #[error("error loading module '{module}' from file '{}': missing symbol '{symbol}': {message}", .path.display())]
    Symbol {
        /// Module identifier
        module: String,
        /// Symbol that was looked up
        symbol: String,
        /// Library path
        path: PathBuf,
        /// Diagnostic reported by the OS loader
        message: String,
    },

    /// No preload entry and no search path candidate
    #[error("module '{module}' not found:{}", format_tried(.tried))]
    NotFound {
        /// Module identifier
        module: String,
        /// Every candidate that failed the existence check
        tried: Vec<PathBuf>,
    },

    /// Malformed module identifier
    #[error("invalid module identifier '{module}': {reason}")]
    InvalidIdentifier {
        /// Module identifier
        module: String,
        /// Reason for rejection
        reason: String,
    },

    /// Path template without a substitution marker
    #[error("invalid path template '{template}' while resolving '{module}': missing '?' marker")]
    InvalidTemplate {
        /// Module identifier being resolved
        module: String,
        /// Offending template
        template: String,
    },

    /// The initializer ran but did not produce an export table
    #[error("initializer for module '{module}' failed: {reason}")]
    Initializer {
        /// Module identifier
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// Script source could not be read
    #[error("cannot read module '{module}' from file '{}': {source}", .path.display())]
    Read {
        /// Module identifier
        module: String,
        /// Source file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The host engine failed to evaluate module source
    #[error("error evaluating module '{module}': {message}")]
    Script {
        /// Module identifier
        module: String,
        /// Engine error message
        message: String,
    },
}

impl ModuleError {
    /// The identifier of the module whose resolution failed
    pub fn module(&self) -> &str {
        match self {
            Self::Load { module, .. }
            | Self::Symbol { module, .. }
            | Self::NotFound { module, .. }
            | Self::InvalidIdentifier { module, .. }
            | Self::InvalidTemplate { module, .. }
            | Self::Initializer { module, .. }
            | Self::Read { module, .. }
            | Self::Script { module, .. } => module,
        }
    }

    /// Create a module not found error
    pub fn not_found(module: impl Into<String>, tried: Vec<PathBuf>) -> Self {
        Self::NotFound {
            module: module.into(),
            tried,
        }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create an initializer error
    pub fn initializer(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initializer {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

fn format_tried(tried: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in tried {
        let _ = write!(out, "\n\tno file '{}'", path.display());
    }
    out
}

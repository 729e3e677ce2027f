// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Path template search
//!
//! A search path is a `;` separated list of templates such as
//! `./?.so;./lib/?.so`. Each `?` is replaced by the module identifier with
//! submodule dots turned into directory separators, and the first candidate
//! that exists wins.

use crate::error::{ModuleError, Result};
use crate::fs::HostFs;
use crate::symbol::SUBMODULE_SEP;
use serde::Serialize;
use std::fmt;
use std::path::{MAIN_SEPARATOR_STR, PathBuf};

/// Separates templates in a search path
pub const PATH_SEP: char = ';';

/// Substitution marker inside a template
pub const PATH_MARK: char = '?';

/// An ordered list of path templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateList(String);

impl TemplateList {
    /// Wrap a `;` separated template string. Nothing is validated until the
    /// list is used.
    pub fn new(templates: impl Into<String>) -> Self {
        Self(templates.into())
    }

    /// The raw template string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty templates in search order
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEP).filter(|t| !t.is_empty())
    }
}

impl fmt::Display for TemplateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a path search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Search {
    /// First existing candidate
    Found(PathBuf),
    /// Nothing exists; every candidate that was checked
    NotFound(Vec<PathBuf>),
}

/// Turn submodule separators into directory separators
pub fn module_path_name(id: &str) -> String {
    id.replace(SUBMODULE_SEP, MAIN_SEPARATOR_STR)
}

/// Search `templates` for module `id`.
///
/// The identifier is substituted verbatim apart from separator
/// normalization; slashes and other path syntax are not filtered.
pub fn resolve(fs: &dyn HostFs, templates: &TemplateList, id: &str) -> Result<Search> {
    let name = module_path_name(id);
    let mut tried = Vec::new();

    for template in templates.templates() {
        if !template.contains(PATH_MARK) {
            return Err(ModuleError::InvalidTemplate {
                module: id.to_string(),
                template: template.to_string(),
            });
        }

        let candidate = PathBuf::from(template.replace(PATH_MARK, &name));
        if fs.exists(&candidate) {
            tracing::debug!("module '{}' resolved to {}", id, candidate.display());
            return Ok(Search::Found(candidate));
        }
        tried.push(candidate);
    }

    Ok(Search::NotFound(tried))
}

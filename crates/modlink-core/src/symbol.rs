// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Initializer symbol names

use crate::error::{ModuleError, Result};

/// Prefix of every exported module initializer
pub const INIT_PREFIX: &str = "dukopen_";

/// Separator between submodule names in a module identifier
pub const SUBMODULE_SEP: char = '.';

/// Replacement for [`SUBMODULE_SEP`] inside symbol names
pub const SYMBOL_SEP: char = '_';

/// Check that `id` is a well-formed module identifier.
///
/// Identifiers are dot-separated segments of ASCII letters and digits.
/// `_` is rejected so that `a.b` and `a_b` never map to the same symbol.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ModuleError::invalid_identifier(id, "identifier is empty"));
    }

    for segment in id.split(SUBMODULE_SEP) {
        if segment.is_empty() {
            return Err(ModuleError::invalid_identifier(id, "empty submodule name"));
        }
        if let Some(c) = segment.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(ModuleError::invalid_identifier(
                id,
                format!("character {:?} is not allowed in a native module name", c),
            ));
        }
    }

    Ok(())
}

/// Build the initializer symbol a native library must export for `id`.
///
/// ```
/// use modlink_core::symbol::build;
///
/// assert_eq!(build("greet").unwrap(), "dukopen_greet");
/// assert_eq!(build("a.b.c").unwrap(), "dukopen_a_b_c");
/// ```
pub fn build(id: &str) -> Result<String> {
    validate_identifier(id)?;

    let mut symbol = String::with_capacity(INIT_PREFIX.len() + id.len());
    symbol.push_str(INIT_PREFIX);
    symbol.extend(id.chars().map(|c| if c == SUBMODULE_SEP { SYMBOL_SEP } else { c }));
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(build("fs").unwrap(), build("fs").unwrap());
        assert_eq!(build("fs").unwrap(), "dukopen_fs");
    }

    #[test]
    fn test_build_distinguishes_submodules() {
        assert_ne!(build("a.b").unwrap(), build("ab").unwrap());
        assert_eq!(build("a.b").unwrap(), "dukopen_a_b");
    }

    #[test]
    fn test_build_rejects_bad_identifiers() {
        for id in ["", ".a", "a.", "a..b", "a_b", "a-b", "../x", "a/b"] {
            let err = build(id).unwrap_err();
            assert!(
                matches!(err, ModuleError::InvalidIdentifier { .. }),
                "{:?} should be rejected",
                id
            );
            assert_eq!(err.module(), id);
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Terminal and JSON rendering shared by the CLI and the shell

use modlink_core::registry::{Located, Origin};
use modlink_core::{ExportTable, Value};
use owo_colors::OwoColorize;
use serde_json::json;

/// Format a value for display with syntax coloring
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".blue().dimmed().to_string(),
        Value::Null => "null".blue().to_string(),
        Value::Boolean(b) => b.to_string().yellow().to_string(),
        Value::Number(n) => {
            if n.is_nan() {
                "NaN".yellow().to_string()
            } else if n.is_infinite() {
                if *n > 0.0 {
                    "Infinity".yellow().to_string()
                } else {
                    "-Infinity".yellow().to_string()
                }
            } else {
                n.to_string().yellow().to_string()
            }
        }
        Value::String(s) => format!("'{}'", s).green().to_string(),
        Value::Object(table) => format!("[object Object] ({} keys)", table.len()).cyan().to_string(),
        Value::Function(f) => format!("[Function] ({} args)", nargs_label(f.nargs()))
            .magenta()
            .to_string(),
    }
}

fn nargs_label(nargs: i32) -> String {
    if nargs < 0 {
        "variadic".to_string()
    } else {
        nargs.to_string()
    }
}

/// Print every export as `key: value`, indented
pub fn print_exports(exports: &ExportTable) {
    if exports.is_empty() {
        println!("  {}", "(no exports)".dimmed());
        return;
    }
    for (key, value) in exports.iter() {
        println!("  {}: {}", key.white().bold(), format_value(value));
    }
}

/// Short colored description of an origin
pub fn format_origin(origin: &Origin) -> String {
    match origin {
        Origin::Preload => "preload".magenta().to_string(),
        Origin::Native(path) => format!("{} {}", "native".yellow(), path.display()),
        Origin::Script(path) => format!("{} {}", "script".green(), path.display()),
    }
}

/// Short colored description of a located module
pub fn format_located(located: &Located) -> String {
    match located {
        Located::Preload => format_origin(&Origin::Preload),
        Located::Native(path) => format_origin(&Origin::Native(path.clone())),
        Located::Script(path) => format_origin(&Origin::Script(path.clone())),
    }
}

/// JSON form of a value. Functions and non-finite numbers become strings.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => json!(b),
        Value::Number(n) if n.is_finite() => json!(n),
        Value::Number(n) => json!(n.to_string()),
        Value::String(s) => json!(s),
        Value::Function(f) => json!(format!("[Function] ({} args)", nargs_label(f.nargs()))),
        Value::Object(table) => exports_to_json(table),
    }
}

/// JSON object for an export table
pub fn exports_to_json(exports: &ExportTable) -> serde_json::Value {
    serde_json::Value::Object(
        exports
            .iter()
            .map(|(key, value)| (key.to_string(), value_to_json(value)))
            .collect(),
    )
}

/// JSON object describing an origin
pub fn origin_to_json(origin: &Origin) -> serde_json::Value {
    match origin {
        Origin::Preload => json!({ "kind": "preload" }),
        Origin::Native(path) => json!({ "kind": "native", "path": path }),
        Origin::Script(path) => json!({ "kind": "script", "path": path }),
    }
}

/// JSON object describing a located module
pub fn located_to_json(located: &Located) -> serde_json::Value {
    match located {
        Located::Preload => json!({ "kind": "preload" }),
        Located::Native(path) => json!({ "kind": "native", "path": path }),
        Located::Script(path) => json!({ "kind": "script", "path": path }),
    }
}

/// Print an error, coloring the leading label
pub fn print_error(error: &dyn std::fmt::Display) {
    let error_str = error.to_string();
    let mut lines = error_str.lines();
    if let Some(first) = lines.next() {
        eprintln!("{}: {}", "Error".red().bold(), first);
    }
    for line in lines {
        eprintln!("{}", line.dimmed());
    }
}

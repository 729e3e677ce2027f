// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! modlink - inspect module resolution and native library loading
//!
//! ## Usage
//!
//! ```bash
//! modlink resolve greet fs.path      # where would these come from?
//! modlink require greet              # load and list exports
//! modlink load ./greet.so dukopen_greet --call
//! modlink --cpath "./build/?.so;;" paths
//! modlink                            # interactive shell
//! ```

mod display;
mod repl;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use modlink_core::{ExportTable, ModuleRegistry, Resolution, SearchPaths, VERSION, symbol};
use owo_colors::OwoColorize;
use serde_json::json;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "modlink",
    about = "Inspect require()-style module resolution and native library loading",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Native library search path (overrides MODLINK_CPATH, ";;" = defaults)
    #[arg(long, global = true, value_name = "TEMPLATES")]
    cpath: Option<String>,

    /// Script search path (overrides MODLINK_PATH, ";;" = defaults)
    #[arg(long, global = true, value_name = "TEMPLATES")]
    path: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show where modules would be loaded from, without loading them
    Resolve {
        /// Module identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Resolve a module, run its initializer and list its exports
    Require {
        /// Module identifier
        id: String,

        /// Print the source of script modules
        #[arg(long)]
        source: bool,
    },

    /// Load a library directly, bypassing the search path
    Load {
        /// Library path
        #[arg(id = "lib_path", value_name = "PATH")]
        path: PathBuf,

        /// Function to look up, or "*" to only load the library globally
        #[arg(default_value = "*")]
        init: String,

        /// Call the function with no arguments and print the result
        #[arg(long)]
        call: bool,
    },

    /// Print the initializer symbol for module identifiers
    Symbol {
        /// Module identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Print the active search paths
    Paths,

    /// Start the interactive shell
    #[command(alias = "shell")]
    Repl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "modlink=debug,modlink_core=debug"
    } else {
        "modlink=warn,modlink_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths = SearchPaths::from_env_or(cli.cpath.as_deref(), cli.path.as_deref());

    let result = match cli.command {
        Some(Command::Resolve { ids }) => resolve(paths, &ids, cli.json),
        Some(Command::Require { id, source }) => require(paths, &id, source, cli.json),
        Some(Command::Load { path, init, call }) => load(paths, path, &init, call, cli.json),
        Some(Command::Symbol { ids }) => symbols(&ids, cli.json),
        Some(Command::Paths) => print_paths(&paths, cli.json),
        Some(Command::Repl) => run_repl(paths),
        None if atty::is(atty::Stream::Stdin) => run_repl(paths),
        // Identifiers piped on stdin, one per line
        None => resolve_stdin(paths, cli.json),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            display::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Start the interactive shell
fn run_repl(paths: SearchPaths) -> anyhow::Result<bool> {
    let mut repl = repl::Repl::new(ModuleRegistry::new(paths)).context("failed to initialize shell")?;
    repl.run()?;
    Ok(true)
}

fn resolve(paths: SearchPaths, ids: &[String], as_json: bool) -> anyhow::Result<bool> {
    let registry = ModuleRegistry::new(paths);
    let mut ok = true;
    let mut report = Vec::new();

    for id in ids {
        match registry.locate(id) {
            Ok(located) => {
                if as_json {
                    report.push(json!({ "id": id, "found": display::located_to_json(&located) }));
                } else {
                    println!("{} {}", id.white().bold(), display::format_located(&located));
                }
            }
            Err(e) => {
                ok = false;
                if as_json {
                    report.push(json!({ "id": id, "error": e.to_string() }));
                } else {
                    display::print_error(&e);
                }
            }
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(ok)
}

fn resolve_stdin(paths: SearchPaths, as_json: bool) -> anyhow::Result<bool> {
    let ids = std::io::stdin()
        .lock()
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
        .collect::<std::io::Result<Vec<_>>>()
        .context("failed to read identifiers from stdin")?;
    resolve(paths, &ids, as_json)
}

fn require(paths: SearchPaths, id: &str, show_source: bool, as_json: bool) -> anyhow::Result<bool> {
    let mut registry = ModuleRegistry::new(paths);
    let mut exports = ExportTable::new();
    let resolution = registry.resolve_module(id, &mut exports)?;

    if as_json {
        let mut report = json!({
            "id": id,
            "origin": display::origin_to_json(resolution.origin()),
            "exports": display::exports_to_json(&exports),
        });
        if let Resolution::Source { text, .. } = &resolution {
            report["source"] = json!(text);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    println!("{} {}", id.white().bold(), display::format_origin(resolution.origin()));
    match resolution {
        Resolution::ExportsReady(_) => display::print_exports(&exports),
        Resolution::Source { text, .. } if show_source => println!("{}", text),
        Resolution::Source { text, .. } => {
            println!("  {}", format!("{} bytes of source, not evaluated", text.len()).dimmed())
        }
    }
    Ok(true)
}

fn load(paths: SearchPaths, path: PathBuf, init: &str, call: bool, as_json: bool) -> anyhow::Result<bool> {
    let mut registry = ModuleRegistry::new(paths);
    let func = registry.load_lib(&path, init)?;

    let result = match (&func, call) {
        (Some(func), true) => Some(func.call(&[]).map_err(|e| anyhow::anyhow!("{} threw: {}", init, e))?),
        _ => None,
    };

    if as_json {
        let report = json!({
            "path": path,
            "init": init,
            "function": func.map(|f| json!({ "nargs": f.nargs() })),
            "result": result.as_ref().map(display::value_to_json),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    match (func, result) {
        (None, _) => println!("{} loaded with global symbols", path.display().white().bold()),
        (Some(_), None) => println!("{} exports {}", path.display().white().bold(), init.cyan()),
        (Some(_), Some(modlink_core::Value::Object(exports))) => {
            println!("{} {}", init.cyan(), "returned".dimmed());
            display::print_exports(&exports);
        }
        (Some(_), Some(value)) => println!("{} {}", init.cyan(), display::format_value(&value)),
    }
    Ok(true)
}

fn symbols(ids: &[String], as_json: bool) -> anyhow::Result<bool> {
    let mut ok = true;
    let mut report = serde_json::Map::new();

    for id in ids {
        match symbol::build(id) {
            Ok(name) if as_json => {
                report.insert(id.clone(), json!(name));
            }
            Ok(name) => println!("{} {}", id.white().bold(), name.cyan()),
            Err(e) => {
                ok = false;
                if as_json {
                    report.insert(id.clone(), json!({ "error": e.to_string() }));
                } else {
                    display::print_error(&e);
                }
            }
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(ok)
}

fn print_paths(paths: &SearchPaths, as_json: bool) -> anyhow::Result<bool> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(paths)?);
        return Ok(true);
    }

    println!("{}", "native:".white().bold());
    for template in paths.native.templates() {
        println!("  {}", template.yellow());
    }
    println!("{}", "script:".white().bold());
    for template in paths.script.templates() {
        println!("  {}", template.green());
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["modlink", "resolve", "greet", "--cpath", "./?.so", "--json"]).unwrap();
        assert_eq!(cli.cpath.as_deref(), Some("./?.so"));
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Command::Resolve { ids }) if ids == ["greet"]));
    }

    #[test]
    fn test_load_defaults_to_global() {
        let cli = Cli::try_parse_from(["modlink", "load", "./greet.so"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Load { init, call: false, .. }) if init == "*"));
    }
}

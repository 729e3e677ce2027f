// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive shell for exploring module resolution.
//!
//! A bare identifier requires that module. Script modules are resolved and
//! read but not evaluated; their exports stay empty.

use crate::display::{format_located, format_origin, format_value, print_error, print_exports};
use modlink_core::{ExportTable, ModuleLoader, ModuleRegistry, ModuleSystem, ScriptEngine, Value, symbol};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Shell configuration constants
const HISTORY_FILE: &str = ".modlink_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// Shell commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Require,
    Resolve,
    Symbol,
    Call,
    Unload,
    Loaded,
    Cache,
    Paths,
}

impl ReplCommand {
    /// Parse a shell command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let cmd = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "clear" | "cls" => ReplCommand::Clear,
            "version" | "v" => ReplCommand::Version,
            "require" | "r" => ReplCommand::Require,
            "resolve" | "which" => ReplCommand::Resolve,
            "symbol" => ReplCommand::Symbol,
            "call" => ReplCommand::Call,
            "unload" => ReplCommand::Unload,
            "loaded" | "ls" => ReplCommand::Loaded,
            "cache" => ReplCommand::Cache,
            "paths" => ReplCommand::Paths,
            _ => return None,
        };
        Some((cmd, arg))
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the shell"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".require <id>", "Load a module and list its exports"),
            (".resolve <id>", "Show where a module would come from"),
            (".symbol <id>", "Show the initializer symbol for a module"),
            (".call <id> <fn> [args]", "Call an exported native function"),
            (".unload <id>", "Forget a module and unload its library"),
            (".loaded", "List required modules"),
            (".cache", "List loaded native libraries"),
            (".paths", "Show the search paths"),
        ]
    }
}

/// Completion over command names and required module identifiers
#[derive(Default)]
struct ModlinkHelper {
    words: Vec<String>,
}

impl ModlinkHelper {
    fn new() -> Self {
        let words = ReplCommand::all_commands()
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next())
            .map(String::from)
            .collect();
        Self { words }
    }

    fn remember(&mut self, id: &str) {
        if !self.words.iter().any(|w| w == id) {
            self.words.push(id.to_string());
        }
    }
}

/// Start of the word ending at `pos`
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for ModlinkHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for ModlinkHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() || !line.starts_with('.') || line.contains(char::is_whitespace) {
            return None;
        }

        self.words
            .iter()
            .find(|w| w.starts_with(line) && w.len() > line.len())
            .map(|w| w[line.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for ModlinkHelper {}

impl Validator for ModlinkHelper {}

impl Helper for ModlinkHelper {}

/// Engine that records script sources instead of evaluating them
#[derive(Default)]
struct SourceRecorder {
    sources: BTreeMap<String, usize>,
}

impl ScriptEngine for SourceRecorder {
    fn evaluate_module(
        &mut self,
        _loader: &mut ModuleLoader,
        id: &str,
        source: &str,
        _exports: &mut ExportTable,
    ) -> Result<(), String> {
        self.sources.insert(id.to_string(), source.len());
        Ok(())
    }
}

/// The interactive module shell
pub struct Repl {
    modules: ModuleSystem<SourceRecorder>,
    editor: Editor<ModlinkHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new shell over `registry`
    pub fn new(registry: ModuleRegistry) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(ModlinkHelper::new()));

        // Determine history file path
        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modlink")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let _ = editor.load_history(&history_path);

        Ok(Self {
            modules: ModuleSystem::new(registry, SourceRecorder::default()),
            editor,
            history_path,
        })
    }

    /// Run the shell main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "modlink>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    if trimmed.starts_with('.') {
                        eprintln!(
                            "{}: unknown command {} (try {})",
                            "Error".red().bold(),
                            trimmed.cyan(),
                            ".help".cyan()
                        );
                        continue;
                    }

                    self.require(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "modlink".bright_cyan().bold(),
            "v".dimmed(),
            modlink_core::VERSION.bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type a module identifier to require it, or".dimmed(),
            ".help".cyan(),
            "for commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        let needs_arg = matches!(
            cmd,
            ReplCommand::Require
                | ReplCommand::Resolve
                | ReplCommand::Symbol
                | ReplCommand::Call
                | ReplCommand::Unload
        );
        let arg = match arg {
            None if needs_arg => {
                eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    format!(".{:?}", cmd).to_lowercase().cyan(),
                    "requires an argument".dimmed()
                );
                return CommandResult::Continue;
            }
            arg => arg.unwrap_or_default(),
        };

        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{}: {}", "modlink".bright_cyan().bold(), modlink_core::VERSION.yellow())
            }
            ReplCommand::Require => self.require(arg),
            ReplCommand::Resolve => match self.modules.registry().locate(arg) {
                Ok(located) => println!("{} {}", arg.white().bold(), format_located(&located)),
                Err(e) => print_error(&e),
            },
            ReplCommand::Symbol => match symbol::build(arg) {
                Ok(name) => println!("{}", name.cyan()),
                Err(e) => print_error(&e),
            },
            ReplCommand::Call => self.call(arg),
            ReplCommand::Unload => {
                if self.modules.unload(arg) {
                    println!("{} {}", "unloaded".dimmed(), arg.white().bold());
                } else {
                    eprintln!("{}: '{}' is not loaded", "Error".red().bold(), arg);
                }
            }
            ReplCommand::Loaded => self.print_loaded(),
            ReplCommand::Cache => self.print_cache(),
            ReplCommand::Paths => {
                let paths = self.modules.registry().search_paths();
                println!("{} {}", "native:".white().bold(), paths.native.yellow());
                println!("{} {}", "script:".white().bold(), paths.script.green());
            }
        }
        CommandResult::Continue
    }

    fn require(&mut self, id: &str) {
        match self.modules.require(id) {
            Ok(exports) => {
                if let Some(origin) = self.modules.loader().origin(id) {
                    println!("{} {}", id.white().bold(), format_origin(origin));
                }
                if let Some(len) = self.modules.engine().sources.get(id) {
                    println!("  {}", format!("{} bytes of source, not evaluated", len).dimmed());
                } else {
                    print_exports(&exports);
                }
                if let Some(helper) = self.editor.helper_mut() {
                    helper.remember(id);
                }
            }
            Err(e) => print_error(&e),
        }
    }

    fn call(&mut self, arg: &str) {
        let mut words = arg.split_whitespace();
        let (Some(id), Some(name)) = (words.next(), words.next()) else {
            eprintln!("{}: usage: {}", "Error".red().bold(), ".call <id> <fn> [args]".cyan());
            return;
        };
        let args: Vec<Value> = words.map(parse_arg).collect();

        let exports = match self.modules.require(id) {
            Ok(exports) => exports,
            Err(e) => return print_error(&e),
        };
        match exports.get(name) {
            Some(Value::Function(func)) => match func.call(&args) {
                Ok(value) => println!("{}", format_value(&value)),
                Err(message) => eprintln!("{}: {}", "Uncaught".red().bold(), message),
            },
            Some(other) => println!("{}", format_value(other)),
            None => eprintln!("{}: '{}' has no export '{}'", "Error".red().bold(), id, name),
        }
    }

    fn print_loaded(&self) {
        let ids = self.modules.loaded_ids();
        if ids.is_empty() {
            println!("{}", "(no modules loaded)".dimmed());
        }
        for id in ids {
            match self.modules.loader().origin(id) {
                Some(origin) => println!("{} {}", id.white().bold(), format_origin(origin)),
                None => println!("{} {}", id.white().bold(), "loading".dimmed()),
            }
        }
    }

    fn print_cache(&self) {
        let cache = self.modules.registry().library_cache();
        for path in cache.paths() {
            println!("{}", path.display().yellow());
        }
        println!(
            "{}",
            format!(
                "{} loaded, {} pending unload, {} loads, {} unloads",
                cache.len(),
                cache.pending_count(),
                cache.load_count(),
                cache.unload_count()
            )
            .dimmed()
        );
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:24} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:24} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:24} {}", "Ctrl+D".yellow(), "Exit".dimmed());
        println!("  {:24} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
    }
}

/// Result of executing a shell command
enum CommandResult {
    Continue,
    Exit,
}

/// Numbers, booleans and null are parsed; anything else is a string
fn parse_arg(word: &str) -> Value {
    match word {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "null" => Value::Null,
        "undefined" => Value::Undefined,
        _ => word
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::from(word.trim_matches(|c| c == '"' || c == '\''))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(ReplCommand::parse(".help"), Some((ReplCommand::Help, None))));
        assert!(matches!(ReplCommand::parse(".exit"), Some((ReplCommand::Exit, None))));
        assert!(matches!(
            ReplCommand::parse(".require  net.http "),
            Some((ReplCommand::Require, Some("net.http")))
        ));
        assert!(matches!(
            ReplCommand::parse(".call greet hello Ada"),
            Some((ReplCommand::Call, Some("greet hello Ada")))
        ));
        assert!(ReplCommand::parse(".bogus").is_none());
        assert!(ReplCommand::parse("greet").is_none());
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("2.5"), Value::Number(2.5));
        assert_eq!(parse_arg("true"), Value::Boolean(true));
        assert_eq!(parse_arg("'Ada'"), Value::from("Ada"));
        assert_eq!(parse_arg("Ada"), Value::from("Ada"));
    }

    #[test]
    fn test_word_start() {
        assert_eq!(word_start(".require gr", 11), 9);
        assert_eq!(word_start(".req", 4), 0);
    }
}

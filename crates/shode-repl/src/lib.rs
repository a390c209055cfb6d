//! shode REPL: an interactive front end for the shode engine.
//!
//! The REPL handles:
//! - Meta-commands: `/help`, `/quit`, `/ast`, `/vars`, `/cwd`, `/functions`,
//!   `/modules`, `/builtins`, `/security`, `/status`
//! - Script execution through a persistent [`Engine`]
//! - Command history via rustyline

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use shode_kernel::{ast, parser, CancellationToken, Engine, ExecutionResult, MetricsSnapshot, ShellConfig};

/// Result from meta-command handling.
#[derive(Debug)]
enum MetaResult {
    /// Continue with optional output
    Continue(Option<String>),
    /// Exit the REPL
    Exit,
}

/// What [`Repl::process_line`] wants the caller to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Print this, if anything.
    Output(Option<String>),
    Exit,
}

/// REPL state: one engine whose variables, functions and imports persist
/// across lines.
pub struct Repl {
    engine: Engine,
    runtime: Runtime,
    show_ast: bool,
}

impl Repl {
    /// A REPL configured from the user's config file.
    pub fn new() -> Result<Self> {
        let config = ShellConfig::load().context("failed to load config")?;
        Self::with_config(config)
    }

    /// A REPL with an explicit configuration.
    ///
    /// Output is captured per line and returned from [`Repl::process_line`],
    /// so the engine always runs detached from the terminal.
    pub fn with_config(mut config: ShellConfig) -> Result<Self> {
        config.engine.interactive = false;
        let engine = Engine::from_config(&config);
        let runtime = Runtime::new().context("failed to create tokio runtime")?;
        Ok(Self {
            engine,
            runtime,
            show_ast: false,
        })
    }

    /// A REPL whose working directory starts at `root`.
    pub fn with_root(root: PathBuf) -> Result<Self> {
        let repl = Self::with_config(ShellConfig::default())?;
        repl.engine
            .env()
            .change_dir(&root)
            .with_context(|| format!("cannot start in {}", root.display()))?;
        Ok(repl)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Process one line (or a block of lines) of input.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        let trimmed = line.trim();

        if trimmed.starts_with('/') {
            return self.handle_meta_command(trimmed).into();
        }
        if let Some(meta) = self.try_shell_style_command(trimmed) {
            return meta.into();
        }
        if trimmed.is_empty() {
            return LineOutcome::Output(None);
        }

        if self.show_ast {
            return LineOutcome::Output(Some(match parser::parse(trimmed) {
                Ok(script) => ast::to_sexpr(&script),
                Err(e) => format!("Parse error: {e}"),
            }));
        }

        let cancel = CancellationToken::new();
        let engine = &self.engine;
        let result = self.runtime.block_on(async {
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                })
            };
            let result = engine.execute_str(&cancel, trimmed).await;
            watcher.abort();
            result
        });

        LineOutcome::Output(match result {
            Ok(result) => format_result(&result),
            Err(e) if e.is_cancelled() => Some("^C".to_string()),
            Err(e) => Some(format!("Error: {e}")),
        })
    }

    /// Handle a meta-command (starts with /).
    fn handle_meta_command(&mut self, cmd: &str) -> MetaResult {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let command = parts.first().copied().unwrap_or("");

        match command {
            "/quit" | "/q" | "/exit" => MetaResult::Exit,
            "/help" | "/h" | "/?" => MetaResult::Continue(Some(HELP_TEXT.to_string())),
            "/ast" => {
                self.show_ast = !self.show_ast;
                MetaResult::Continue(Some(format!(
                    "AST mode: {}",
                    if self.show_ast { "ON" } else { "OFF" }
                )))
            }
            "/vars" | "/env" => {
                let vars = self.engine.env().all_vars();
                let filter = parts.get(1).copied();
                let lines: Vec<String> = vars
                    .iter()
                    .filter(|(name, _)| filter.map_or(true, |f| name.starts_with(f)))
                    .map(|(name, value)| format!("  {name} = {value:?}"))
                    .collect();
                if lines.is_empty() {
                    MetaResult::Continue(Some("(no variables set)".to_string()))
                } else {
                    MetaResult::Continue(Some(format!("Variables:\n{}", lines.join("\n"))))
                }
            }
            "/cwd" => MetaResult::Continue(Some(self.engine.env().working_dir().display().to_string())),
            "/$?" => MetaResult::Continue(Some(self.engine.last_status().to_string())),
            "/status" => MetaResult::Continue(Some(format_status(
                self.engine.last_status(),
                &self.engine.metrics(),
            ))),
            "/functions" => {
                let names = self.engine.function_names();
                if names.is_empty() {
                    MetaResult::Continue(Some("(no functions defined)".to_string()))
                } else {
                    MetaResult::Continue(Some(names.join("\n")))
                }
            }
            "/modules" => {
                let modules = self.runtime.block_on(self.engine.modules().list_modules());
                if modules.is_empty() {
                    return MetaResult::Continue(Some("(no modules loaded)".to_string()));
                }
                let mut output = String::from("Modules:\n");
                for module in modules {
                    let version = module.version.as_deref().unwrap_or("-");
                    let exports: Vec<&str> = module.exports.keys().map(String::as_str).collect();
                    output.push_str(&format!(
                        "  {} {} ({})\n    exports: {}\n",
                        module.name,
                        version,
                        module.path.display(),
                        exports.join(", ")
                    ));
                }
                MetaResult::Continue(Some(output.trim_end().to_string()))
            }
            "/builtins" => {
                let usages = self.engine.builtins().usages();
                let lines: Vec<String> = usages.values().map(|usage| format!("  {usage}")).collect();
                MetaResult::Continue(Some(format!("Builtins:\n{}", lines.join("\n"))))
            }
            "/security" => {
                let report = self.engine.security().security_report();
                MetaResult::Continue(Some(match serde_json::to_string_pretty(&report) {
                    Ok(json) => json,
                    Err(e) => format!("Cannot render report: {e}"),
                }))
            }
            _ => MetaResult::Continue(Some(format!(
                "Unknown command: {command}\nType /help for available commands."
            ))),
        }
    }

    /// Shell-style spellings of the common meta-commands.
    fn try_shell_style_command(&mut self, cmd: &str) -> Option<MetaResult> {
        match cmd {
            "quit" | "exit" => Some(self.handle_meta_command("/quit")),
            "help" => Some(self.handle_meta_command("/help")),
            _ => None,
        }
    }
}

impl From<MetaResult> for LineOutcome {
    fn from(meta: MetaResult) -> Self {
        match meta {
            MetaResult::Continue(output) => LineOutcome::Output(output),
            MetaResult::Exit => LineOutcome::Exit,
        }
    }
}

/// `/status`: the last exit status followed by the engine's counters.
fn format_status(last_status: i32, m: &MetricsSnapshot) -> String {
    format!(
        "last status: {last_status}\n\
         commands:    {} ({} ok, {} failed, {:.1}% success)\n\
         by kind:     {}\n\
         errors:      {}\n\
         pipelines:   {} ({} failed)\n\
         loops:       {} ({} iterations)\n\
         elapsed:     {}ms over {} runs",
        m.commands,
        m.successes,
        m.failures,
        m.success_rate,
        format_counts(&m.by_kind),
        format_counts(&m.errors),
        m.pipelines,
        m.pipeline_failures,
        m.loops,
        m.loop_iterations,
        m.total_elapsed.as_millis(),
        m.scripts,
    )
}

/// `name=n` pairs, or `-` when there are none.
fn format_counts(counts: &BTreeMap<&str, u64>) -> String {
    if counts.is_empty() {
        return "-".to_string();
    }
    counts
        .iter()
        .map(|(name, n)| format!("{name}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stdout, then stderr, then a marker when the status is non-zero.
fn format_result(result: &ExecutionResult) -> Option<String> {
    let mut parts = Vec::new();
    if !result.output.is_empty() {
        parts.push(result.output.trim_end_matches('\n').to_string());
    }
    if !result.error.is_empty() {
        parts.push(result.error.trim_end_matches('\n').to_string());
    }
    if !result.success {
        parts.push(format!("✗ code={}", result.exit_code));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

const HELP_TEXT: &str = r#"shode REPL

Meta Commands:
  help, /help, /?     Show this help
  quit, /quit, /q     Exit the REPL
  /ast                Toggle syntax tree display instead of running
  /vars [prefix]      Show variables
  /cwd                Show the working directory
  /$?                 Show the last exit status
  /status             Show the last exit status and execution counters
  /functions          List functions defined in this session
  /modules            List loaded modules and their exports
  /builtins           List builtin commands
  /security           Show the active security policy

Language:
  NAME=value              Assign a variable
  $NAME ${NAME} "$@" $?   Expansions
  $(command)              Command substitution
  a | b | c               Pipeline
  a && b || c             Conditional chains
  if cond; then ...; elif ...; else ...; fi
  for x in a b c; do ...; done
  while cond; do ...; done
  name() { ...; }         Define a function
  import path/to/module   Load a module's export_ functions
  source file.sh          Run a file in this session
  set -e / set +e         Toggle stop-on-error
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the interactive REPL until `/quit` or end of input.
pub fn run() -> Result<()> {
    println!("shode v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = directories::BaseDirs::new().map(|b| b.data_dir().join("shode").join("history.txt"));
    if let Some(ref path) = history_path {
        if let Err(e) = rl.load_history(path) {
            let is_not_found =
                matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::new()?;
    println!();

    loop {
        let prompt = match repl.engine.last_status() {
            0 => "shode> ".to_string(),
            code => format!("shode [{code}]> "),
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }

                match repl.process_line(&line) {
                    LineOutcome::Output(Some(output)) => println!("{output}"),
                    LineOutcome::Output(None) => {}
                    LineOutcome::Exit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

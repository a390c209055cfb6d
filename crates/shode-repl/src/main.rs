//! shode CLI entry point.
//!
//! Usage:
//!   shode                        # Interactive REPL
//!   shode -c <command> [args]    # Execute command and exit
//!   shode script.sh [args]       # Run a script
//!   shode --ast script.sh        # Print the parsed script

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use shode_kernel::{ast, parser, CancellationToken, Engine, ShellConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Logs go to stderr and respect RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("shode: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            shode_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!(
                "shode {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                env!("SHODE_GIT_HASH"),
                env!("SHODE_BUILD_DATE")
            );
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let command = args.get(2).context("-c requires a command argument")?;
            run_source(command, "shode", args.get(3..).unwrap_or_default())
        }

        Some("--ast") => {
            let path = args.get(2).context("--ast requires a script path")?;
            print_ast(path)
        }

        Some(path) if !path.starts_with('-') => {
            let source = std::fs::read_to_string(path).with_context(|| format!("failed to read script: {path}"))?;
            run_source(&source, path, &args[2..])
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'shode --help' for usage.");
            Ok(ExitCode::from(2))
        }
    }
}

fn print_help() {
    println!(
        r#"shode v{}

Usage:
  shode                          Interactive REPL
  shode -c <command> [args...]   Execute command string and exit
  shode <script.sh> [args...]    Run a script file
  shode --ast <script.sh>        Print the parsed script

Options:
  -c <command>                   Execute command string and exit
  --ast <path>                   Parse only and print the syntax tree
  -h, --help                     Show this help
  -V, --version                  Show version

Environment:
  SHODE_CONFIG                   Config file (default: <config dir>/shode/config.toml)
  RUST_LOG                       Log filter, e.g. shode_kernel=debug

Examples:
  shode -c 'echo hello | upper'
  shode deploy.sh production
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Run `source` attached to the terminal and exit with its status.
fn run_source(source: &str, zero: &str, args: &[String]) -> Result<ExitCode> {
    let script = match parser::parse(source) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("shode: {zero}: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    let mut config = ShellConfig::load()?;
    config.engine.interactive = true;
    let engine = Engine::from_config(&config);
    engine.set_positional(zero, args.to_vec());

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let cancel = CancellationToken::new();
    let result = runtime.block_on(async {
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, cancelling");
                    cancel.cancel();
                }
            })
        };
        let result = engine.execute(&cancel, &script).await;
        watcher.abort();
        result
    });

    match result {
        Ok(result) => Ok(ExitCode::from(result.exit_code.clamp(0, 255) as u8)),
        Err(e) if e.is_cancelled() => Ok(ExitCode::from(e.exit_code() as u8)),
        Err(e) => {
            eprintln!("shode: {e}");
            Ok(ExitCode::from(e.exit_code().clamp(1, 255) as u8))
        }
    }
}

fn print_ast(path: &str) -> Result<ExitCode> {
    match parser::parse_file(std::path::Path::new(path)) {
        Ok(script) => {
            println!("{}", ast::to_sexpr(&script));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("shode: {path}: {e}");
            Ok(ExitCode::from(2))
        }
    }
}

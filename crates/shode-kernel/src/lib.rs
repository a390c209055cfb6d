//! shode-kernel: the core of the shode scripting language.
//!
//! This crate provides:
//!
//! - **Lexer**: tokenizes shode source using logos
//! - **Parser**: builds the AST from tokens using chumsky
//! - **AST**: node and word types, plus an s-expression dump for debugging
//! - **Engine**: walks a script, expands words and dispatches commands
//! - **Builtins**: typed in-process commands (`echo`, `cat`, `grep`, ...)
//! - **Scheduler**: in-memory pipes, concurrent pipeline stages, external processes
//! - **Modules**: `import` resolution, manifests and the module cache
//! - **Sandbox**: the security checker every side effect goes through
//! - **Metrics**: execution counters per command kind and error kind
//! - **Config**: `config.toml` loading
//!
//! ```no_run
//! # async fn demo() -> shode_kernel::ShellResult<()> {
//! use shode_kernel::{Engine, ShellConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = Engine::from_config(&ShellConfig::default());
//! let result = engine.execute_str(&CancellationToken::new(), "echo hello | cat").await?;
//! assert_eq!(result.output, "hello\n");
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod env;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod metrics;
pub mod modules;
pub mod parser;
pub mod sandbox;
pub mod scheduler;

pub use config::{EngineOptions, ShellConfig};
pub use engine::Engine;
pub use env::EnvironmentManager;
pub use error::{ErrorKind, ShellError, ShellResult};
pub use interpreter::{CommandKind, CommandResult, ExecutionResult};
pub use metrics::{ExecutionMetrics, MetricsSnapshot};
pub use modules::ModuleResolver;
pub use parser::{parse, parse_file};
pub use sandbox::{SecurityChecker, SecurityPolicy};

// Embedders drive cancellation with the same token type the engine uses.
pub use tokio_util::sync::CancellationToken;

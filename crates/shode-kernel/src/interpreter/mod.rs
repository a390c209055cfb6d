//! Interpreter internals: per-run context, scopes, word expansion,
//! redirections, intrinsics and the result types handed back to callers.

mod context;
mod expand;
mod intrinsics;
mod redirect;
mod result;
mod scope;

pub use result::{CommandKind, CommandResult, ExecutionResult};
pub use scope::{Positional, ShellOptions};

pub(crate) use context::{ExecContext, Recorder};
pub(crate) use expand::render_word;
pub(crate) use scope::{Flow, Scope};

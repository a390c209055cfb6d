//! Error taxonomy for parsing, dispatch and execution.
//!
//! Every failure a script can hit maps to one variant of [`ShellError`], and
//! every variant maps to a conventional exit code via [`ShellError::exit_code`].
//! Errors are captured per statement into results; only cancellation aborts
//! an `execute` call outright.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Position;
use crate::sandbox::Rule;

/// Exit code for a generic command failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for parse and usage errors.
pub const EXIT_USAGE: i32 = 2;
/// Exit code for a sandbox denial.
pub const EXIT_DENIED: i32 = 126;
/// Exit code for a command that resolved nowhere.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when execution was cancelled.
pub const EXIT_CANCELLED: i32 = 130;

pub type ShellResult<T> = Result<T, ShellError>;

/// Malformed script text. Never reaches execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: expected {}, found {found}", expected_list(.expected))]
pub struct ParseError {
    pub position: Position,
    pub expected: Vec<String>,
    pub found: String,
}

fn expected_list(expected: &[String]) -> String {
    match expected {
        [] => "something else".to_string(),
        [one] => one.clone(),
        many => many.join(" or "),
    }
}

/// A builtin argument that could not be coerced into its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{command}: argument '{param}' expects {expected}, got {found:?}")]
pub struct TypeError {
    pub command: String,
    pub param: String,
    pub expected: String,
    pub found: String,
}

/// A sandbox denial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{action}: permission denied: {reason}")]
pub struct SecurityError {
    /// Human rendering of the denied action.
    pub action: String,
    pub reason: String,
    pub rule: Option<Rule>,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution cancelled")]
    Cancelled,

    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("{name}: command not found")]
    CommandNotFound { name: String, args: Vec<String> },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("{}: no such directory", .path.display())]
    DirNotFound { path: PathBuf },

    #[error("module not found: {path}")]
    ModuleNotFound { path: String },

    #[error("module {module}: no entry point (tried {})", .tried.join(", "))]
    EntryPointNotFound { module: String, tried: Vec<String> },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification recorded in command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Type,
    CommandNotFound,
    Security,
    DirNotFound,
    ModuleNotFound,
    EntryPointNotFound,
    Cancelled,
    Execution,
    Io,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Parse,
        ErrorKind::Type,
        ErrorKind::CommandNotFound,
        ErrorKind::Security,
        ErrorKind::DirNotFound,
        ErrorKind::ModuleNotFound,
        ErrorKind::EntryPointNotFound,
        ErrorKind::Cancelled,
        ErrorKind::Execution,
        ErrorKind::Io,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Type => "type",
            ErrorKind::CommandNotFound => "command_not_found",
            ErrorKind::Security => "security",
            ErrorKind::DirNotFound => "dir_not_found",
            ErrorKind::ModuleNotFound => "module_not_found",
            ErrorKind::EntryPointNotFound => "entry_point_not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Execution => "execution",
            ErrorKind::Io => "io",
        }
    }
}

impl ShellError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ShellError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn cancelled() -> Self {
        ShellError::Execution(ExecutionError::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShellError::Execution(ExecutionError::Cancelled))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::Parse(_) => ErrorKind::Parse,
            ShellError::Type(_) => ErrorKind::Type,
            ShellError::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            ShellError::Security(_) => ErrorKind::Security,
            ShellError::DirNotFound { .. } => ErrorKind::DirNotFound,
            ShellError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            ShellError::EntryPointNotFound { .. } => ErrorKind::EntryPointNotFound,
            ShellError::Execution(ExecutionError::Cancelled) => ErrorKind::Cancelled,
            ShellError::Execution(_) => ErrorKind::Execution,
            ShellError::Io { .. } => ErrorKind::Io,
        }
    }

    /// The conventional exit code a script observes in `$?`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::Parse(_) | ShellError::Type(_) => EXIT_USAGE,
            ShellError::CommandNotFound { .. } => EXIT_NOT_FOUND,
            ShellError::Security(_) => EXIT_DENIED,
            ShellError::Execution(ExecutionError::Cancelled) => EXIT_CANCELLED,
            ShellError::Execution(ExecutionError::Spawn { .. }) => EXIT_DENIED,
            ShellError::DirNotFound { .. }
            | ShellError::ModuleNotFound { .. }
            | ShellError::EntryPointNotFound { .. }
            | ShellError::Execution(ExecutionError::Internal(_))
            | ShellError::Io { .. } => EXIT_FAILURE,
        }
    }
}

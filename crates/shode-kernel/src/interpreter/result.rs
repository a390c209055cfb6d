//! Results returned to the caller of `execute` and `execute_command`.
//!
//! ```text
//! ExecutionResult
//! ├── exit_code / success   caller-facing status of the whole script
//! ├── commands              one CommandResult per simple command run at top level
//! ├── output / error        everything the top level wrote to stdout / stderr
//! └── elapsed
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorKind;

/// What a command name dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Engine-internal: `cd`, `export`, `set`, `import`, ...
    Intrinsic,
    UserFunction,
    ModuleExport,
    Builtin,
    External,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Intrinsic,
        CommandKind::UserFunction,
        CommandKind::ModuleExport,
        CommandKind::Builtin,
        CommandKind::External,
    ];

    /// The serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Intrinsic => "intrinsic",
            CommandKind::UserFunction => "user_function",
            CommandKind::ModuleExport => "module_export",
            CommandKind::Builtin => "builtin",
            CommandKind::External => "external",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Intrinsic => "intrinsic",
            CommandKind::UserFunction => "function",
            CommandKind::ModuleExport => "module export",
            CommandKind::Builtin => "builtin",
            CommandKind::External => "external",
        })
    }
}

/// Outcome of one simple command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    /// Expanded name and arguments, space separated.
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    /// What the command wrote to the top-level stdout.
    pub output: String,
    /// What the command wrote to the top-level stderr.
    pub error: String,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// `None` when the name resolved nowhere, and for whole pipelines.
    pub kind: Option<CommandKind>,
    /// Set when the command failed with an engine-level error rather than
    /// a plain non-zero exit.
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl CommandResult {
    pub fn new(command: impl Into<String>, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            exit_code,
            success: exit_code == 0,
            output: String::new(),
            error: String::new(),
            elapsed: Duration::ZERO,
            kind: None,
            error_kind: None,
        }
    }
}

/// Outcome of a whole `execute` call. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub success: bool,
    pub commands: Vec<CommandResult>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub output: String,
    pub error: String,
}

impl ExecutionResult {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            success: exit_code == 0,
            commands: Vec::new(),
            elapsed: Duration::ZERO,
            output: String::new(),
            error: String::new(),
        }
    }

    /// The last command that ran, if any.
    pub fn last_command(&self) -> Option<&CommandResult> {
        self.commands.last()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

//! Per-run execution context.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::env::EnvironmentManager;
use crate::error::{ShellError, ShellResult};
use crate::scheduler::{CaptureBuffer, InputSource, OutputSink};

use super::result::CommandResult;
use super::scope::{Flow, Scope};

/// Everything a statement runs against.
///
/// Cloning is how nested scopes are made: the clone shares the environment
/// and streams unless the caller swaps them out.
#[derive(Clone)]
pub(crate) struct ExecContext {
    pub env: Arc<EnvironmentManager>,
    pub stdin: InputSource,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub scope: Scope,
    pub cancel: CancellationToken,
    /// Present while per-command results are being collected.
    pub recorder: Option<Recorder>,
    /// The last statement's failure must not trigger errexit.
    pub errexit_exempt: bool,
    /// Depth of `if`/`while` conditions and non-final `&&`/`||` operands.
    pub conditional: u32,
    /// Status of the last command substitution in the current expansion.
    pub subst_status: Option<i32>,
}

impl ExecContext {
    pub fn new(
        env: Arc<EnvironmentManager>,
        stdin: InputSource,
        stdout: OutputSink,
        stderr: OutputSink,
        scope: Scope,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            env,
            stdin,
            stdout,
            stderr,
            scope,
            cancel,
            recorder: None,
            errexit_exempt: false,
            conditional: 0,
            subst_status: None,
        }
    }

    pub fn check_cancel(&self) -> ShellResult<()> {
        if self.cancel.is_cancelled() {
            Err(ShellError::cancelled())
        } else {
            Ok(())
        }
    }

    /// A copy with a private environment, for subshells and substitutions.
    pub fn subshell(&self) -> Self {
        let mut child = self.clone();
        child.env = self.env.fork();
        child.scope.loop_depth = 0;
        child
    }

    /// Record `code` as `$?` and continue normally.
    pub fn status(&mut self, code: i32) -> Flow {
        self.scope.last_status = code;
        Flow::Normal
    }

    /// Whether errexit stops the current statement list.
    pub fn should_errexit(&self) -> bool {
        self.scope.last_status != 0
            && self.scope.options.errexit
            && !self.errexit_exempt
            && self.conditional == 0
    }

    /// Report an engine error on stderr.
    pub async fn report(&self, err: &ShellError) {
        let _ = self.stderr.write_str(&format!("shode: {err}\n")).await;
    }
}

/// Collects one [`CommandResult`] per command and slices the top-level
/// capture buffers to attribute output.
#[derive(Clone)]
pub(crate) struct Recorder {
    results: Arc<Mutex<Vec<CommandResult>>>,
    out: Option<(OutputSink, CaptureBuffer)>,
    err: Option<(OutputSink, CaptureBuffer)>,
}

/// Capture offsets taken before a command runs.
pub(crate) struct Mark {
    out: usize,
    err: usize,
    started: Instant,
}

impl Recorder {
    pub fn new(out: Option<(OutputSink, CaptureBuffer)>, err: Option<(OutputSink, CaptureBuffer)>) -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::new())),
            out,
            err,
        }
    }

    pub fn mark(&self) -> Mark {
        Mark {
            out: self.out.as_ref().map_or(0, |(_, buf)| buf.len()),
            err: self.err.as_ref().map_or(0, |(_, buf)| buf.len()),
            started: Instant::now(),
        }
    }

    /// Store `result`. Output is attributed only when the command wrote to
    /// the top-level streams rather than a redirect target.
    pub fn record(&self, mark: Mark, stdout: &OutputSink, stderr: &OutputSink, mut result: CommandResult) {
        result.elapsed = mark.started.elapsed();
        if let Some((top, buf)) = &self.out {
            if stdout.same_target(top) {
                result.output = buf.since(mark.out);
            }
        }
        if let Some((top, buf)) = &self.err {
            if stderr.same_target(top) {
                result.error = buf.since(mark.err);
            }
        }
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    pub fn take(&self) -> Vec<CommandResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

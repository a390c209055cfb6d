//! Concurrent pipeline stages.
//!
//! [`wire`] builds the stdio endpoints for `n` stages: stage *i* writes
//! into an in-memory pipe that stage *i + 1* reads. [`run_stages`] starts
//! every stage as its own task and joins them, racing the whole set against
//! the cancellation token.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExecutionError, ShellError, ShellResult, EXIT_FAILURE};

use super::pipe_stream::{pipe, PipeCloser, PIPE_CAPACITY};
use super::stdio::{InputSource, OutputSink};

/// A stage body, owning everything it needs.
pub type StageFuture = Pin<Box<dyn Future<Output = ShellResult<i32>> + Send + 'static>>;

/// Stdio endpoints of one stage.
#[derive(Debug, Clone)]
pub struct StageIo {
    pub stdin: InputSource,
    pub stdout: OutputSink,
}

/// Endpoints for `stages` stages between `stdin` and `stdout`, plus the
/// closers for every pipe created in between.
pub fn wire(stages: usize, stdin: InputSource, stdout: OutputSink) -> (Vec<StageIo>, Vec<PipeCloser>) {
    let mut ios = Vec::with_capacity(stages);
    let mut closers = Vec::with_capacity(stages.saturating_sub(1));
    let mut next_in = stdin;
    for i in 0..stages {
        if i + 1 == stages {
            ios.push(StageIo {
                stdin: next_in,
                stdout,
            });
            break;
        }
        let (writer, reader) = pipe(PIPE_CAPACITY);
        closers.push(writer.closer());
        ios.push(StageIo {
            stdin: next_in,
            stdout: OutputSink::pipe(writer),
        });
        next_in = InputSource::pipe(reader);
    }
    (ios, closers)
}

/// Run all stages concurrently and return their exit codes in stage order.
///
/// On cancellation the stages get `grace` (plus a small margin) to stop on
/// their own; external stages use it to terminate their process groups.
/// Every pipe is then closed and the remaining tasks are aborted.
#[tracing::instrument(level = "debug", skip_all, fields(stages = stages.len()))]
pub async fn run_stages(
    stages: Vec<StageFuture>,
    closers: Vec<PipeCloser>,
    cancel: &CancellationToken,
    grace: Duration,
) -> ShellResult<Vec<i32>> {
    let mut statuses = vec![0; stages.len()];
    let mut set = JoinSet::new();
    for (index, stage) in stages.into_iter().enumerate() {
        set.spawn(async move { (index, stage.await) });
    }

    let completed = tokio::select! {
        _ = collect(&mut set, &mut statuses) => true,
        _ = cancel.cancelled() => false,
    };
    if completed {
        debug!(?statuses, "pipeline finished");
        return Ok(statuses);
    }

    let margin = Duration::from_millis(250);
    if tokio::time::timeout(grace + margin, collect(&mut set, &mut statuses))
        .await
        .is_err()
    {
        warn!("pipeline stages still running after grace period");
    }
    for closer in &closers {
        closer.close();
    }
    set.abort_all();
    while set.join_next().await.is_some() {}
    Err(ShellError::cancelled())
}

async fn collect(set: &mut JoinSet<(usize, ShellResult<i32>)>, statuses: &mut [i32]) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(code))) => statuses[index] = code,
            Ok((index, Err(e))) => {
                if !e.is_cancelled() {
                    debug!(index, error = %e, "stage failed");
                }
                statuses[index] = e.exit_code();
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                let err = ShellError::Execution(ExecutionError::Internal(join_err.to_string()));
                warn!(error = %err, "stage task panicked");
                if let Some(slot) = statuses.iter_mut().find(|s| **s == 0) {
                    *slot = EXIT_FAILURE;
                }
            }
        }
    }
}

/// Overall status: the last stage's, or with `pipefail` the first non-zero.
pub fn pipeline_status(statuses: &[i32], pipefail: bool) -> i32 {
    if pipefail {
        if let Some(&code) = statuses.iter().find(|&&c| c != 0) {
            return code;
        }
    }
    statuses.last().copied().unwrap_or(0)
}

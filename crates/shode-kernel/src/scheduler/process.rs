//! External process execution.
//!
//! Every child is started in its own process group so cancellation can
//! signal the whole tree it spawned. Stdio is bound to the command's
//! [`InputSource`]/[`OutputSink`] through copier tasks unless the caller
//! asks for the terminal to be inherited.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExecutionError, ShellError, ShellResult};

use super::stdio::{InputSource, OutputSink, SinkKind, SourceKind};

/// What to run and in which environment.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Name as written in the script, for diagnostics.
    pub name: String,
    /// Resolved executable.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Complete environment of the child.
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

/// Stdio endpoints of one process.
#[derive(Debug, Clone)]
pub struct ProcessIo {
    pub stdin: InputSource,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    /// Let terminal-bound streams pass straight through to the child.
    pub inherit: bool,
}

/// Find an executable for `name` in `path`. Names containing `/` resolve
/// against `cwd` instead.
pub fn resolve_executable(name: &str, path: &[PathBuf], cwd: &Path) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = cwd.join(name);
        return is_executable(&candidate).then_some(candidate);
    }
    path.iter()
        .map(|dir| {
            if dir.is_absolute() {
                dir.join(name)
            } else {
                cwd.join(dir).join(name)
            }
        })
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Exit code of a finished process; signal deaths map to `128 + signo`.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Spawn the process, pump its stdio and wait for it.
///
/// On cancellation the process group receives SIGTERM, then SIGKILL once
/// `grace` has elapsed, and `ExecutionError::Cancelled` is returned.
#[tracing::instrument(level = "debug", skip_all, fields(program = %spec.program.display()))]
pub async fn run_process(
    spec: &ProcessSpec,
    io: ProcessIo,
    cancel: &CancellationToken,
    grace: Duration,
) -> ShellResult<i32> {
    let inherit_in = io.inherit && io.stdin.kind() == SourceKind::Stdin;
    let inherit_out = io.inherit && io.stdout.kind() == SinkKind::Stdout;
    let inherit_err = io.inherit && io.stderr.kind() == SinkKind::Stderr;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&spec.cwd)
        .process_group(0)
        .kill_on_drop(true)
        .stdin(if inherit_in {
            Stdio::inherit()
        } else if io.stdin.kind() == SourceKind::Empty {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(if inherit_out { Stdio::inherit() } else { Stdio::piped() })
        .stderr(if inherit_err { Stdio::inherit() } else { Stdio::piped() });

    let mut child = command.spawn().map_err(|source| {
        ShellError::Execution(ExecutionError::Spawn {
            command: spec.name.clone(),
            source,
        })
    })?;
    let group = child.id().map(|id| Pid::from_raw(id as i32));
    debug!(pid = ?child.id(), "spawned");

    let feeder = child.stdin.take().map(|mut pipe| {
        let source = io.stdin.clone();
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match source.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if pipe.write_all(&chunk[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            // Dropping the pipe delivers EOF to the child.
        })
    });
    let mut copiers: Vec<JoinHandle<()>> = Vec::new();
    if let Some(out) = child.stdout.take() {
        copiers.push(spawn_copier(out, io.stdout.clone()));
    }
    if let Some(err) = child.stderr.take() {
        copiers.push(spawn_copier(err, io.stderr.clone()));
    }

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            abort_all(feeder, copiers);
            return Err(ShellError::io(format!("waiting for {}", spec.name), e));
        }
        None => {
            terminate(group, &mut child, grace).await;
            abort_all(feeder, copiers);
            return Err(ShellError::cancelled());
        }
    };

    if let Some(feeder) = feeder {
        feeder.abort();
    }
    let drained = tokio::select! {
        _ = async {
            for copier in copiers.iter_mut() {
                let _ = copier.await;
            }
        } => true,
        _ = cancel.cancelled() => false,
    };
    if !drained {
        abort_all(None, copiers);
        return Err(ShellError::cancelled());
    }

    let code = exit_code(status);
    debug!(code, "process exited");
    Ok(code)
}

fn spawn_copier<R>(mut reader: R, sink: OutputSink) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if sink.write_all(&chunk[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn abort_all(feeder: Option<JoinHandle<()>>, copiers: Vec<JoinHandle<()>>) {
    if let Some(f) = feeder {
        f.abort();
    }
    for c in copiers {
        c.abort();
    }
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL what is left.
async fn terminate(group: Option<Pid>, child: &mut Child, grace: Duration) {
    let Some(group) = group else {
        let _ = child.kill().await;
        return;
    };
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        debug!(%group, error = %e, "SIGTERM failed");
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!(%group, "process group ignored SIGTERM, sending SIGKILL");
    }
    // Stragglers that outlived the leader share its group.
    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> ProcessSpec {
        ProcessSpec {
            name: program.to_string(),
            program: PathBuf::from(program),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: vec![("PATH".into(), "/usr/bin:/bin".into())],
            cwd: std::env::temp_dir(),
        }
    }

    fn captured_io() -> (ProcessIo, super::super::stdio::CaptureBuffer) {
        let (stdout, buf) = OutputSink::capture();
        (
            ProcessIo {
                stdin: InputSource::empty(),
                stdout,
                stderr: OutputSink::null(),
                inherit: false,
            },
            buf,
        )
    }

    #[test]
    fn resolves_through_path_segments() {
        let dirs = vec![PathBuf::from("/nonexistent"), PathBuf::from("/bin"), PathBuf::from("/usr/bin")];
        let found = resolve_executable("sh", &dirs, Path::new("/")).expect("sh on PATH");
        assert!(found.ends_with("sh"));
        assert!(resolve_executable("definitely-not-a-command-xyz", &dirs, Path::new("/")).is_none());
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let (io, buf) = captured_io();
        let code = run_process(
            &spec("/bin/sh", &["-c", "printf hi; exit 3"]),
            io,
            &CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(code, 3);
        assert_eq!(buf.to_string_lossy(), "hi");
    }

    #[tokio::test]
    async fn feeds_stdin_from_source() {
        let (mut io, buf) = captured_io();
        io.stdin = InputSource::bytes("from source\n");
        let code = run_process(
            &spec("/bin/sh", &["-c", "cat"]),
            io,
            &CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(buf.to_string_lossy(), "from source\n");
    }

    #[tokio::test]
    async fn cancellation_terminates_the_group() {
        let (io, _buf) = captured_io();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_process(
            &spec("/bin/sh", &["-c", "sleep 30"]),
            io,
            &cancel,
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let (io, _buf) = captured_io();
        let err = run_process(
            &spec("/nonexistent/program", &[]),
            io,
            &CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ShellError::Execution(ExecutionError::Spawn { .. })));
    }
}

//! Pipe-friendly filters: head, tail, wc, tee.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{ShellError, ShellResult, EXIT_FAILURE};
use crate::sandbox::Action;

use super::{list_arg, resolve_path, str_arg, Builtin, BuiltinIo, Param, ParamType, RegistryBuilder, Signature, Value};

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register(Head).register(Tail).register(Wc).register(Tee)
}

const DEFAULT_LINES: i64 = 10;

fn read_action(args: &[Value], index: usize, cwd: &Path) -> Vec<Action> {
    str_arg(args, index)
        .map(|p| {
            vec![Action::ReadFile {
                path: resolve_path(cwd, p),
            }]
        })
        .unwrap_or_default()
}

/// Whole input from the optional path argument or stdin. `None` after
/// reporting a read failure.
async fn whole_input(args: &[Value], index: usize, io: &BuiltinIo, name: &str) -> ShellResult<Option<Vec<u8>>> {
    match str_arg(args, index) {
        None => io
            .stdin
            .read_to_end()
            .await
            .map(Some)
            .map_err(|e| ShellError::io("stdin", e)),
        Some(path) => match tokio::fs::read(io.resolve(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                io.err(&format!("{name}: {path}: {e}\n")).await?;
                Ok(None)
            }
        },
    }
}

fn line_count(args: &[Value]) -> usize {
    args.first()
        .and_then(Value::as_int)
        .unwrap_or(DEFAULT_LINES)
        .max(0) as usize
}

/// `head [count] [path]`
///
/// Reading stdin stops as soon as `count` lines have been seen; once the
/// stage ends its pipe reader drops and an endless producer upstream gets a
/// broken pipe.
struct Head;

#[async_trait]
impl Builtin for Head {
    fn signature(&self) -> Signature {
        Signature::new("head")
            .describe("Print the first lines of a file or stdin")
            .param(Param::optional("count", ParamType::Int))
            .param(Param::optional("path", ParamType::String))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        read_action(args, 1, cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let wanted = line_count(&args);
        if str_arg(&args, 1).is_some() {
            let Some(bytes) = whole_input(&args, 1, io, "head").await? else {
                return Ok(EXIT_FAILURE);
            };
            let text = String::from_utf8_lossy(&bytes);
            for line in text.split_inclusive('\n').take(wanted) {
                io.out(line).await?;
            }
            return Ok(0);
        }

        let mut seen = 0;
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 8192];
        while seen < wanted {
            let n = io.stdin.read(&mut chunk).await.map_err(|e| ShellError::io("stdin", e))?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&chunk[..n]);
            while seen < wanted {
                let Some(end) = pending.iter().position(|&b| b == b'\n') else {
                    break;
                };
                let line: Vec<u8> = pending.drain(..=end).collect();
                io.stdout.write_all(&line).await.map_err(|e| ShellError::io("stdout", e))?;
                seen += 1;
            }
        }
        if seen < wanted && !pending.is_empty() {
            io.stdout.write_all(&pending).await.map_err(|e| ShellError::io("stdout", e))?;
        }
        Ok(0)
    }
}

/// `tail [count] [path]`
struct Tail;

#[async_trait]
impl Builtin for Tail {
    fn signature(&self) -> Signature {
        Signature::new("tail")
            .describe("Print the last lines of a file or stdin")
            .param(Param::optional("count", ParamType::Int))
            .param(Param::optional("path", ParamType::String))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        read_action(args, 1, cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let wanted = line_count(&args);
        let Some(bytes) = whole_input(&args, 1, io, "tail").await? else {
            return Ok(EXIT_FAILURE);
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut window: VecDeque<&str> = VecDeque::with_capacity(wanted);
        for line in text.split_inclusive('\n') {
            if wanted == 0 {
                break;
            }
            if window.len() == wanted {
                window.pop_front();
            }
            window.push_back(line);
        }
        for line in window {
            io.out(line).await?;
        }
        Ok(0)
    }
}

/// `wc [path]`: `lines words bytes`
struct Wc;

#[async_trait]
impl Builtin for Wc {
    fn signature(&self) -> Signature {
        Signature::new("wc")
            .describe("Count lines, words and bytes")
            .param(Param::optional("path", ParamType::String))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        read_action(args, 0, cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let Some(bytes) = whole_input(&args, 0, io, "wc").await? else {
            return Ok(EXIT_FAILURE);
        };
        let lines = bytes.iter().filter(|&&b| b == b'\n').count();
        let words = String::from_utf8_lossy(&bytes).split_whitespace().count();
        io.out(&format!("{lines} {words} {}\n", bytes.len())).await?;
        Ok(0)
    }
}

/// `tee [-a] paths...`: copy stdin to stdout and every file.
struct Tee;

#[async_trait]
impl Builtin for Tee {
    fn signature(&self) -> Signature {
        Signature::new("tee")
            .describe("Copy stdin to stdout and files; -a appends")
            .param(Param::optional("paths", ParamType::StringList))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        list_arg(args, 0)
            .into_iter()
            .filter(|p| p != "-a")
            .map(|p| Action::WriteFile {
                path: resolve_path(cwd, &p),
            })
            .collect()
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let mut paths = list_arg(&args, 0);
        let append = paths.iter().any(|p| p == "-a");
        paths.retain(|p| p != "-a");

        let mut status = 0;
        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let opened = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(io.resolve(path))
                .await;
            match opened {
                Ok(f) => files.push(f),
                Err(e) => {
                    io.err(&format!("tee: {path}: {e}\n")).await?;
                    status = EXIT_FAILURE;
                }
            }
        }

        let mut chunk = [0u8; 8192];
        loop {
            let n = io.stdin.read(&mut chunk).await.map_err(|e| ShellError::io("stdin", e))?;
            if n == 0 {
                break;
            }
            io.stdout
                .write_all(&chunk[..n])
                .await
                .map_err(|e| ShellError::io("stdout", e))?;
            for file in &mut files {
                file.write_all(&chunk[..n])
                    .await
                    .map_err(|e| ShellError::io("tee", e))?;
            }
        }
        for file in &mut files {
            file.flush().await.map_err(|e| ShellError::io("tee", e))?;
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::Harness;
    use crate::scheduler::InputSource;

    const LINES: &str = "1\n2\n3\n4\n5\n";

    #[tokio::test]
    async fn head_and_tail_from_stdin() {
        let dir = std::env::temp_dir();
        let mut h = Harness::with_stdin(&dir, InputSource::bytes(LINES));
        h.run(&Head, &["2"]).await.unwrap();
        assert_eq!(h.stdout(), "1\n2\n");

        let mut h = Harness::with_stdin(&dir, InputSource::bytes(LINES));
        h.run(&Tail, &["2"]).await.unwrap();
        assert_eq!(h.stdout(), "4\n5\n");
    }

    #[tokio::test]
    async fn head_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("n.txt"), LINES).unwrap();
        let mut h = Harness::new(dir.path());
        h.run(&Head, &["3", "n.txt"]).await.unwrap();
        assert_eq!(h.stdout(), "1\n2\n3\n");
        assert_eq!(h.run(&Tail, &["1", "missing"]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wc_counts() {
        let mut h = Harness::with_stdin(&std::env::temp_dir(), InputSource::bytes("a b\nc\n"));
        h.run(&Wc, &[]).await.unwrap();
        assert_eq!(h.stdout(), "2 3 6\n");
    }

    #[tokio::test]
    async fn tee_copies_to_stdout_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::with_stdin(dir.path(), InputSource::bytes("data\n"));
        h.run(&Tee, &["a.txt", "b.txt"]).await.unwrap();
        assert_eq!(h.stdout(), "data\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "data\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "data\n");
    }
}

//! Filesystem builtins.
//!
//! Reads are declared as `ReadFile`, mutations as `WriteFile` and deletes as
//! `RemoveTree`, so the sandbox sees the resolved absolute path before
//! anything is touched.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{ShellError, ShellResult, EXIT_FAILURE};
use crate::sandbox::Action;

use super::{list_arg, resolve_path, str_arg, Builtin, BuiltinIo, Param, ParamType, RegistryBuilder, Signature, Value};

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(Cat)
        .register(Write { append: false })
        .register(Write { append: true })
        .register(Test { kind: TestKind::Exists })
        .register(Test { kind: TestKind::IsDir })
        .register(Test { kind: TestKind::IsFile })
        .register(Mkdir)
        .register(Rm)
        .register(Ls)
        .alias("readfile", "cat")
        .alias("writefile", "write")
        .alias("delete", "rm")
        .alias("list", "ls")
}

fn reads(paths: &[String], cwd: &Path) -> Vec<Action> {
    paths
        .iter()
        .map(|p| Action::ReadFile {
            path: resolve_path(cwd, p),
        })
        .collect()
}

fn writes(paths: &[String], cwd: &Path) -> Vec<Action> {
    paths
        .iter()
        .map(|p| Action::WriteFile {
            path: resolve_path(cwd, p),
        })
        .collect()
}

/// `cat [paths...]`: concatenate files, or copy stdin when none are given.
pub struct Cat;

#[async_trait]
impl Builtin for Cat {
    fn signature(&self) -> Signature {
        Signature::new("cat")
            .describe("Print file contents, or stdin when no file is given")
            .param(Param::optional("paths", ParamType::StringList))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        reads(&list_arg(args, 0), cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let paths = list_arg(&args, 0);
        if paths.is_empty() {
            let mut chunk = [0u8; 8192];
            loop {
                let n = io
                    .stdin
                    .read(&mut chunk)
                    .await
                    .map_err(|e| ShellError::io("stdin", e))?;
                if n == 0 {
                    return Ok(0);
                }
                io.stdout
                    .write_all(&chunk[..n])
                    .await
                    .map_err(|e| ShellError::io("stdout", e))?;
            }
        }

        let mut status = 0;
        for path in &paths {
            match tokio::fs::read(io.resolve(path)).await {
                Ok(bytes) => io
                    .stdout
                    .write_all(&bytes)
                    .await
                    .map_err(|e| ShellError::io("stdout", e))?,
                Err(e) => {
                    io.err(&format!("cat: {path}: {e}\n")).await?;
                    status = EXIT_FAILURE;
                }
            }
        }
        Ok(status)
    }
}

/// `write path [content...]` and `append path [content...]`. Without
/// content, stdin is written.
pub struct Write {
    append: bool,
}

#[async_trait]
impl Builtin for Write {
    fn signature(&self) -> Signature {
        let (name, verb) = if self.append {
            ("append", "Append")
        } else {
            ("write", "Write")
        };
        Signature::new(name)
            .describe(format!("{verb} the arguments, or stdin, to a file"))
            .param(Param::required("path", ParamType::String))
            .param(Param::optional("content", ParamType::StringList))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        str_arg(args, 0)
            .map(|p| writes(&[p.to_string()], cwd))
            .unwrap_or_default()
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let path = str_arg(&args, 0).unwrap_or_default().to_string();
        let content = list_arg(&args, 1);
        let data = if content.is_empty() {
            io.read_stdin().await?
        } else {
            let mut text = content.join(" ");
            text.push('\n');
            text
        };

        let target = io.resolve(&path);
        let opened = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&target)
            .await;
        let result = match opened {
            Ok(mut file) => match file.write_all(data.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            io.err(&format!("{}: {path}: {e}\n", self.signature().name)).await?;
            return Ok(EXIT_FAILURE);
        }
        Ok(0)
    }
}

#[derive(Clone, Copy)]
enum TestKind {
    Exists,
    IsDir,
    IsFile,
}

/// `exists`, `isdir`, `isfile`: exit 0 when the test holds, 1 otherwise.
struct Test {
    kind: TestKind,
}

#[async_trait]
impl Builtin for Test {
    fn signature(&self) -> Signature {
        let (name, describe) = match self.kind {
            TestKind::Exists => ("exists", "Succeed if the path exists"),
            TestKind::IsDir => ("isdir", "Succeed if the path is a directory"),
            TestKind::IsFile => ("isfile", "Succeed if the path is a regular file"),
        };
        Signature::new(name)
            .describe(describe)
            .param(Param::required("path", ParamType::String))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        str_arg(args, 0)
            .map(|p| reads(&[p.to_string()], cwd))
            .unwrap_or_default()
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let path = io.resolve(str_arg(&args, 0).unwrap_or_default());
        let meta = tokio::fs::metadata(&path).await.ok();
        let holds = match (self.kind, meta) {
            (_, None) => false,
            (TestKind::Exists, Some(_)) => true,
            (TestKind::IsDir, Some(m)) => m.is_dir(),
            (TestKind::IsFile, Some(m)) => m.is_file(),
        };
        Ok(if holds { 0 } else { EXIT_FAILURE })
    }
}

/// `mkdir paths...`, creating parents as needed.
pub struct Mkdir;

#[async_trait]
impl Builtin for Mkdir {
    fn signature(&self) -> Signature {
        Signature::new("mkdir")
            .describe("Create directories and any missing parents")
            .param(Param::required("paths", ParamType::StringList))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        let paths: Vec<String> = list_arg(args, 0).into_iter().filter(|p| p != "-p").collect();
        writes(&paths, cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let mut status = 0;
        for path in list_arg(&args, 0) {
            // `-p` is accepted for familiarity; parents are always created.
            if path == "-p" {
                continue;
            }
            if let Err(e) = tokio::fs::create_dir_all(io.resolve(&path)).await {
                io.err(&format!("mkdir: {path}: {e}\n")).await?;
                status = EXIT_FAILURE;
            }
        }
        Ok(status)
    }
}

/// `rm paths...`: files are unlinked, directories removed recursively.
pub struct Rm;

#[async_trait]
impl Builtin for Rm {
    fn signature(&self) -> Signature {
        Signature::new("rm")
            .describe("Remove files and directories")
            .param(Param::required("paths", ParamType::StringList))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        list_arg(args, 0)
            .into_iter()
            .filter(|p| !p.starts_with('-'))
            .map(|p| Action::RemoveTree {
                path: resolve_path(cwd, &p),
            })
            .collect()
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let mut status = 0;
        for path in list_arg(&args, 0) {
            if path.starts_with('-') {
                continue;
            }
            let target = io.resolve(&path);
            let result = match tokio::fs::symlink_metadata(&target).await {
                Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(&target).await,
                Ok(_) => tokio::fs::remove_file(&target).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                io.err(&format!("rm: {path}: {e}\n")).await?;
                status = EXIT_FAILURE;
            }
        }
        Ok(status)
    }
}

/// `ls [path]`: one sorted entry per line, directories suffixed with `/`.
pub struct Ls;

#[async_trait]
impl Builtin for Ls {
    fn signature(&self) -> Signature {
        Signature::new("ls")
            .describe("List directory entries")
            .param(Param::optional("path", ParamType::String))
    }

    fn actions(&self, args: &[Value], cwd: &Path) -> Vec<Action> {
        let path = str_arg(args, 0).unwrap_or(".");
        reads(&[path.to_string()], cwd)
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let shown = str_arg(&args, 0).unwrap_or(".").to_string();
        let dir = io.resolve(&shown);

        let meta = match tokio::fs::metadata(&dir).await {
            Ok(m) => m,
            Err(e) => {
                io.err(&format!("ls: {shown}: {e}\n")).await?;
                return Ok(EXIT_FAILURE);
            }
        };
        if !meta.is_dir() {
            io.out_line(&shown).await?;
            return Ok(0);
        }

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => {
                io.err(&format!("ls: {shown}: {e}\n")).await?;
                return Ok(EXIT_FAILURE);
            }
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        for name in names {
            io.out_line(&name).await?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::Harness;
    use crate::scheduler::InputSource;

    #[tokio::test]
    async fn write_then_cat_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new(dir.path());
        assert_eq!(h.run(&Write { append: false }, &["notes.txt", "one", "two"]).await.unwrap(), 0);
        assert_eq!(h.run(&Write { append: true }, &["notes.txt", "three"]).await.unwrap(), 0);
        assert_eq!(h.run(&Cat, &["notes.txt"]).await.unwrap(), 0);
        assert_eq!(h.stdout(), "one two\nthree\n");
    }

    #[tokio::test]
    async fn write_without_content_uses_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::with_stdin(dir.path(), InputSource::bytes("piped\n"));
        h.run(&Write { append: false }, &["out.txt"]).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "piped\n");
    }

    #[tokio::test]
    async fn cat_missing_file_fails_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new(dir.path());
        assert_eq!(h.run(&Cat, &["nope"]).await.unwrap(), 1);
        assert!(h.err.to_string_lossy().starts_with("cat: nope:"));
    }

    #[tokio::test]
    async fn tests_mkdir_rm_and_ls() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new(dir.path());
        h.run(&Mkdir, &["-p", "a/b"]).await.unwrap();
        std::fs::write(dir.path().join("f.txt"), "x").unwrap();

        assert_eq!(h.run(&Test { kind: TestKind::IsDir }, &["a/b"]).await.unwrap(), 0);
        assert_eq!(h.run(&Test { kind: TestKind::IsFile }, &["a"]).await.unwrap(), 1);
        assert_eq!(h.run(&Test { kind: TestKind::Exists }, &["f.txt"]).await.unwrap(), 0);

        h.run(&Ls, &[]).await.unwrap();
        assert_eq!(h.stdout(), "a/\nf.txt\n");

        assert_eq!(h.run(&Rm, &["-r", "a", "f.txt"]).await.unwrap(), 0);
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("f.txt").exists());
    }

    #[test]
    fn actions_resolve_against_cwd() {
        let cwd = Path::new("/work");
        let args = vec![Value::List(vec!["x".into(), "/abs".into()])];
        assert_eq!(
            Mkdir.actions(&args, cwd),
            vec![
                Action::WriteFile { path: "/work/x".into() },
                Action::WriteFile { path: "/abs".into() },
            ]
        );
        assert_eq!(
            Rm.actions(&[Value::List(vec!["-r".into(), "old".into()])], cwd),
            vec![Action::RemoveTree { path: "/work/old".into() }]
        );
        assert_eq!(
            Ls.actions(&[], cwd),
            vec![Action::ReadFile { path: "/work/.".into() }]
        );
    }
}

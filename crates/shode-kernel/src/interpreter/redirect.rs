//! Redirections: rebinding a command's streams before it runs.
//!
//! Every file is checked with the security checker before it is opened, so
//! a denied `> file` never creates the file.

use std::io;
use std::path::{Path, PathBuf};

use crate::ast::{Redirect, RedirectKind, RedirectTarget, Word};
use crate::builtins::resolve_path;
use crate::engine::Engine;
use crate::error::{ExecutionError, ShellError, ShellResult};
use crate::sandbox::Action;
use crate::scheduler::{InputSource, OutputSink};

use super::context::ExecContext;

impl Engine {
    /// Apply `redirects` to the streams in `ctx`, left to right.
    ///
    /// Returns the file sinks that were opened; the caller closes them once
    /// the command has finished.
    pub(crate) async fn apply_redirects(
        &self,
        ctx: &mut ExecContext,
        redirects: &[Redirect],
    ) -> ShellResult<Vec<OutputSink>> {
        let mut opened = Vec::new();
        for redirect in redirects {
            match (redirect.kind, &redirect.target) {
                (RedirectKind::StderrToStdout, _) => ctx.stderr = ctx.stdout.clone(),
                (RedirectKind::HereDoc, RedirectTarget::Body(body)) => {
                    let text = self.expand_single(ctx, body).await?;
                    ctx.stdin = InputSource::bytes(text);
                }
                (RedirectKind::Stdin, RedirectTarget::File(word)) => {
                    let path = self.redirect_path(ctx, word).await?;
                    self.security.enforce(&Action::ReadFile { path: path.clone() })?;
                    ctx.stdin = open_input(ctx, &path).await?;
                }
                (
                    kind @ (RedirectKind::StdoutOverwrite
                    | RedirectKind::StdoutAppend
                    | RedirectKind::Stderr
                    | RedirectKind::StderrAppend),
                    RedirectTarget::File(word),
                ) => {
                    let path = self.redirect_path(ctx, word).await?;
                    self.security.enforce(&Action::WriteFile { path: path.clone() })?;
                    let append = matches!(kind, RedirectKind::StdoutAppend | RedirectKind::StderrAppend);
                    let (sink, is_file) = open_output(ctx, &path, append).await?;
                    if is_file {
                        opened.push(sink.clone());
                    }
                    if matches!(kind, RedirectKind::StdoutOverwrite | RedirectKind::StdoutAppend) {
                        ctx.stdout = sink;
                    } else {
                        ctx.stderr = sink;
                    }
                }
                (kind, target) => {
                    return Err(ShellError::Execution(ExecutionError::Internal(format!(
                        "redirect {kind} cannot take {target:?}"
                    ))))
                }
            }
        }
        Ok(opened)
    }

    async fn redirect_path(&self, ctx: &mut ExecContext, word: &Word) -> ShellResult<PathBuf> {
        let target = self.expand_single(ctx, word).await?;
        if target.is_empty() {
            return Err(ShellError::io(
                "redirect",
                io::Error::new(io::ErrorKind::InvalidInput, "ambiguous redirect"),
            ));
        }
        Ok(resolve_path(&ctx.env.working_dir(), &target))
    }
}

async fn open_input(ctx: &ExecContext, path: &Path) -> ShellResult<InputSource> {
    match path.to_str() {
        Some("/dev/null") => return Ok(InputSource::empty()),
        Some("/dev/stdin") => return Ok(ctx.stdin.clone()),
        _ => {}
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ShellError::io(path.display().to_string(), e))?;
    Ok(InputSource::file(file))
}

/// The sink for `path` and whether it is a freshly opened file.
async fn open_output(ctx: &ExecContext, path: &Path, append: bool) -> ShellResult<(OutputSink, bool)> {
    match path.to_str() {
        Some("/dev/null") => return Ok((OutputSink::null(), false)),
        Some("/dev/stdout") => return Ok((ctx.stdout.clone(), false)),
        Some("/dev/stderr") => return Ok((ctx.stderr.clone(), false)),
        _ => {}
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await
        .map_err(|e| ShellError::io(path.display().to_string(), e))?;
    Ok((OutputSink::file(file), true))
}

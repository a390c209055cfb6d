//! Commands that act on interpreter state and so run inside the engine.

use tracing::debug;

use crate::builtins::resolve_path;
use crate::dispatch::Intrinsic;
use crate::engine::Engine;
use crate::error::{ShellError, ShellResult, EXIT_FAILURE, EXIT_USAGE};
use crate::parser;
use crate::sandbox::Action;

use super::context::ExecContext;
use super::scope::Flow;

impl Engine {
    pub(crate) async fn run_intrinsic(
        &self,
        ctx: &mut ExecContext,
        intrinsic: Intrinsic,
        args: &[String],
    ) -> ShellResult<Flow> {
        match intrinsic {
            Intrinsic::Break => Ok(loop_control(ctx, intrinsic, args, Flow::Break).await),
            Intrinsic::Continue => Ok(loop_control(ctx, intrinsic, args, Flow::Continue).await),
            Intrinsic::Return => {
                let code = exit_status_arg(ctx, intrinsic, args).await;
                ctx.scope.last_status = code;
                Ok(Flow::Return)
            }
            Intrinsic::Exit => {
                let code = exit_status_arg(ctx, intrinsic, args).await;
                ctx.scope.last_status = code;
                Ok(Flow::Exit(code))
            }
            Intrinsic::Export => export(ctx, args).await,
            Intrinsic::Unset => {
                for name in args {
                    ctx.env.unset_env(name);
                    if ctx.scope.in_function {
                        ctx.scope.mark_exported(name);
                    }
                }
                Ok(ctx.status(0))
            }
            Intrinsic::Set => set(ctx, args).await,
            Intrinsic::Cd => cd(ctx, args).await,
            Intrinsic::Source => self.source(ctx, args).await,
            Intrinsic::Import => {
                if args.is_empty() {
                    return Ok(usage(ctx, intrinsic, "module path required").await);
                }
                let cwd = ctx.env.working_dir();
                for path in args {
                    let key = self.modules.resolve_from(path, &cwd)?;
                    self.security.enforce(&Action::ReadFile { path: key.clone() })?;
                    let entry = self.modules.entry_for(&key)?;
                    if entry != key {
                        self.security.enforce(&Action::ReadFile { path: entry })?;
                    }
                    let module = self.modules.load_resolved(key).await?;
                    debug!(module = %module.name, exports = module.exports.len(), "imported");
                    ctx.scope.add_import(module.path.clone());
                }
                Ok(ctx.status(0))
            }
            Intrinsic::True => Ok(ctx.status(0)),
            Intrinsic::False => Ok(ctx.status(EXIT_FAILURE)),
        }
    }

    /// `source FILE [args...]`: run FILE in the current scope.
    async fn source(&self, ctx: &mut ExecContext, args: &[String]) -> ShellResult<Flow> {
        let Some(file) = args.first() else {
            return Ok(usage(ctx, Intrinsic::Source, "filename argument required").await);
        };
        let path = resolve_path(&ctx.env.working_dir(), file);
        self.security.enforce(&Action::ReadFile { path: path.clone() })?;
        let script = parser::parse_file(&path)?;

        let saved = (args.len() > 1)
            .then(|| std::mem::replace(&mut ctx.scope.positional.args, args[1..].to_vec()));
        ctx.scope.sourcing += 1;
        let flow = self.run_nodes(ctx, &script.nodes).await;
        ctx.scope.sourcing -= 1;
        if let Some(previous) = saved {
            ctx.scope.positional.args = previous;
        }

        Ok(match flow? {
            Flow::Return => Flow::Normal,
            other => other,
        })
    }
}

/// Write `shode: name: message` and set a usage status.
async fn usage(ctx: &mut ExecContext, intrinsic: Intrinsic, message: &str) -> Flow {
    let _ = ctx
        .stderr
        .write_str(&format!("shode: {intrinsic}: {message}\n"))
        .await;
    ctx.status(EXIT_USAGE)
}

async fn loop_control(
    ctx: &mut ExecContext,
    intrinsic: Intrinsic,
    args: &[String],
    make: fn(u32) -> Flow,
) -> Flow {
    let count = match args.first() {
        None => 1,
        Some(arg) => match arg.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return usage(ctx, intrinsic, &format!("{arg}: loop count out of range")).await,
        },
    };
    ctx.scope.last_status = 0;
    if ctx.scope.loop_depth == 0 {
        return Flow::Normal;
    }
    make(count.min(ctx.scope.loop_depth))
}

/// `return`/`exit` argument, defaulting to `$?`, wrapped to 0..=255.
async fn exit_status_arg(ctx: &mut ExecContext, intrinsic: Intrinsic, args: &[String]) -> i32 {
    match args.first() {
        None => ctx.scope.last_status,
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) => n.rem_euclid(256) as i32,
            Err(_) => {
                usage(ctx, intrinsic, &format!("{arg}: numeric argument required")).await;
                EXIT_USAGE
            }
        },
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `export NAME[=value]...`
async fn export(ctx: &mut ExecContext, args: &[String]) -> ShellResult<Flow> {
    if args.is_empty() {
        let listing: String = ctx
            .env
            .all_vars()
            .iter()
            .map(|(k, v)| format!("export {k}={v}\n"))
            .collect();
        ctx.stdout
            .write_str(&listing)
            .await
            .map_err(|e| ShellError::io("stdout", e))?;
        return Ok(ctx.status(0));
    }

    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_identifier(name) {
            let _ = ctx
                .stderr
                .write_str(&format!("shode: export: '{arg}': not a valid identifier\n"))
                .await;
            status = EXIT_FAILURE;
            continue;
        }
        if let Some(value) = value {
            ctx.env.export_env(name, value);
        }
        if ctx.scope.in_function {
            ctx.scope.mark_exported(name);
        }
    }
    Ok(ctx.status(status))
}

/// `set [-e|+e] [-o|+o option]`; no arguments lists variables.
async fn set(ctx: &mut ExecContext, args: &[String]) -> ShellResult<Flow> {
    if args.is_empty() {
        let listing: String = ctx
            .env
            .all_vars()
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();
        ctx.stdout
            .write_str(&listing)
            .await
            .map_err(|e| ShellError::io("stdout", e))?;
        return Ok(ctx.status(0));
    }

    let mut options = ctx.scope.options;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-e" => options.errexit = true,
            "+e" => options.errexit = false,
            "-o" | "+o" => {
                let enable = arg == "-o";
                match iter.next().map(String::as_str) {
                    Some("errexit") => options.errexit = enable,
                    Some("pipefail") => options.pipefail = enable,
                    Some(other) => {
                        return Ok(usage(ctx, Intrinsic::Set, &format!("{other}: invalid option name")).await)
                    }
                    None => {
                        let on_off = |b: bool| if b { "on" } else { "off" };
                        let listing = format!(
                            "errexit\t{}\npipefail\t{}\n",
                            on_off(options.errexit),
                            on_off(options.pipefail)
                        );
                        ctx.stdout
                            .write_str(&listing)
                            .await
                            .map_err(|e| ShellError::io("stdout", e))?;
                    }
                }
            }
            other => return Ok(usage(ctx, Intrinsic::Set, &format!("{other}: invalid option")).await),
        }
    }
    debug!(errexit = options.errexit, pipefail = options.pipefail, "options changed");
    ctx.scope.options = options;
    Ok(ctx.status(0))
}

/// `cd [dir|-]`
async fn cd(ctx: &mut ExecContext, args: &[String]) -> ShellResult<Flow> {
    let (target, announce) = match args.first().map(String::as_str) {
        None => match ctx.env.get_env("HOME") {
            Some(home) => (home, false),
            None => {
                let _ = ctx.stderr.write_str("shode: cd: HOME not set\n").await;
                return Ok(ctx.status(EXIT_FAILURE));
            }
        },
        Some("-") => match ctx.env.get_env("OLDPWD") {
            Some(previous) => (previous, true),
            None => {
                let _ = ctx.stderr.write_str("shode: cd: OLDPWD not set\n").await;
                return Ok(ctx.status(EXIT_FAILURE));
            }
        },
        Some(dir) => (dir.to_string(), false),
    };
    let resolved = ctx.env.change_dir(&target)?;
    if announce {
        ctx.stdout
            .write_str(&format!("{}\n", resolved.display()))
            .await
            .map_err(|e| ShellError::io("stdout", e))?;
    }
    Ok(ctx.status(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("NAME"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}

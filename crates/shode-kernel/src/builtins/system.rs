//! Environment and system builtins: getenv, setenv, pwd, sleep, now.

use async_trait::async_trait;

use crate::error::{ShellError, ShellResult, EXIT_FAILURE};

use super::{str_arg, Builtin, BuiltinIo, Param, ParamType, RegistryBuilder, Signature, Value};

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(GetEnv)
        .register(SetEnv)
        .register(Pwd)
        .register(Sleep)
        .register(Now)
}

struct GetEnv;

#[async_trait]
impl Builtin for GetEnv {
    fn signature(&self) -> Signature {
        Signature::new("getenv")
            .describe("Print a variable; fails when it is unset")
            .param(Param::required("name", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        match io.env.get_env(str_arg(&args, 0).unwrap_or_default()) {
            Some(value) => {
                io.out_line(&value).await?;
                Ok(0)
            }
            None => Ok(EXIT_FAILURE),
        }
    }
}

/// Sets a variable in the caller's current scope.
struct SetEnv;

#[async_trait]
impl Builtin for SetEnv {
    fn signature(&self) -> Signature {
        Signature::new("setenv")
            .describe("Set a variable in the current scope")
            .param(Param::required("name", ParamType::String))
            .param(Param::required("value", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let name = str_arg(&args, 0).unwrap_or_default();
        if name.is_empty() || name.contains('=') {
            io.err(&format!("setenv: invalid name {name:?}\n")).await?;
            return Ok(EXIT_FAILURE);
        }
        io.env.set_env(name, str_arg(&args, 1).unwrap_or_default());
        Ok(0)
    }
}

struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    fn signature(&self) -> Signature {
        Signature::new("pwd").describe("Print the working directory")
    }

    async fn call(&self, _args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let cwd = io.env.working_dir();
        io.out_line(&cwd.to_string_lossy()).await?;
        Ok(0)
    }
}

/// `sleep duration`, interruptible by cancellation.
struct Sleep;

#[async_trait]
impl Builtin for Sleep {
    fn signature(&self) -> Signature {
        Signature::new("sleep")
            .describe("Pause for a duration (5, 250ms, 1m30s)")
            .param(Param::required("duration", ParamType::Duration))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let duration = args.first().and_then(Value::as_duration).unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(0),
            _ = io.cancel.cancelled() => Err(ShellError::cancelled()),
        }
    }
}

/// `now [format]`: local time, RFC 3339 unless a strftime format is given.
struct Now;

#[async_trait]
impl Builtin for Now {
    fn signature(&self) -> Signature {
        Signature::new("now")
            .describe("Print the current local time")
            .param(Param::optional("format", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        use std::fmt::Write as _;

        let now = chrono::Local::now();
        let text = match str_arg(&args, 0) {
            None => now.to_rfc3339(),
            Some(format) => {
                let mut out = String::new();
                if write!(out, "{}", now.format(format)).is_err() {
                    io.err(&format!("now: invalid format {format:?}\n")).await?;
                    return Ok(EXIT_FAILURE);
                }
                out
            }
        };
        io.out_line(&text).await?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::Harness;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn setenv_then_getenv() {
        let mut h = Harness::new(&std::env::temp_dir());
        assert_eq!(h.run(&SetEnv, &["GREETING", "hi there"]).await.unwrap(), 0);
        assert_eq!(h.run(&GetEnv, &["GREETING"]).await.unwrap(), 0);
        assert_eq!(h.run(&GetEnv, &["MISSING"]).await.unwrap(), 1);
        assert_eq!(h.stdout(), "hi there\n");
    }

    #[tokio::test]
    async fn pwd_prints_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new(dir.path());
        h.run(&Pwd, &[]).await.unwrap();
        assert_eq!(h.stdout(), format!("{}\n", dir.path().display()));
    }

    #[tokio::test]
    async fn sleep_stops_on_cancel() {
        let mut h = Harness::new(&std::env::temp_dir());
        let cancel = h.io.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let started = Instant::now();
        let err = h.run(&Sleep, &["30s"]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn now_honours_format() {
        let mut h = Harness::new(&std::env::temp_dir());
        h.run(&Now, &["%Y"]).await.unwrap();
        assert_eq!(h.stdout().trim().len(), 4);
    }
}

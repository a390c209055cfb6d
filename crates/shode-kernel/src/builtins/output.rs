//! echo, print, println, error, errorln.

use async_trait::async_trait;

use crate::error::ShellResult;

use super::{list_arg, Builtin, BuiltinIo, Param, ParamType, RegistryBuilder, Signature, Value};

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(Echo)
        .register(Print::new("print", Stream::Out, false))
        .register(Print::new("println", Stream::Out, true))
        .register(Print::new("error", Stream::Err, false))
        .register(Print::new("errorln", Stream::Err, true))
}

/// `echo [-n] args...`
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    fn signature(&self) -> Signature {
        Signature::new("echo")
            .describe("Print arguments separated by spaces; -n omits the newline")
            .param(Param::optional("args", ParamType::StringList))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let mut words = list_arg(&args, 0);
        let newline = if words.first().map(String::as_str) == Some("-n") {
            words.remove(0);
            false
        } else {
            true
        };
        let mut text = words.join(" ");
        if newline {
            text.push('\n');
        }
        io.out(&text).await?;
        Ok(0)
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

struct Print {
    name: &'static str,
    stream: Stream,
    newline: bool,
}

impl Print {
    fn new(name: &'static str, stream: Stream, newline: bool) -> Self {
        Self { name, stream, newline }
    }
}

#[async_trait]
impl Builtin for Print {
    fn signature(&self) -> Signature {
        let target = match self.stream {
            Stream::Out => "stdout",
            Stream::Err => "stderr",
        };
        let describe = if self.newline {
            format!("Write arguments to {target} followed by a newline")
        } else {
            format!("Write arguments to {target}")
        };
        Signature::new(self.name)
            .describe(describe)
            .param(Param::optional("args", ParamType::StringList))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let mut text = list_arg(&args, 0).join(" ");
        if self.newline {
            text.push('\n');
        }
        match self.stream {
            Stream::Out => io.out(&text).await?,
            Stream::Err => io.err(&text).await?,
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::Harness;

    #[tokio::test]
    async fn echo_joins_and_terminates() {
        let mut h = Harness::new(&std::env::temp_dir());
        assert_eq!(h.run(&Echo, &["hello", "world"]).await.unwrap(), 0);
        assert_eq!(h.stdout(), "hello world\n");
    }

    #[tokio::test]
    async fn echo_dash_n_skips_newline() {
        let mut h = Harness::new(&std::env::temp_dir());
        h.run(&Echo, &["-n", "x"]).await.unwrap();
        h.run(&Echo, &[]).await.unwrap();
        assert_eq!(h.stdout(), "x\n");
    }

    #[tokio::test]
    async fn errorln_goes_to_stderr() {
        let mut h = Harness::new(&std::env::temp_dir());
        h.run(&Print::new("errorln", Stream::Err, true), &["bad", "thing"])
            .await
            .unwrap();
        assert_eq!(h.stdout(), "");
        assert_eq!(h.err.to_string_lossy(), "bad thing\n");
    }
}

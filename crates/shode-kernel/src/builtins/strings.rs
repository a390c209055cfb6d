//! Pure string builtins. None of them touch the sandbox.

use async_trait::async_trait;
use regex::Regex;

use crate::error::{ShellResult, EXIT_FAILURE, EXIT_USAGE};

use super::{list_arg, str_arg, Builtin, BuiltinIo, Param, ParamType, RegistryBuilder, Signature, Value};

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(Transform::new("upper", "Convert text to upper case", |s| s.to_uppercase()))
        .register(Transform::new("lower", "Convert text to lower case", |s| s.to_lowercase()))
        .register(Transform::new("trim", "Strip leading and trailing whitespace", |s| {
            s.trim().to_string()
        }))
        .register(Transform::new("len", "Print the length of text in characters", |s| {
            s.chars().count().to_string()
        }))
        .register(Predicate::new("contains", "Succeed if text contains the substring", |a, b| {
            a.contains(b)
        }))
        .register(Predicate::new("hasprefix", "Succeed if text starts with the prefix", |a, b| {
            a.starts_with(b)
        }))
        .register(Predicate::new("hassuffix", "Succeed if text ends with the suffix", |a, b| {
            a.ends_with(b)
        }))
        .register(Replace)
        .register(Rematch)
        .register(Resub)
        .register(GrepLines)
        .register(Repeat)
        .register(Split)
        .register(Join)
}

/// Text taken from the arguments, or from stdin when there are none.
async fn text_input(args: &[Value], index: usize, io: &BuiltinIo) -> ShellResult<String> {
    let words = list_arg(args, index);
    if words.is_empty() {
        let input = io.read_stdin().await?;
        Ok(input.strip_suffix('\n').unwrap_or(&input).to_string())
    } else {
        Ok(words.join(" "))
    }
}

/// A one-argument text to text mapping.
struct Transform {
    name: &'static str,
    describe: &'static str,
    apply: fn(&str) -> String,
}

impl Transform {
    fn new(name: &'static str, describe: &'static str, apply: fn(&str) -> String) -> Self {
        Self { name, describe, apply }
    }
}

#[async_trait]
impl Builtin for Transform {
    fn signature(&self) -> Signature {
        Signature::new(self.name)
            .describe(self.describe)
            .param(Param::optional("text", ParamType::StringList))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = text_input(&args, 0, io).await?;
        io.out_line(&(self.apply)(&text)).await?;
        Ok(0)
    }
}

/// A two-argument test reported through the exit code.
struct Predicate {
    name: &'static str,
    describe: &'static str,
    test: fn(&str, &str) -> bool,
}

impl Predicate {
    fn new(name: &'static str, describe: &'static str, test: fn(&str, &str) -> bool) -> Self {
        Self { name, describe, test }
    }
}

#[async_trait]
impl Builtin for Predicate {
    fn signature(&self) -> Signature {
        Signature::new(self.name)
            .describe(self.describe)
            .param(Param::required("text", ParamType::String))
            .param(Param::required("pattern", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, _io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let pattern = str_arg(&args, 1).unwrap_or_default();
        Ok(if (self.test)(text, pattern) { 0 } else { EXIT_FAILURE })
    }
}

/// `replace text from to`
struct Replace;

#[async_trait]
impl Builtin for Replace {
    fn signature(&self) -> Signature {
        Signature::new("replace")
            .describe("Replace every occurrence of a substring")
            .param(Param::required("text", ParamType::String))
            .param(Param::required("from", ParamType::String))
            .param(Param::required("to", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let from = str_arg(&args, 1).unwrap_or_default();
        let to = str_arg(&args, 2).unwrap_or_default();
        let replaced = if from.is_empty() {
            text.to_string()
        } else {
            text.replace(from, to)
        };
        io.out_line(&replaced).await?;
        Ok(0)
    }
}

/// Compile `pattern`, reporting a bad one on stderr as `name: invalid pattern`.
async fn compile(name: &str, pattern: &str, io: &BuiltinIo) -> ShellResult<Option<Regex>> {
    match Regex::new(pattern) {
        Ok(re) => Ok(Some(re)),
        Err(e) => {
            io.err(&format!("{name}: invalid pattern: {e}\n")).await?;
            Ok(None)
        }
    }
}

/// `rematch text pattern`: succeed if the regex matches anywhere in text.
struct Rematch;

#[async_trait]
impl Builtin for Rematch {
    fn signature(&self) -> Signature {
        Signature::new("rematch")
            .describe("Succeed if text matches the regular expression")
            .param(Param::required("text", ParamType::String))
            .param(Param::required("pattern", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let Some(re) = compile("rematch", str_arg(&args, 1).unwrap_or_default(), io).await? else {
            return Ok(EXIT_USAGE);
        };
        Ok(if re.is_match(text) { 0 } else { EXIT_FAILURE })
    }
}

/// `resub text pattern replacement`: replace every regex match. `$1` and
/// `${name}` in the replacement refer to capture groups.
struct Resub;

#[async_trait]
impl Builtin for Resub {
    fn signature(&self) -> Signature {
        Signature::new("resub")
            .describe("Replace every match of a regular expression")
            .param(Param::required("text", ParamType::String))
            .param(Param::required("pattern", ParamType::String))
            .param(Param::required("replacement", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let replacement = str_arg(&args, 2).unwrap_or_default();
        let Some(re) = compile("resub", str_arg(&args, 1).unwrap_or_default(), io).await? else {
            return Ok(EXIT_USAGE);
        };
        io.out_line(&re.replace_all(text, replacement)).await?;
        Ok(0)
    }
}

/// `greplines pattern [text...]`: print the lines of text, or stdin, that
/// match. Fails when nothing matched.
struct GrepLines;

#[async_trait]
impl Builtin for GrepLines {
    fn signature(&self) -> Signature {
        Signature::new("greplines")
            .describe("Print lines matching a regular expression")
            .param(Param::required("pattern", ParamType::String))
            .param(Param::optional("text", ParamType::StringList))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let Some(re) = compile("greplines", str_arg(&args, 0).unwrap_or_default(), io).await? else {
            return Ok(EXIT_USAGE);
        };
        let text = text_input(&args, 1, io).await?;
        let mut out = String::new();
        for line in text.lines().filter(|line| re.is_match(line)) {
            out.push_str(line);
            out.push('\n');
        }
        if out.is_empty() {
            return Ok(EXIT_FAILURE);
        }
        io.out(&out).await?;
        Ok(0)
    }
}

/// `repeat text count`
struct Repeat;

#[async_trait]
impl Builtin for Repeat {
    fn signature(&self) -> Signature {
        Signature::new("repeat")
            .describe("Print text repeated count times")
            .param(Param::required("text", ParamType::String))
            .param(Param::required("count", ParamType::Int))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let count = args.get(1).and_then(Value::as_int).unwrap_or(0);
        if count < 0 {
            io.err("repeat: count must not be negative\n").await?;
            return Ok(EXIT_FAILURE);
        }
        io.out_line(&text.repeat(count as usize)).await?;
        Ok(0)
    }
}

/// `split text [sep]`: one piece per line. Without `sep`, splits on whitespace.
struct Split;

#[async_trait]
impl Builtin for Split {
    fn signature(&self) -> Signature {
        Signature::new("split")
            .describe("Split text on a separator, one piece per line")
            .param(Param::required("text", ParamType::String))
            .param(Param::optional("sep", ParamType::String))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let text = str_arg(&args, 0).unwrap_or_default();
        let pieces: Vec<&str> = match str_arg(&args, 1) {
            Some(sep) if !sep.is_empty() => text.split(sep).collect(),
            _ => text.split_whitespace().collect(),
        };
        let mut out = String::new();
        for piece in pieces {
            out.push_str(piece);
            out.push('\n');
        }
        io.out(&out).await?;
        Ok(0)
    }
}

/// `join sep items...`. Without items, joins the lines of stdin.
struct Join;

#[async_trait]
impl Builtin for Join {
    fn signature(&self) -> Signature {
        Signature::new("join")
            .describe("Join items, or stdin lines, with a separator")
            .param(Param::required("sep", ParamType::String))
            .param(Param::optional("items", ParamType::StringList))
    }

    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32> {
        let sep = str_arg(&args, 0).unwrap_or_default().to_string();
        let mut items = list_arg(&args, 1);
        if items.is_empty() {
            items = io.read_stdin().await?.lines().map(str::to_string).collect();
        }
        io.out_line(&items.join(&sep)).await?;
        Ok(0)
    }
}

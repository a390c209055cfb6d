//! Native commands callable from scripts.
//!
//! # Architecture
//!
//! ```text
//! BuiltinRegistry (immutable, Arc-shared)
//! ├── output   echo print println error errorln
//! ├── files    cat write append exists isdir isfile mkdir rm ls
//! ├── strings  upper lower trim contains replace hasprefix hassuffix
//! │            repeat split join len
//! ├── system   getenv setenv pwd sleep now
//! └── text     head tail wc tee
//! ```
//!
//! The engine owns the calling protocol: it coerces the raw string arguments
//! against [`Builtin::signature`], runs every [`Action`] returned by
//! [`Builtin::actions`] through the security checker, and only then calls
//! [`Builtin::call`].

mod coerce;
mod files;
mod output;
mod strings;
mod system;
mod text;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::env::EnvironmentManager;
use crate::error::{ShellError, ShellResult};
use crate::sandbox::Action;
use crate::scheduler::{InputSource, OutputSink};

pub use coerce::{coerce_args, parse_bool, parse_duration, Value};

/// Declared type of a builtin parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Int,
    Bool,
    Duration,
    /// Variadic in last position, whitespace-split elsewhere.
    StringList,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::Duration => "duration",
            ParamType::StringList => "[]string",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    pub optional: bool,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

/// Name, help text and typed parameters of a builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub description: String,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    /// `name <a:string> [b:int]`
    pub fn usage(&self) -> String {
        let mut out = self.name.clone();
        for p in &self.params {
            let inner = format!("{}:{}", p.name, p.ty);
            if p.optional {
                out.push_str(&format!(" [{inner}]"));
            } else {
                out.push_str(&format!(" <{inner}>"));
            }
        }
        out
    }
}

/// Streams and state handed to a builtin call.
pub struct BuiltinIo {
    pub stdin: InputSource,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub env: Arc<EnvironmentManager>,
    pub cancel: CancellationToken,
}

impl BuiltinIo {
    pub fn new(
        stdin: InputSource,
        stdout: OutputSink,
        stderr: OutputSink,
        env: Arc<EnvironmentManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            env,
            cancel,
        }
    }

    pub async fn out(&self, text: &str) -> ShellResult<()> {
        self.stdout
            .write_str(text)
            .await
            .map_err(|e| ShellError::io("stdout", e))
    }

    pub async fn err(&self, text: &str) -> ShellResult<()> {
        self.stderr
            .write_str(text)
            .await
            .map_err(|e| ShellError::io("stderr", e))
    }

    /// Write `text` followed by a newline unless it already ends in one.
    pub async fn out_line(&self, text: &str) -> ShellResult<()> {
        if text.ends_with('\n') {
            self.out(text).await
        } else {
            self.out(&format!("{text}\n")).await
        }
    }

    pub async fn read_stdin(&self) -> ShellResult<String> {
        self.stdin
            .read_to_string()
            .await
            .map_err(|e| ShellError::io("stdin", e))
    }

    /// Resolve a path argument against the current working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.env.working_dir(), path)
    }
}

pub(crate) fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

/// A natively implemented command.
#[async_trait]
pub trait Builtin: Send + Sync {
    fn signature(&self) -> Signature;

    /// Effects the call will have, checked before [`Builtin::call`] runs.
    /// Pure string builtins return nothing.
    fn actions(&self, _args: &[Value], _cwd: &Path) -> Vec<Action> {
        Vec::new()
    }

    /// Run with coerced arguments and return the exit code.
    async fn call(&self, args: Vec<Value>, io: &mut BuiltinIo) -> ShellResult<i32>;
}

/// Immutable name to builtin mapping.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: HashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every builtin shipped with the kernel.
    pub fn standard() -> Self {
        let builder = Self::builder();
        let builder = output::register(builder);
        let builder = files::register(builder);
        let builder = strings::register(builder);
        let builder = system::register(builder);
        text::register(builder).build()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, aliases included, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Usage line per registered name.
    pub fn usages(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(name, b)| (name.clone(), b.signature().usage()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, Arc<dyn Builtin>>,
    aliases: Vec<(String, String)>,
}

impl RegistryBuilder {
    /// Register under the name in the builtin's signature. A later
    /// registration with the same name replaces the earlier one.
    pub fn register(mut self, builtin: impl Builtin + 'static) -> Self {
        let name = builtin.signature().name;
        self.entries.insert(name, Arc::new(builtin));
        self
    }

    /// Make `alias` resolve to whatever `target` is at build time.
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), target.into()));
        self
    }

    pub fn build(mut self) -> BuiltinRegistry {
        for (alias, target) in self.aliases {
            if let Some(b) = self.entries.get(&target).cloned() {
                self.entries.insert(alias, b);
            } else {
                tracing::warn!(%alias, %target, "alias to unknown builtin ignored");
            }
        }
        BuiltinRegistry {
            entries: self.entries,
        }
    }
}

/// Strings held by a list argument, or nothing when it was omitted.
pub(crate) fn list_arg(args: &[Value], index: usize) -> Vec<String> {
    args.get(index)
        .and_then(Value::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

pub(crate) fn str_arg(args: &[Value], index: usize) -> Option<&str> {
    args.get(index).and_then(Value::as_str)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_aliases() {
        let registry = BuiltinRegistry::standard();
        for name in ["echo", "cat", "readfile", "write", "writefile", "rm", "delete", "ls", "list", "tee"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert_eq!(
            registry.get("readfile").map(|b| b.signature().name),
            Some("cat".to_string())
        );
        assert!(!registry.contains("cd"));
    }

    #[test]
    fn usage_marks_optional_params() {
        let sig = Signature::new("repeat")
            .param(Param::required("text", ParamType::String))
            .param(Param::optional("count", ParamType::Int));
        assert_eq!(sig.usage(), "repeat <text:string> [count:int]");
    }
}

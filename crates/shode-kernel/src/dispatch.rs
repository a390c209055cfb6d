//! Command resolution: which of the dispatch kinds a name refers to.
//!
//! ```text
//! Command{name} ──▶ resolve()
//!                     │
//!                     ├── Intrinsic       cd export set source import ...
//!                     ├── UserFunction    defined in the current scope
//!                     ├── ModuleExport    exported by an imported module
//!                     ├── Builtin         registry entry, typed arguments
//!                     ├── External        executable found on PATH
//!                     └── NotFound        exit 127
//! ```
//!
//! Intrinsics change interpreter state, so they are checked first and
//! cannot be shadowed. After them the order is fixed: a script-defined
//! function wins over an imported export, which wins over a builtin, which
//! wins over a program on `PATH`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::FunctionDef;
use crate::builtins::{Builtin, BuiltinRegistry};
use crate::env::EnvironmentManager;
use crate::interpreter::CommandKind;
use crate::modules::{Module, ModuleResolver};
use crate::scheduler::resolve_executable;

/// Commands implemented by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Break,
    Continue,
    Return,
    Exit,
    Export,
    Unset,
    Set,
    Cd,
    Source,
    Import,
    True,
    False,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "break" => Intrinsic::Break,
            "continue" => Intrinsic::Continue,
            "return" => Intrinsic::Return,
            "exit" => Intrinsic::Exit,
            "export" => Intrinsic::Export,
            "unset" => Intrinsic::Unset,
            "set" => Intrinsic::Set,
            "cd" => Intrinsic::Cd,
            "source" | "." => Intrinsic::Source,
            "import" => Intrinsic::Import,
            "true" => Intrinsic::True,
            "false" => Intrinsic::False,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Break => "break",
            Intrinsic::Continue => "continue",
            Intrinsic::Return => "return",
            Intrinsic::Exit => "exit",
            Intrinsic::Export => "export",
            Intrinsic::Unset => "unset",
            Intrinsic::Set => "set",
            Intrinsic::Cd => "cd",
            Intrinsic::Source => "source",
            Intrinsic::Import => "import",
            Intrinsic::True => "true",
            Intrinsic::False => "false",
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a command name resolved to.
#[derive(Clone)]
pub enum DispatchTarget {
    Intrinsic(Intrinsic),
    UserFunction(Arc<FunctionDef>),
    ModuleExport {
        module: Arc<Module>,
        function: Arc<FunctionDef>,
    },
    Builtin(Arc<dyn Builtin>),
    External(PathBuf),
    NotFound,
}

impl DispatchTarget {
    /// `None` for [`DispatchTarget::NotFound`].
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            DispatchTarget::Intrinsic(_) => Some(CommandKind::Intrinsic),
            DispatchTarget::UserFunction(_) => Some(CommandKind::UserFunction),
            DispatchTarget::ModuleExport { .. } => Some(CommandKind::ModuleExport),
            DispatchTarget::Builtin(_) => Some(CommandKind::Builtin),
            DispatchTarget::External(_) => Some(CommandKind::External),
            DispatchTarget::NotFound => None,
        }
    }
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Intrinsic(i) => f.debug_tuple("Intrinsic").field(i).finish(),
            DispatchTarget::UserFunction(def) => f.debug_tuple("UserFunction").field(&def.name).finish(),
            DispatchTarget::ModuleExport { module, function } => f
                .debug_struct("ModuleExport")
                .field("module", &module.name)
                .field("function", &function.name)
                .finish(),
            DispatchTarget::Builtin(b) => f.debug_tuple("Builtin").field(&b.signature().name).finish(),
            DispatchTarget::External(path) => f.debug_tuple("External").field(path).finish(),
            DispatchTarget::NotFound => f.write_str("NotFound"),
        }
    }
}

/// What [`resolve`] looks names up in.
pub struct Lookup<'a> {
    pub functions: &'a HashMap<String, Arc<FunctionDef>>,
    /// Cache keys of the modules imported into the calling scope.
    pub imports: &'a [PathBuf],
    pub modules: &'a ModuleResolver,
    pub builtins: &'a BuiltinRegistry,
    pub env: &'a EnvironmentManager,
}

/// Resolve `name` in dispatch order.
pub async fn resolve(name: &str, lookup: &Lookup<'_>) -> DispatchTarget {
    if let Some(intrinsic) = Intrinsic::from_name(name) {
        return DispatchTarget::Intrinsic(intrinsic);
    }
    if let Some(def) = lookup.functions.get(name) {
        return DispatchTarget::UserFunction(def.clone());
    }
    if let Some((module, function)) = lookup.modules.find_export(name, lookup.imports).await {
        return DispatchTarget::ModuleExport { module, function };
    }
    if let Some(builtin) = lookup.builtins.get(name) {
        return DispatchTarget::Builtin(builtin);
    }
    match resolve_executable(name, &lookup.env.path(), &lookup.env.working_dir()) {
        Some(path) => DispatchTarget::External(path),
        None => DispatchTarget::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;
    use crate::ast::Position;
    use crate::modules::ModuleSettings;

    #[rstest]
    #[case("cd", Some(Intrinsic::Cd))]
    #[case(".", Some(Intrinsic::Source))]
    #[case("source", Some(Intrinsic::Source))]
    #[case("import", Some(Intrinsic::Import))]
    #[case("echo", None)]
    fn intrinsic_names(#[case] name: &str, #[case] expected: Option<Intrinsic>) {
        assert_eq!(Intrinsic::from_name(name), expected);
    }

    fn env_with_path(dir: &std::path::Path) -> Arc<EnvironmentManager> {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), dir.display().to_string());
        Arc::new(EnvironmentManager::new(vars, dir))
    }

    #[tokio::test]
    async fn function_beats_builtin_and_intrinsic_beats_function() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with_path(dir.path());
        let modules = ModuleResolver::new(env.clone(), ModuleSettings::default());
        let builtins = BuiltinRegistry::standard();

        let mut functions = HashMap::new();
        for name in ["ls", "cd"] {
            functions.insert(
                name.to_string(),
                Arc::new(FunctionDef {
                    name: name.to_string(),
                    body: Vec::new(),
                    pos: Position::default(),
                }),
            );
        }
        let lookup = Lookup {
            functions: &functions,
            imports: &[],
            modules: &modules,
            builtins: &builtins,
            env: &env,
        };

        assert_eq!(resolve("ls", &lookup).await.kind(), Some(CommandKind::UserFunction));
        assert_eq!(resolve("cd", &lookup).await.kind(), Some(CommandKind::Intrinsic));
        assert_eq!(resolve("cat", &lookup).await.kind(), Some(CommandKind::Builtin));
        assert!(matches!(
            resolve("definitely-not-a-command", &lookup).await,
            DispatchTarget::NotFound
        ));
    }

    #[tokio::test]
    async fn falls_back_to_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mytool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let env = env_with_path(dir.path());
        let modules = ModuleResolver::new(env.clone(), ModuleSettings::default());
        let builtins = BuiltinRegistry::empty();
        let functions = HashMap::new();
        let lookup = Lookup {
            functions: &functions,
            imports: &[],
            modules: &modules,
            builtins: &builtins,
            env: &env,
        };

        match resolve("mytool", &lookup).await {
            DispatchTarget::External(path) => assert_eq!(path, tool),
            other => panic!("expected external, got {other:?}"),
        }
    }
}

//! Interpreter state that is not environment variables.
//!
//! Variables, cwd and PATH live in the [`EnvironmentManager`]; everything
//! else a script can change (function table, imports, positional
//! parameters, `$?`, `set` options) lives in a [`Scope`]. Function calls,
//! subshells and pipeline stages each get their own copy.
//!
//! [`EnvironmentManager`]: crate::env::EnvironmentManager

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::FunctionDef;

/// How a statement finished, beyond its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    /// Leave this many enclosing loops.
    Break(u32),
    /// Skip to the next iteration of the n-th enclosing loop.
    Continue(u32),
    Return,
    Exit(i32),
}

/// `$0` and `$1`..
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positional {
    pub zero: String,
    pub args: Vec<String>,
}

impl Default for Positional {
    fn default() -> Self {
        Self {
            zero: "shode".to_string(),
            args: Vec::new(),
        }
    }
}

impl Positional {
    /// `$n` for n >= 1; empty when unset.
    pub fn get(&self, n: u8) -> String {
        if n == 0 {
            return self.zero.clone();
        }
        self.args.get(usize::from(n) - 1).cloned().unwrap_or_default()
    }
}

/// `set -e` / `set -o pipefail`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShellOptions {
    pub errexit: bool,
    pub pipefail: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    pub functions: HashMap<String, Arc<FunctionDef>>,
    /// Cache keys of imported modules, in import order.
    pub imports: Vec<PathBuf>,
    pub positional: Positional,
    pub last_status: i32,
    pub options: ShellOptions,
    /// Names `export`ed inside the current function call.
    pub exports: Vec<String>,
    pub in_function: bool,
    pub sourcing: usize,
    pub loop_depth: u32,
    /// Nesting of function calls.
    pub depth: u32,
}

impl Scope {
    pub fn new(options: ShellOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The scope a function body runs in: same functions, imports and
    /// options, fresh positional parameters and export list.
    pub fn for_call(&self, args: Vec<String>) -> Self {
        Self {
            functions: self.functions.clone(),
            imports: self.imports.clone(),
            positional: Positional {
                zero: self.positional.zero.clone(),
                args,
            },
            last_status: self.last_status,
            options: self.options,
            exports: Vec::new(),
            in_function: true,
            sourcing: 0,
            loop_depth: 0,
            depth: self.depth + 1,
        }
    }

    pub fn mark_exported(&mut self, name: &str) {
        if !self.exports.iter().any(|n| n == name) {
            self.exports.push(name.to_string());
        }
    }

    pub fn add_import(&mut self, key: PathBuf) {
        if !self.imports.contains(&key) {
            self.imports.push(key);
        }
    }

    /// Apply the changes `run` made relative to `baseline`, the state it
    /// started from. Other writers' changes since `baseline` are kept unless
    /// `run` changed the same item.
    pub fn merge_from(&mut self, baseline: &Scope, run: Scope) {
        for (name, def) in run.functions {
            let unchanged = baseline
                .functions
                .get(&name)
                .is_some_and(|old| Arc::ptr_eq(old, &def));
            if !unchanged {
                self.functions.insert(name, def);
            }
        }
        for key in run.imports {
            self.add_import(key);
        }
        if run.options != baseline.options {
            self.options = run.options;
        }
        if run.positional != baseline.positional {
            self.positional = run.positional;
        }
        self.last_status = run.last_status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_lookup() {
        let p = Positional {
            zero: "script.sh".into(),
            args: vec!["a".into(), "b".into()],
        };
        assert_eq!(p.get(0), "script.sh");
        assert_eq!(p.get(2), "b");
        assert_eq!(p.get(3), "");
    }

    fn def(name: &str) -> Arc<FunctionDef> {
        Arc::new(FunctionDef {
            name: name.to_string(),
            body: Vec::new(),
            pos: Default::default(),
        })
    }

    #[test]
    fn merge_keeps_definitions_from_both_runs() {
        let mut persisted = Scope::default();
        persisted.functions.insert("shared".into(), def("shared"));
        let baseline = persisted.clone();

        let mut first = baseline.clone();
        first.functions.insert("a".into(), def("a"));
        first.imports.push("/mods/a".into());
        let mut second = baseline.clone();
        second.functions.insert("b".into(), def("b"));
        second.options.pipefail = true;
        second.last_status = 3;

        persisted.merge_from(&baseline, first);
        persisted.merge_from(&baseline, second);

        let mut names: Vec<_> = persisted.functions.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "shared"]);
        assert_eq!(persisted.imports, vec![PathBuf::from("/mods/a")]);
        assert!(persisted.options.pipefail);
        assert_eq!(persisted.last_status, 3);
    }

    #[test]
    fn merge_does_not_revert_a_concurrent_redefinition() {
        let mut persisted = Scope::default();
        persisted.functions.insert("f".into(), def("f"));
        let baseline = persisted.clone();

        let newer = def("f");
        persisted.functions.insert("f".into(), newer.clone());
        persisted.merge_from(&baseline, baseline.clone());

        assert!(Arc::ptr_eq(&persisted.functions["f"], &newer));
    }

    #[test]
    fn call_scope_resets_exports_and_loops() {
        let mut outer = Scope::new(ShellOptions {
            errexit: true,
            pipefail: false,
        });
        outer.mark_exported("X");
        outer.mark_exported("X");
        outer.loop_depth = 2;
        assert_eq!(outer.exports, vec!["X".to_string()]);

        let inner = outer.for_call(vec!["1".into()]);
        assert!(inner.in_function);
        assert!(inner.exports.is_empty());
        assert_eq!(inner.loop_depth, 0);
        assert_eq!(inner.positional.args, vec!["1".to_string()]);
        assert!(inner.options.errexit);
        assert_eq!(inner.for_call(Vec::new()).depth, 2);
    }
}

//! Shared fixture for engine-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shode_kernel::builtins::BuiltinRegistry;
use shode_kernel::modules::ModuleSettings;
use shode_kernel::{
    CancellationToken, Engine, EngineOptions, EnvironmentManager, ExecutionResult, ModuleResolver,
    SecurityChecker, SecurityPolicy,
};
use tempfile::TempDir;

/// An engine rooted in a fresh temporary directory.
pub struct Shell {
    pub engine: Engine,
    pub cancel: CancellationToken,
    dir: TempDir,
    root: PathBuf,
}

impl Shell {
    pub fn new() -> Self {
        Self::with_policy(SecurityPolicy::permissive())
    }

    pub fn with_policy(policy: SecurityPolicy) -> Self {
        Self::build(policy, EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self::build(SecurityPolicy::permissive(), options)
    }

    fn build(policy: SecurityPolicy, options: EngineOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");

        let mut vars = HashMap::new();
        vars.insert(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        vars.insert("HOME".to_string(), root.display().to_string());
        let env = Arc::new(EnvironmentManager::new(vars, &root));
        let modules = Arc::new(ModuleResolver::new(env.clone(), ModuleSettings::default()));
        let engine = Engine::new(
            env,
            Arc::new(BuiltinRegistry::standard()),
            modules,
            Arc::new(SecurityChecker::new(policy)),
        )
        .with_options(options);

        Self {
            engine,
            cancel: CancellationToken::new(),
            dir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write a file under the root, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write file");
        path
    }

    pub async fn run(&self, source: &str) -> ExecutionResult {
        self.engine
            .execute_str(&self.cancel, source)
            .await
            .unwrap_or_else(|e| panic!("execute {source:?} failed: {e}"))
    }

    /// Run and return stdout, asserting success.
    pub async fn output(&self, source: &str) -> String {
        let result = self.run(source).await;
        assert_eq!(
            result.exit_code, 0,
            "script {source:?} failed: stdout={:?} stderr={:?}",
            result.output, result.error
        );
        result.output
    }

    pub fn var(&self, name: &str) -> Option<String> {
        self.engine.env().get_env(name)
    }
}

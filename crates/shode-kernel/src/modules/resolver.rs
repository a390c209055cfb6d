//! Import path resolution and the loaded-module cache.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::ast::{FunctionDef, Node, Script, SpecialVar, Word, WordPart};
use crate::env::{EnvironmentManager, Session};
use crate::error::{ExecutionError, ShellError, ShellResult};
use crate::parser;

use super::manifest::Manifest;

/// Where modules are looked up and how exports are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// Fallback directory, relative to the importing cwd.
    #[serde(default = "default_search_dir")]
    pub search_dir: String,
    /// Marker prefix of exported function names.
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
    /// Manifest file name inside a module directory.
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

fn default_search_dir() -> String {
    "sh_models".to_string()
}

fn default_export_prefix() -> String {
    "export_".to_string()
}

fn default_manifest() -> String {
    "package.json".to_string()
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            search_dir: default_search_dir(),
            export_prefix: default_export_prefix(),
            manifest: default_manifest(),
        }
    }
}

/// A loaded module. Immutable once it is in the cache.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// Absolute path of the module directory or file.
    pub path: PathBuf,
    /// The script the exports were read from.
    pub entry: PathBuf,
    pub version: Option<String>,
    /// Export name (marker prefix removed) to definition.
    pub exports: BTreeMap<String, Arc<FunctionDef>>,
    /// Every top-level function, by its declared name.
    pub functions: HashMap<String, Arc<FunctionDef>>,
    /// Load-time environment exports run against.
    pub base_env: Session,
    pub loaded: bool,
}

impl Module {
    /// Look up an export, also trying the `name()` spelling.
    pub fn export(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.exports
            .get(name)
            .or_else(|| self.exports.get(&format!("{name}()")))
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.export(name).is_some()
    }

    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.clone(),
            path: self.path.clone(),
            entry: self.entry.clone(),
            version: self.version.clone(),
            exports: self.exports.keys().cloned().collect(),
        }
    }
}

/// Serializable summary of a loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: PathBuf,
    pub entry: PathBuf,
    pub version: Option<String>,
    pub exports: Vec<String>,
}

/// Turns import paths into loaded modules and caches them.
///
/// The cache is read-shared. A first load takes a per-path lock, re-checks
/// the cache and reads the module on the blocking pool, so a concurrent load
/// of the same path waits and reuses the first result while loads of other
/// paths proceed.
#[derive(Debug)]
pub struct ModuleResolver {
    env: Arc<EnvironmentManager>,
    settings: ModuleSettings,
    cache: RwLock<HashMap<PathBuf, Arc<Module>>>,
    loading: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ModuleResolver {
    pub fn new(env: Arc<EnvironmentManager>, settings: ModuleSettings) -> Self {
        Self {
            env,
            settings,
            cache: RwLock::new(HashMap::new()),
            loading: StdMutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ModuleSettings {
        &self.settings
    }

    /// Resolve an import path against the resolver's working directory.
    pub fn resolve_import(&self, path: &str) -> ShellResult<PathBuf> {
        self.resolve_from(path, &self.env.working_dir())
    }

    /// `cwd/path`, then `cwd/<search_dir>/path`. Absolute paths are taken
    /// as they are.
    pub fn resolve_from(&self, path: &str, cwd: &Path) -> ShellResult<PathBuf> {
        let not_found = || ShellError::ModuleNotFound {
            path: path.to_string(),
        };
        let requested = Path::new(path);
        let candidates = if requested.is_absolute() {
            vec![requested.to_path_buf()]
        } else {
            vec![
                cwd.join(requested),
                cwd.join(&self.settings.search_dir).join(requested),
            ]
        };
        candidates
            .into_iter()
            .find(|c| c.exists())
            .and_then(|c| std::fs::canonicalize(c).ok())
            .ok_or_else(not_found)
    }

    /// The script a resolved module path would be loaded from.
    pub fn entry_for(&self, key: &Path) -> ShellResult<PathBuf> {
        Ok(locate(&self.settings, key)?.entry)
    }

    pub async fn load_module(&self, path: &str) -> ShellResult<Arc<Module>> {
        let cwd = self.env.working_dir();
        self.load_module_from(path, &cwd).await
    }

    /// Load (or fetch from cache) the module `path` names, relative to `cwd`.
    #[tracing::instrument(level = "debug", skip(self, cwd))]
    pub async fn load_module_from(&self, path: &str, cwd: &Path) -> ShellResult<Arc<Module>> {
        let key = self.resolve_from(path, cwd)?;
        self.load_resolved(key).await
    }

    /// Load the module at a path [`resolve_from`](Self::resolve_from) returned.
    pub async fn load_resolved(&self, key: PathBuf) -> ShellResult<Arc<Module>> {
        if let Some(module) = self.cache.read().await.get(&key) {
            return Ok(module.clone());
        }

        let gate = self
            .loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        let _loading = gate.lock().await;
        if let Some(module) = self.cache.read().await.get(&key) {
            return Ok(module.clone());
        }

        let settings = self.settings.clone();
        let base_env = self.env.create_session();
        let path = key.clone();
        let loaded = match tokio::task::spawn_blocking(move || load(&settings, &path, base_env)).await {
            Ok(loaded) => loaded,
            Err(e) => Err(ExecutionError::Internal(format!("module load task failed: {e}")).into()),
        };
        if let Ok(module) = &loaded {
            info!(
                module = %module.name,
                exports = module.exports.len(),
                entry = %module.entry.display(),
                "module loaded"
            );
        }
        let module = loaded.map(Arc::new);
        if let Ok(module) = &module {
            self.cache.write().await.insert(key.clone(), module.clone());
        }
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        module
    }

    /// Load `path` and return its export table.
    pub async fn import(&self, path: &str) -> ShellResult<BTreeMap<String, Arc<FunctionDef>>> {
        Ok(self.load_module(path).await?.exports.clone())
    }

    /// True when any loaded module exports `name` (or `name()`).
    pub async fn is_exported_function(&self, name: &str) -> bool {
        self.cache.read().await.values().any(|m| m.has_export(name))
    }

    /// The first module among `imported` (cache keys, in import order)
    /// exporting `name`.
    pub async fn find_export(
        &self,
        name: &str,
        imported: &[PathBuf],
    ) -> Option<(Arc<Module>, Arc<FunctionDef>)> {
        let cache = self.cache.read().await;
        imported.iter().find_map(|key| {
            let module = cache.get(key)?;
            module.export(name).map(|def| (module.clone(), def.clone()))
        })
    }

    /// A loaded module by name or by path.
    pub async fn get_module(&self, key: &str) -> Option<Arc<Module>> {
        let cache = self.cache.read().await;
        find_in(&cache, key).map(|(_, m)| m.clone())
    }

    /// Loaded modules sorted by name.
    pub async fn list_modules(&self) -> Vec<Arc<Module>> {
        let mut modules: Vec<Arc<Module>> = self.cache.read().await.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    /// Drop a module from the cache. Returns whether one was loaded.
    pub async fn unload_module(&self, key: &str) -> bool {
        let mut cache = self.cache.write().await;
        let Some(path) = find_in(&cache, key).map(|(p, _)| p.clone()) else {
            return false;
        };
        cache.remove(&path);
        debug!(module = key, "module unloaded");
        true
    }

    pub async fn clear_modules(&self) {
        self.cache.write().await.clear();
    }

    pub async fn get_export(&self, module: &str, name: &str) -> ShellResult<Arc<FunctionDef>> {
        let found = self
            .get_module(module)
            .await
            .ok_or_else(|| ShellError::ModuleNotFound {
                path: module.to_string(),
            })?;
        found.export(name).cloned().ok_or_else(|| ShellError::CommandNotFound {
            name: name.to_string(),
            args: Vec::new(),
        })
    }

    pub async fn has_export(&self, module: &str, name: &str) -> bool {
        self.get_module(module)
            .await
            .is_some_and(|m| m.has_export(name))
    }

    pub async fn module_info(&self, key: &str) -> Option<ModuleInfo> {
        self.get_module(key).await.map(|m| m.info())
    }
}

/// Name, entry script and manifest of a resolved module path.
struct Located {
    name: String,
    entry: PathBuf,
    manifest: Option<Manifest>,
}

fn locate(settings: &ModuleSettings, path: &Path) -> ShellResult<Located> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if path.is_file() {
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(file_name);
        return Ok(Located {
            name,
            entry: path.to_path_buf(),
            manifest: None,
        });
    }

    let manifest = Manifest::load(&path.join(&settings.manifest))?;
    let name = manifest
        .as_ref()
        .and_then(|m| m.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| file_name.clone());
    let entry = entry_point(path, &name, &file_name, manifest.as_ref())?;
    Ok(Located {
        name,
        entry,
        manifest,
    })
}

/// Read and parse a module. Runs on the blocking pool.
fn load(settings: &ModuleSettings, path: &Path, base_env: Session) -> ShellResult<Module> {
    let Located {
        name,
        entry,
        manifest,
    } = locate(settings, path)?;
    let script = parser::parse_file(&entry)?;
    let mut module = Module {
        name,
        path: path.to_path_buf(),
        entry,
        version: manifest.as_ref().and_then(|m| m.version.clone()),
        exports: BTreeMap::new(),
        functions: HashMap::new(),
        base_env,
        loaded: false,
    };
    collect(&settings.export_prefix, &mut module, &script, manifest.as_ref());
    module.loaded = true;
    Ok(module)
}

/// Manifest `main`, then `index.sh`, then `<dir name>.sh`.
fn entry_point(
    dir: &Path,
    name: &str,
    dir_name: &str,
    manifest: Option<&Manifest>,
) -> ShellResult<PathBuf> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(m) = manifest {
        candidates.push(m.main_or_default().to_string());
    }
    candidates.push(super::manifest::DEFAULT_MAIN.to_string());
    candidates.push(format!("{dir_name}.sh"));
    if name != dir_name {
        candidates.push(format!("{name}.sh"));
    }
    candidates.dedup();

    candidates
        .iter()
        .map(|c| dir.join(c))
        .find(|p| p.is_file())
        .ok_or_else(|| ShellError::EntryPointNotFound {
            module: dir.display().to_string(),
            tried: candidates.clone(),
        })
}

/// Record top-level functions and evaluate top-level assignments into
/// the module's base environment. Everything else is ignored.
fn collect(prefix: &str, module: &mut Module, script: &Script, manifest: Option<&Manifest>) {
    for node in &script.nodes {
        match node {
            Node::FunctionDef(def) => {
                module.functions.insert(def.name.clone(), def.clone());
                let Some(exported) = def.name.strip_prefix(prefix) else {
                    continue;
                };
                if exported.is_empty() {
                    continue;
                }
                if manifest.map_or(true, |m| m.allows_export(exported)) {
                    module.exports.insert(exported.to_string(), def.clone());
                }
            }
            Node::Assignment(assign) => {
                let value = static_value(&assign.value, &module.base_env);
                module.base_env.set_env(&assign.name, value);
            }
            Node::Script(inner) => {
                for node in &inner.nodes {
                    if let Node::Assignment(assign) = node {
                        let value = static_value(&assign.value, &module.base_env);
                        module.base_env.set_env(&assign.name, value);
                    }
                }
            }
            other => debug!(
                module = %module.name,
                position = ?other.position(),
                "ignoring top-level statement in module"
            ),
        }
    }
}

fn find_in<'a>(
    cache: &'a HashMap<PathBuf, Arc<Module>>,
    key: &str,
) -> Option<(&'a PathBuf, &'a Arc<Module>)> {
    let as_path = Path::new(key);
    cache
        .iter()
        .find(|(path, _)| path.as_path() == as_path)
        .or_else(|| cache.iter().find(|(_, m)| m.name == key))
        .or_else(|| {
            let canonical = std::fs::canonicalize(as_path).ok()?;
            cache.get_key_value(&canonical)
        })
}

/// Expand an assignment value without running anything: literals, quotes
/// and variables resolve against `env`; substitutions expand to nothing.
fn static_value(word: &Word, env: &Session) -> String {
    let mut out = String::new();
    static_parts(&word.parts, env, &mut out);
    out
}

fn static_parts(parts: &[WordPart], env: &Session, out: &mut String) {
    for part in parts {
        match part {
            WordPart::Literal(s) | WordPart::SingleQuoted(s) => out.push_str(s),
            WordPart::DoubleQuoted(inner) => static_parts(inner, env, out),
            WordPart::Var(name) => out.push_str(&env.get_env(name).unwrap_or_default()),
            WordPart::Tilde => out.push_str(&env.get_env("HOME").unwrap_or_default()),
            WordPart::Special(SpecialVar::ArgCount) => out.push('0'),
            WordPart::Special(_) => {}
            WordPart::CommandSubst(_) => {
                debug!("command substitution in module assignment expands to nothing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GREETER: &str = r#"
PREFIX="Hello"
GREETING="$PREFIX, world"

export_greet() {
    echo "$GREETING $1"
}

helper() {
    echo helper
}

echo "ignored at load time"
"#;

    fn resolver(cwd: &Path) -> ModuleResolver {
        let env = Arc::new(EnvironmentManager::new(HashMap::new(), cwd));
        ModuleResolver::new(env, ModuleSettings::default())
    }

    fn module_dir(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, body) in files {
            fs::write(dir.join(file), body).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn loads_index_and_extracts_exports() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "greeter", &[("index.sh", GREETER)]);
        let r = resolver(root.path());

        let module = r.load_module("greeter").await.unwrap();
        assert!(module.loaded);
        assert_eq!(module.name, "greeter");
        assert_eq!(module.exports.keys().collect::<Vec<_>>(), vec!["greet"]);
        assert!(module.functions.contains_key("helper"));
        assert_eq!(module.base_env.get_env("GREETING").as_deref(), Some("Hello, world"));

        assert!(r.is_exported_function("greet").await);
        assert!(!r.is_exported_function("helper").await);
        assert!(!r.is_exported_function("non_export_function").await);
    }

    #[tokio::test]
    async fn second_load_returns_cached_instance() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "greeter", &[("index.sh", GREETER)]);
        let r = resolver(root.path());

        let first = r.load_module("greeter").await.unwrap();
        let second = r.load_module("./greeter").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(r.list_modules().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_instance() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "greeter", &[("index.sh", GREETER)]);
        let r = Arc::new(resolver(root.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = r.clone();
                tokio::spawn(async move { r.load_module("greeter").await.unwrap() })
            })
            .collect();
        let mut loaded = Vec::new();
        for h in handles {
            loaded.push(h.await.unwrap());
        }
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_modules_load_in_parallel() {
        let root = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            module_dir(root.path(), name, &[("index.sh", "export_x() { true; }\n")]);
        }
        let r = Arc::new(resolver(root.path()));

        let handles: Vec<_> = ["a", "b", "c", "d", "a"]
            .into_iter()
            .map(|name| {
                let r = r.clone();
                tokio::spawn(async move { r.load_module(name).await.unwrap() })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().has_export("x"));
        }
        assert_eq!(r.list_modules().await.len(), 4);
        assert!(r.loading.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let root = tempfile::tempdir().unwrap();
        let dir = module_dir(root.path(), "late", &[("README", "")]);
        let r = resolver(root.path());

        assert!(r.load_module("late").await.is_err());
        fs::write(dir.join("index.sh"), "export_ready() { true; }\n").unwrap();
        assert!(r.load_module("late").await.unwrap().has_export("ready"));
    }

    #[test]
    fn entry_for_matches_load_order() {
        let root = tempfile::tempdir().unwrap();
        let dir = module_dir(root.path(), "greeter", &[("index.sh", GREETER), ("greeter.sh", GREETER)]);
        let r = resolver(root.path());
        let key = r.resolve_import("greeter").unwrap();
        assert_eq!(r.entry_for(&key).unwrap(), dir.canonicalize().unwrap().join("index.sh"));
    }

    #[tokio::test]
    async fn falls_back_to_search_dir() {
        let root = tempfile::tempdir().unwrap();
        let models = root.path().join("sh_models");
        module_dir(&models, "greeter", &[("index.sh", GREETER)]);
        let r = resolver(root.path());

        let resolved = r.resolve_import("greeter").unwrap();
        assert!(resolved.ends_with("sh_models/greeter"));
        assert!(!r.has_export("greeter", "greet").await);
        r.load_module("greeter").await.unwrap();
        assert!(r.has_export("greeter", "greet").await);
    }

    #[tokio::test]
    async fn manifest_main_and_export_filter() {
        let root = tempfile::tempdir().unwrap();
        module_dir(
            root.path(),
            "pkg",
            &[
                (
                    "package.json",
                    r#"{"name": "tools", "version": "0.2.0", "main": "lib.sh", "exports": ["keep"]}"#,
                ),
                ("lib.sh", "export_keep() { echo k; }\nexport_drop() { echo d; }\n"),
                ("index.sh", "export_wrong() { echo w; }\n"),
            ],
        );
        let r = resolver(root.path());

        let module = r.load_module("pkg").await.unwrap();
        assert_eq!(module.name, "tools");
        assert!(module.entry.ends_with("lib.sh"));
        assert_eq!(module.exports.keys().collect::<Vec<_>>(), vec!["keep"]);

        let info = r.module_info("tools").await.unwrap();
        assert_eq!(info.version.as_deref(), Some("0.2.0"));
        assert_eq!(info.exports, vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn entry_falls_back_to_dir_name_script() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "mathx", &[("mathx.sh", "export_double() { echo 2; }\n")]);
        let r = resolver(root.path());
        let module = r.load_module("mathx").await.unwrap();
        assert!(module.entry.ends_with("mathx.sh"));
        assert!(r.get_export("mathx", "double").await.is_ok());
    }

    #[tokio::test]
    async fn resolution_errors() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "empty", &[("README", "nothing here")]);
        let r = resolver(root.path());

        let err = r.load_module("missing").await.unwrap_err();
        assert!(matches!(err, ShellError::ModuleNotFound { .. }));

        let err = r.load_module("empty").await.unwrap_err();
        match err {
            ShellError::EntryPointNotFound { tried, .. } => {
                assert_eq!(tried, vec!["index.sh".to_string(), "empty.sh".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unload_and_clear() {
        let root = tempfile::tempdir().unwrap();
        module_dir(root.path(), "a", &[("index.sh", "export_x() { true; }\n")]);
        module_dir(root.path(), "b", &[("index.sh", "export_y() { true; }\n")]);
        let r = resolver(root.path());
        r.load_module("a").await.unwrap();
        r.load_module("b").await.unwrap();

        assert!(r.unload_module("a").await);
        assert!(!r.unload_module("a").await);
        assert!(r.get_module("a").await.is_none());
        r.clear_modules().await;
        assert!(r.list_modules().await.is_empty());
    }

    #[test]
    fn export_lookup_accepts_paren_suffix() {
        let def = Arc::new(FunctionDef {
            name: "export_run()".into(),
            body: vec![],
            pos: Default::default(),
        });
        let mut exports = BTreeMap::new();
        exports.insert("run()".to_string(), def);
        let module = Module {
            name: "m".into(),
            path: PathBuf::from("/m"),
            entry: PathBuf::from("/m/index.sh"),
            version: None,
            exports,
            functions: HashMap::new(),
            base_env: EnvironmentManager::new(HashMap::new(), "/").create_session(),
            loaded: true,
        };
        assert!(module.has_export("run"));
        assert!(module.has_export("run()"));
        assert!(!module.has_export("walk"));
    }
}

//! Environment manager: variables, working directory and PATH.
//!
//! All three live in one [`EnvState`] behind a single `RwLock`, so a reader
//! never observes a cwd change without the matching `PWD`/`OLDPWD` update.
//! [`Session`] is an owned deep copy that can be mutated without locking and
//! later applied back in one swap.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{ShellError, ShellResult};

/// The state guarded by the manager's lock.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvState {
    vars: HashMap<String, String>,
    cwd: PathBuf,
    path: Vec<PathBuf>,
}

impl EnvState {
    pub fn new(vars: HashMap<String, String>, cwd: PathBuf) -> Self {
        let mut vars = vars;
        let path = vars
            .remove("PATH")
            .map(|p| split_path(&p))
            .unwrap_or_default();
        vars.insert("PWD".to_string(), cwd.to_string_lossy().into_owned());
        Self { vars, cwd, path }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if name == "PATH" {
            return Some(join_path(&self.path));
        }
        self.vars.get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name == "PATH" {
            self.path = split_path(&value);
        } else {
            self.vars.insert(name.to_string(), value);
        }
    }

    pub fn unset(&mut self, name: &str) -> Option<String> {
        if name == "PATH" {
            let old = join_path(&self.path);
            self.path.clear();
            return Some(old);
        }
        self.vars.remove(name)
    }

    pub fn working_dir(&self) -> &Path {
        &self.cwd
    }

    /// Change directory, resolving relative paths against the current cwd.
    ///
    /// Nothing is modified when the target does not exist.
    pub fn change_dir(&mut self, target: &Path) -> ShellResult<PathBuf> {
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.cwd.join(target)
        };
        let resolved = std::fs::canonicalize(&joined)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or(ShellError::DirNotFound { path: joined })?;
        let previous = std::mem::replace(&mut self.cwd, resolved.clone());
        self.vars
            .insert("OLDPWD".to_string(), previous.to_string_lossy().into_owned());
        self.vars
            .insert("PWD".to_string(), resolved.to_string_lossy().into_owned());
        Ok(resolved)
    }

    pub fn path(&self) -> &[PathBuf] {
        &self.path
    }

    pub fn set_path(&mut self, segments: Vec<PathBuf>) {
        self.path = segments;
    }

    pub fn append_to_path(&mut self, segment: impl Into<PathBuf>) {
        let segment = segment.into();
        self.path.retain(|p| *p != segment);
        self.path.push(segment);
    }

    pub fn prepend_to_path(&mut self, segment: impl Into<PathBuf>) {
        let segment = segment.into();
        self.path.retain(|p| *p != segment);
        self.path.insert(0, segment);
    }

    pub fn remove_from_path(&mut self, segment: &Path) -> bool {
        let before = self.path.len();
        self.path.retain(|p| p != segment);
        before != self.path.len()
    }

    /// Sorted snapshot of every variable, PATH included.
    pub fn all_vars(&self) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.insert("PATH".to_string(), join_path(&self.path));
        out
    }
}

/// An owned, independently mutable copy of environment state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: EnvState,
}

impl Session {
    pub fn get_env(&self, name: &str) -> Option<String> {
        self.state.get(name)
    }

    pub fn set_env(&mut self, name: &str, value: impl Into<String>) {
        self.state.set(name, value);
    }

    pub fn unset_env(&mut self, name: &str) -> Option<String> {
        self.state.unset(name)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.state.cwd.clone()
    }

    pub fn change_dir(&mut self, target: impl AsRef<Path>) -> ShellResult<PathBuf> {
        self.state.change_dir(target.as_ref())
    }

    pub fn path(&self) -> Vec<PathBuf> {
        self.state.path.clone()
    }

    pub fn prepend_to_path(&mut self, segment: impl Into<PathBuf>) {
        self.state.prepend_to_path(segment);
    }

    pub fn append_to_path(&mut self, segment: impl Into<PathBuf>) {
        self.state.append_to_path(segment);
    }

    pub fn all_vars(&self) -> BTreeMap<String, String> {
        self.state.all_vars()
    }

    pub fn into_state(self) -> EnvState {
        self.state
    }
}

/// Thread-safe owner of the live environment.
#[derive(Debug)]
pub struct EnvironmentManager {
    state: RwLock<EnvState>,
    original: EnvState,
}

impl EnvironmentManager {
    pub fn new(vars: HashMap<String, String>, cwd: impl Into<PathBuf>) -> Self {
        Self::from_state(EnvState::new(vars, cwd.into()))
    }

    /// Seed from the current process environment and working directory.
    pub fn from_process() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::new(vars, cwd)
    }

    pub fn from_state(state: EnvState) -> Self {
        Self {
            original: state.clone(),
            state: RwLock::new(state),
        }
    }

    /// A fresh manager whose live and original state are a copy of `session`.
    pub fn from_session(session: Session) -> Arc<Self> {
        Arc::new(Self::from_state(session.into_state()))
    }

    /// A private child manager holding a copy of the current state.
    pub fn fork(&self) -> Arc<Self> {
        Self::from_session(self.create_session())
    }

    fn read(&self) -> RwLockReadGuard<'_, EnvState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EnvState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_env(&self, name: &str) -> Option<String> {
        self.read().get(name)
    }

    pub fn set_env(&self, name: &str, value: impl Into<String>) {
        self.write().set(name, value);
    }

    /// Set a variable from the top level of a script.
    pub fn export_env(&self, name: &str, value: impl Into<String>) {
        self.set_env(name, value);
    }

    pub fn unset_env(&self, name: &str) -> Option<String> {
        self.write().unset(name)
    }

    pub fn all_vars(&self) -> BTreeMap<String, String> {
        self.read().all_vars()
    }

    /// Remove every variable except PWD. Working directory and PATH are kept.
    pub fn clear(&self) {
        let mut state = self.write();
        let pwd = state.vars.remove("PWD");
        state.vars.clear();
        if let Some(pwd) = pwd {
            state.vars.insert("PWD".to_string(), pwd);
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        self.read().cwd.clone()
    }

    /// Change the working directory.
    ///
    /// Relative targets resolve against the cwd at call time. On failure the
    /// state is untouched and `DirNotFound` is returned.
    pub fn change_dir(&self, target: impl AsRef<Path>) -> ShellResult<PathBuf> {
        let resolved = self.write().change_dir(target.as_ref())?;
        debug!(cwd = %resolved.display(), "changed directory");
        Ok(resolved)
    }

    pub fn path(&self) -> Vec<PathBuf> {
        self.read().path.clone()
    }

    pub fn path_string(&self) -> String {
        join_path(&self.read().path)
    }

    pub fn set_path(&self, segments: Vec<PathBuf>) {
        self.write().set_path(segments);
    }

    pub fn append_to_path(&self, segment: impl Into<PathBuf>) {
        self.write().append_to_path(segment);
    }

    pub fn prepend_to_path(&self, segment: impl Into<PathBuf>) {
        self.write().prepend_to_path(segment);
    }

    pub fn remove_from_path(&self, segment: impl AsRef<Path>) -> bool {
        self.write().remove_from_path(segment.as_ref())
    }

    /// Snapshot passed to spawned processes: every variable plus PATH and PWD.
    pub fn vars_for_process(&self) -> Vec<(String, String)> {
        let state = self.read();
        let mut vars: Vec<(String, String)> = state
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.push(("PATH".to_string(), join_path(&state.path)));
        vars.sort();
        vars
    }

    pub fn create_session(&self) -> Session {
        Session {
            state: self.read().clone(),
        }
    }

    /// Replace the live state with the session's state in one swap.
    pub fn apply_session(&self, session: Session) {
        *self.write() = session.state;
    }

    /// Copy the named variables from the session, leaving everything else.
    pub fn merge_vars(&self, session: &Session, names: &[String]) {
        let mut state = self.write();
        for name in names {
            match session.state.get(name) {
                Some(value) => state.set(name, value),
                None => {
                    state.unset(name);
                }
            }
        }
    }

    pub fn restore_original_environment(&self) {
        *self.write() = self.original.clone();
    }
}

fn split_path(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn join_path(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join(":")
}

//! The security checker: one decision per action, never cached.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::SecurityError;

use super::policy::SecurityPolicy;

/// Devices that are always safe to read and write.
const PASSTHROUGH_DEVICES: &[&str] = &["/dev/null", "/dev/stdin", "/dev/stdout", "/dev/stderr"];

/// Commands that take a password through `-p`.
const PASSWORD_FLAG_COMMANDS: &[&str] = &["mysql", "mysqldump", "mysqladmin", "sshpass"];

/// Argument fragments that indicate an attempt to chain shell commands.
const INJECTION_MARKERS: &[&str] = &[";", "&&", "||", "`", "$("];

/// An effect the engine is about to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SpawnProcess { path: PathBuf, args: Vec<String> },
    WriteFile { path: PathBuf },
    /// Remove `path` and, for a directory, everything beneath it.
    RemoveTree { path: PathBuf },
    ReadFile { path: PathBuf },
    NetworkConnect { host: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SpawnProcess { path, args } => {
                write!(f, "spawn {}", path.display())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Action::WriteFile { path } => write!(f, "write {}", path.display()),
            Action::RemoveTree { path } => write!(f, "remove {}", path.display()),
            Action::ReadFile { path } => write!(f, "read {}", path.display()),
            Action::NetworkConnect { host } => write!(f, "connect {host}"),
        }
    }
}

/// The policy rule that produced a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    DangerousCommand,
    NetworkCommand,
    SensitivePath,
    NotAllowlisted,
    WriteOutsideAllowed,
    DeniedHost,
    HostNotAllowed,
    RecursiveRootDelete,
    PasswordInArgs,
    ShellInjection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub rule_matched: Option<Rule>,
}

impl SecurityDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            rule_matched: None,
        }
    }

    pub fn deny(rule: Rule, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule_matched: Some(rule),
        }
    }

    /// Convert a denial into the error surfaced to scripts.
    pub fn into_result(self, action: &Action) -> Result<(), SecurityError> {
        if self.allowed {
            return Ok(());
        }
        Err(SecurityError {
            action: action.to_string(),
            reason: self.reason.unwrap_or_else(|| "denied by policy".to_string()),
            rule: self.rule_matched,
        })
    }
}

/// Summary of the active policy and check counters.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub dangerous_commands: Vec<String>,
    pub network_commands: Vec<String>,
    pub sensitive_paths: Vec<String>,
    pub allowed_commands: Vec<String>,
    pub allowed_write_prefixes: Vec<String>,
    pub denied_hosts: Vec<String>,
    pub allowed_hosts: Vec<String>,
    pub pattern_checks: bool,
    pub checks_performed: u64,
    pub checks_denied: u64,
}

#[derive(Debug)]
pub struct SecurityChecker {
    policy: RwLock<SecurityPolicy>,
    checks: AtomicU64,
    denials: AtomicU64,
}

impl Default for SecurityChecker {
    fn default() -> Self {
        Self::new(SecurityPolicy::default())
    }
}

impl SecurityChecker {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            checks: AtomicU64::new(0),
            denials: AtomicU64::new(0),
        }
    }

    /// A checker that allows everything.
    pub fn permissive() -> Self {
        Self::new(SecurityPolicy::permissive())
    }

    /// Snapshot of the current policy.
    pub fn policy(&self) -> SecurityPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut SecurityPolicy)) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut policy);
    }

    pub fn add_dangerous_command(&self, name: &str) {
        self.update(|p| {
            p.dangerous_commands.insert(name.to_string());
        });
    }

    pub fn remove_dangerous_command(&self, name: &str) -> bool {
        let mut removed = false;
        self.update(|p| removed = p.dangerous_commands.remove(name));
        removed
    }

    pub fn add_sensitive_path(&self, prefix: &str) {
        self.update(|p| {
            if !p.sensitive_paths.iter().any(|s| s == prefix) {
                p.sensitive_paths.push(prefix.to_string());
            }
        });
    }

    pub fn remove_sensitive_path(&self, prefix: &str) -> bool {
        let mut removed = false;
        self.update(|p| {
            let before = p.sensitive_paths.len();
            p.sensitive_paths.retain(|s| s != prefix);
            removed = before != p.sensitive_paths.len();
        });
        removed
    }

    /// Add a command to the allowlist (switching the allowlist on).
    pub fn allow_command(&self, name: &str) {
        self.update(|p| {
            p.allowed_commands.insert(name.to_string());
        });
    }

    /// Decide whether `action` may proceed.
    #[tracing::instrument(level = "trace", skip(self, action), fields(action = %action))]
    pub fn check(&self, action: &Action) -> SecurityDecision {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let decision = {
            let policy = self.policy.read().unwrap_or_else(PoisonError::into_inner);
            match action {
                Action::SpawnProcess { path, args } => check_spawn(&policy, path, args),
                Action::WriteFile { path } => check_write(&policy, path),
                Action::RemoveTree { path } => check_remove(&policy, path),
                Action::ReadFile { path } => check_read(&policy, path),
                Action::NetworkConnect { host } => check_network(&policy, host),
            }
        };
        if decision.allowed {
            trace!("allowed");
        } else {
            self.denials.fetch_add(1, Ordering::Relaxed);
            warn!(
                action = %action,
                rule = ?decision.rule_matched,
                reason = decision.reason.as_deref().unwrap_or(""),
                "security denial"
            );
        }
        decision
    }

    /// Check and convert a denial into a [`SecurityError`].
    pub fn enforce(&self, action: &Action) -> Result<(), SecurityError> {
        self.check(action).into_result(action)
    }

    pub fn security_report(&self) -> SecurityReport {
        let policy = self.policy();
        SecurityReport {
            dangerous_commands: policy.dangerous_commands.into_iter().collect(),
            network_commands: policy.network_commands.into_iter().collect(),
            sensitive_paths: policy.sensitive_paths,
            allowed_commands: policy.allowed_commands.into_iter().collect(),
            allowed_write_prefixes: policy
                .allowed_write_prefixes
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            denied_hosts: policy.denied_hosts.into_iter().collect(),
            allowed_hosts: policy.allowed_hosts.into_iter().collect(),
            pattern_checks: policy.check_patterns,
            checks_performed: self.checks.load(Ordering::Relaxed),
            checks_denied: self.denials.load(Ordering::Relaxed),
        }
    }
}

fn check_spawn(policy: &SecurityPolicy, path: &Path, args: &[String]) -> SecurityDecision {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    if !policy.allowed_commands.is_empty() && !policy.allowed_commands.contains(&name) {
        return SecurityDecision::deny(
            Rule::NotAllowlisted,
            format!("'{name}' is not in the allowed command list"),
        );
    }
    if policy.dangerous_commands.contains(&name) {
        return SecurityDecision::deny(
            Rule::DangerousCommand,
            format!("'{name}' is a dangerous command"),
        );
    }
    if policy.network_commands.contains(&name) {
        return SecurityDecision::deny(
            Rule::NetworkCommand,
            format!("'{name}' is a network administration command"),
        );
    }
    if policy.check_patterns {
        if let Some(decision) = check_arg_patterns(&name, args) {
            return decision;
        }
    }
    SecurityDecision::allow()
}

fn check_arg_patterns(name: &str, args: &[String]) -> Option<SecurityDecision> {
    if name == "rm" {
        let recursive = args.iter().any(|a| {
            a == "--recursive" || (a.starts_with('-') && !a.starts_with("--") && a.contains(['r', 'R']))
        });
        let root = args.iter().any(|a| a == "/" || a == "/*");
        if recursive && root {
            return Some(SecurityDecision::deny(
                Rule::RecursiveRootDelete,
                "recursive delete of the filesystem root",
            ));
        }
    }

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let inline = arg.starts_with("--password=") || arg.starts_with("--passwd=");
        let separate = (arg == "--password" || arg == "--passwd") && iter.peek().is_some();
        let short = PASSWORD_FLAG_COMMANDS.contains(&name)
            && arg.starts_with("-p")
            && (arg.len() > 2 || iter.peek().is_some());
        if inline || separate || short {
            return Some(SecurityDecision::deny(
                Rule::PasswordInArgs,
                "password passed on the command line",
            ));
        }
    }

    if let Some(arg) = args
        .iter()
        .find(|a| INJECTION_MARKERS.iter().any(|m| a.contains(m)))
    {
        return Some(SecurityDecision::deny(
            Rule::ShellInjection,
            format!("argument {arg:?} contains shell metacharacters"),
        ));
    }
    None
}

fn check_read(policy: &SecurityPolicy, path: &Path) -> SecurityDecision {
    let normalized = normalize(path);
    if is_passthrough(&normalized) {
        return SecurityDecision::allow();
    }
    match sensitive_prefix(policy, &normalized) {
        Some(prefix) => SecurityDecision::deny(
            Rule::SensitivePath,
            format!("{} is under sensitive path {prefix}", normalized.display()),
        ),
        None => SecurityDecision::allow(),
    }
}

fn check_write(policy: &SecurityPolicy, path: &Path) -> SecurityDecision {
    let normalized = normalize(path);
    if is_passthrough(&normalized) {
        return SecurityDecision::allow();
    }
    if let Some(prefix) = sensitive_prefix(policy, &normalized) {
        return SecurityDecision::deny(
            Rule::SensitivePath,
            format!("{} is under sensitive path {prefix}", normalized.display()),
        );
    }
    if !policy.allowed_write_prefixes.is_empty() {
        let targets = path_forms(&normalized);
        let inside = policy.allowed_write_prefixes.iter().any(|p| {
            let prefixes = path_forms(&normalize(p));
            targets
                .iter()
                .any(|t| prefixes.iter().any(|prefix| t.starts_with(prefix)))
        });
        if !inside {
            return SecurityDecision::deny(
                Rule::WriteOutsideAllowed,
                format!("{} is outside the writable prefixes", normalized.display()),
            );
        }
    }
    SecurityDecision::allow()
}

/// A recursive delete is a write to the target plus every path beneath it.
fn check_remove(policy: &SecurityPolicy, path: &Path) -> SecurityDecision {
    let normalized = normalize(path);
    let targets = path_forms(&normalized);
    if targets.iter().any(|t| t.parent().is_none()) {
        return SecurityDecision::deny(
            Rule::RecursiveRootDelete,
            "recursive delete of the filesystem root",
        );
    }
    let decision = check_write(policy, &normalized);
    if !decision.allowed {
        return decision;
    }
    let covered = policy.sensitive_paths.iter().find(|prefix| {
        path_forms(Path::new(prefix.as_str()))
            .iter()
            .any(|p| targets.iter().any(|t| p.starts_with(t)))
    });
    match covered {
        Some(prefix) => SecurityDecision::deny(
            Rule::SensitivePath,
            format!("removing {} would remove sensitive path {prefix}", normalized.display()),
        ),
        None => SecurityDecision::allow(),
    }
}

fn check_network(policy: &SecurityPolicy, host: &str) -> SecurityDecision {
    let host = host.to_ascii_lowercase();
    if policy.denied_hosts.contains(&host) {
        return SecurityDecision::deny(Rule::DeniedHost, format!("host {host} is denied"));
    }
    if !policy.allowed_hosts.is_empty() && !policy.allowed_hosts.contains(&host) {
        return SecurityDecision::deny(
            Rule::HostNotAllowed,
            format!("host {host} is not in the allowed host list"),
        );
    }
    SecurityDecision::allow()
}

fn is_passthrough(path: &Path) -> bool {
    PASSTHROUGH_DEVICES.iter().any(|d| path == Path::new(d))
}

/// The sensitive prefix `path` falls under, compared both as written and
/// with symlinks resolved.
fn sensitive_prefix<'a>(policy: &'a SecurityPolicy, path: &Path) -> Option<&'a str> {
    let targets = path_forms(path);
    policy
        .sensitive_paths
        .iter()
        .find(|prefix| {
            let prefixes = path_forms(Path::new(prefix.as_str()));
            targets.iter().any(|t| {
                let text = t.to_string_lossy();
                text.starts_with(prefix.as_str()) || prefixes.iter().any(|p| t.starts_with(p))
            })
        })
        .map(String::as_str)
}

/// Lexically resolve `.` and `..` so prefix checks cannot be sidestepped.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` as written, plus its resolved form when that differs.
fn path_forms(path: &Path) -> Vec<PathBuf> {
    let normalized = normalize(path);
    match resolve_links(&normalized) {
        Some(resolved) if resolved != normalized => vec![normalized, resolved],
        _ => vec![normalized],
    }
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn resolve_links(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            let mut resolved = real;
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return Some(resolved);
        }
        missing.push(existing.file_name()?);
        existing = existing.parent()?;
    }
}

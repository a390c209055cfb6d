//! Configuration-driven security policy.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Allow/deny lists consulted by the [`SecurityChecker`](super::SecurityChecker).
///
/// Loadable from the `[security]` table of the config file; any field left out
/// keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Command basenames that may never be spawned.
    #[serde(default = "default_dangerous_commands")]
    pub dangerous_commands: BTreeSet<String>,

    /// Network administration tools that may never be spawned.
    #[serde(default = "default_network_commands")]
    pub network_commands: BTreeSet<String>,

    /// Path prefixes that may not be read or written.
    #[serde(default = "default_sensitive_paths")]
    pub sensitive_paths: Vec<String>,

    /// When non-empty, only these command basenames may be spawned.
    #[serde(default)]
    pub allowed_commands: BTreeSet<String>,

    /// When non-empty, writes must land under one of these prefixes.
    #[serde(default)]
    pub allowed_write_prefixes: Vec<PathBuf>,

    #[serde(default)]
    pub denied_hosts: BTreeSet<String>,

    /// When non-empty, only these hosts may be contacted.
    #[serde(default)]
    pub allowed_hosts: BTreeSet<String>,

    /// Inspect external arguments for recursive root deletes, inline
    /// passwords and shell metacharacters.
    #[serde(default = "default_true")]
    pub check_patterns: bool,
}

fn default_dangerous_commands() -> BTreeSet<String> {
    [
        "rm", "dd", "mkfs", "fdisk", "shutdown", "reboot", "halt", "poweroff", "chmod", "chown",
        "useradd", "userdel", "groupadd", "groupdel", "passwd",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_network_commands() -> BTreeSet<String> {
    ["iptables", "ufw", "route", "ifconfig", "ip", "nc", "nmap", "tcpdump"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sensitive_paths() -> Vec<String> {
    [
        "/etc/passwd",
        "/etc/shadow",
        "/etc/sudoers",
        "/root/",
        "/boot/",
        "/dev/",
        "/proc/",
        "/sys/",
        "/var/log/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            dangerous_commands: default_dangerous_commands(),
            network_commands: default_network_commands(),
            sensitive_paths: default_sensitive_paths(),
            allowed_commands: BTreeSet::new(),
            allowed_write_prefixes: Vec::new(),
            denied_hosts: BTreeSet::new(),
            allowed_hosts: BTreeSet::new(),
            check_patterns: true,
        }
    }
}

impl SecurityPolicy {
    /// A policy with every list empty and pattern checks off.
    pub fn permissive() -> Self {
        Self {
            dangerous_commands: BTreeSet::new(),
            network_commands: BTreeSet::new(),
            sensitive_paths: Vec::new(),
            allowed_commands: BTreeSet::new(),
            allowed_write_prefixes: Vec::new(),
            denied_hosts: BTreeSet::new(),
            allowed_hosts: BTreeSet::new(),
            check_patterns: false,
        }
    }
}

//! `package.json` module manifests.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ShellError, ShellResult};

/// Entry point used when a manifest names none.
pub const DEFAULT_MAIN: &str = "index.sh";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub exports: Option<ManifestExports>,
}

/// Either `["greet", "shout"]` or `{"greet": "function", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestExports {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ManifestExports {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            ManifestExports::List(names) => names.iter().any(|n| n == name),
            ManifestExports::Map(map) => map.contains_key(name),
        }
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read `path` if it exists. A missing manifest is `Ok(None)`.
    pub fn load(path: &Path) -> ShellResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShellError::io(format!("reading {}", path.display()), e)),
        };
        Self::parse(&text).map(Some).map_err(|e| {
            ShellError::io(
                format!("parsing {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// `main`, defaulting to `index.sh`.
    pub fn main_or_default(&self) -> &str {
        self.main.as_deref().filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MAIN)
    }

    /// Whether a function exported as `name` passes the manifest filter.
    pub fn allows_export(&self, name: &str) -> bool {
        self.exports.as_ref().map_or(true, |e| e.contains(name))
    }
}

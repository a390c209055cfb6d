//! Module loading.
//!
//! An import path resolves to a directory (or a single script) whose entry
//! script is parsed once. Top-level functions carrying the export prefix
//! become the module's exports, callable by name from the importing scope.

mod manifest;
mod resolver;

pub use manifest::{Manifest, ManifestExports, DEFAULT_MAIN};
pub use resolver::{Module, ModuleInfo, ModuleResolver, ModuleSettings};

//! Records the git revision and build date shown by `shode --version`.

use std::process::Command;

fn main() {
    // .git is absent in packaged builds
    if std::path::Path::new("../../.git").exists() {
        println!("cargo::rerun-if-changed=../../.git/HEAD");
        println!("cargo::rerun-if-changed=../../.git/refs/heads/");
    }

    let revision = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let built = chrono::Utc::now().format("%Y-%m-%d").to_string();

    println!("cargo:rustc-env=SHODE_GIT_HASH={revision}");
    println!("cargo:rustc-env=SHODE_BUILD_DATE={built}");
}

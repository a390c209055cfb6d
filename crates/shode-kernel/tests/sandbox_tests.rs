//! Security checks seen from scripts: denied actions fail with 126 and
//! have no side effects.

mod common;

use std::collections::BTreeSet;

use common::Shell;
use shode_kernel::{ErrorKind, SecurityPolicy};

fn policy(edit: impl FnOnce(&mut SecurityPolicy)) -> SecurityPolicy {
    let mut policy = SecurityPolicy::permissive();
    edit(&mut policy);
    policy
}

#[tokio::test]
async fn allowlist_blocks_other_programs() {
    let sh = Shell::with_policy(policy(|p| p.allowed_commands = BTreeSet::from(["sh".to_string()])));
    let result = sh.run("touch created.txt").await;
    assert_eq!(result.exit_code, 126);
    assert!(!sh.path("created.txt").exists());
    assert_eq!(result.commands[0].error_kind, Some(ErrorKind::Security));
    assert!(result.error.contains("not in the allowed command list"), "stderr: {}", result.error);
}

#[tokio::test]
async fn allowlisted_program_runs() {
    let sh = Shell::with_policy(policy(|p| p.allowed_commands = BTreeSet::from(["sh".to_string()])));
    assert_eq!(sh.output("sh -c 'echo allowed'").await, "allowed\n");
}

#[tokio::test]
async fn allowlist_does_not_apply_to_builtins() {
    let sh = Shell::with_policy(policy(|p| p.allowed_commands = BTreeSet::from(["sh".to_string()])));
    assert_eq!(sh.output("echo builtin").await, "builtin\n");
}

#[tokio::test]
async fn dangerous_command_is_denied() {
    let sh = Shell::with_policy(SecurityPolicy::default());
    sh.write("f.txt", "x");
    let result = sh.run("set +e; chmod 777 f.txt; echo $?").await;
    assert_eq!(result.output, "126\n");
    assert!(result.error.contains("dangerous command"));
}

#[tokio::test]
async fn redirect_outside_write_prefixes_creates_nothing() {
    let sh = Shell::with_policy(policy(|p| {
        p.allowed_write_prefixes = vec!["/nonexistent".into()];
    }));
    let result = sh.run("echo hi > out.txt").await;
    assert_eq!(result.exit_code, 126);
    assert!(!sh.path("out.txt").exists());
}

#[tokio::test]
async fn builtin_write_outside_prefixes_is_denied() {
    let sh = Shell::with_policy(policy(|p| {
        p.allowed_write_prefixes = vec!["/nonexistent".into()];
    }));
    let result = sh.run("write out.txt data").await;
    assert_eq!(result.exit_code, 126);
    assert!(!sh.path("out.txt").exists());
}

#[tokio::test]
async fn writes_inside_prefix_succeed() {
    let temp = std::env::temp_dir().canonicalize().unwrap();
    let sh = Shell::with_policy(policy(|p| p.allowed_write_prefixes = vec![temp]));
    sh.run("echo ok > inside.txt").await;
    assert_eq!(std::fs::read_to_string(sh.path("inside.txt")).unwrap(), "ok\n");
}

#[tokio::test]
async fn sensitive_paths_cannot_be_read() {
    let sh = Shell::with_policy(SecurityPolicy::default());
    let result = sh.run("cat /etc/shadow").await;
    assert_eq!(result.exit_code, 126);
    assert!(result.error.contains("sensitive path"));
}

#[tokio::test]
async fn dev_null_stays_usable() {
    let sh = Shell::with_policy(SecurityPolicy::default());
    assert_eq!(sh.output("echo hidden > /dev/null; echo shown").await, "shown\n");
}

#[tokio::test]
async fn shell_metacharacters_in_arguments_are_denied() {
    let sh = Shell::with_policy(SecurityPolicy::default());
    let result = sh.run("sh -c 'echo a; echo b'").await;
    assert_eq!(result.exit_code, 126);
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn denial_respects_errexit_off() {
    let sh = Shell::with_policy(policy(|p| p.allowed_commands = BTreeSet::from(["sh".to_string()])));
    let result = sh.run("set +e; touch x; echo continued").await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "continued\n");
}

fn with_sensitive_dir(relative: &str) -> Shell {
    let sh = Shell::new();
    let prefix = format!("{}/", sh.path(relative).display());
    sh.engine.security().add_sensitive_path(&prefix);
    sh
}

#[tokio::test]
async fn rm_cannot_remove_a_parent_of_a_sensitive_path() {
    let sh = with_sensitive_dir("data/protected");
    sh.write("data/protected/secret.txt", "s");
    sh.write("data/scratch.txt", "x");

    let result = sh
        .run("set +e; rm data/protected/secret.txt; echo $?; rm data; echo $?; rm data/scratch.txt; echo $?")
        .await;
    assert_eq!(result.output, "126\n126\n0\n");
    assert!(result.error.contains("would remove sensitive path"), "stderr: {}", result.error);
    assert!(sh.path("data/protected/secret.txt").exists());
    assert!(!sh.path("data/scratch.txt").exists());
}

#[tokio::test]
async fn symlinks_do_not_bypass_sensitive_paths() {
    let sh = with_sensitive_dir("data/protected");
    sh.write("data/protected/secret.txt", "s");
    std::os::unix::fs::symlink(sh.path("data/protected"), sh.path("shortcut")).unwrap();

    let result = sh.run("set +e; cat shortcut/secret.txt; echo $?; rm shortcut; echo $?").await;
    assert_eq!(result.output, "126\n126\n");
    assert!(sh.path("shortcut").exists());
}

#[tokio::test]
async fn import_is_checked_like_source() {
    let sh = with_sensitive_dir("secret");
    sh.write("secret/mod.sh", "export_hi() { echo hi-from-secret; }\n");

    let result = sh
        .run("set +e; source secret/mod.sh; echo source=$?; import secret/mod.sh; echo import=$?; hi; echo hi=$?")
        .await;
    assert_eq!(result.output, "source=126\nimport=126\nhi=127\n");
    assert!(sh.engine.modules().list_modules().await.is_empty());
}

#[tokio::test]
async fn import_checks_the_manifest_entry_point() {
    let sh = with_sensitive_dir("secret");
    sh.write("secret/mod.sh", "export_hi() { echo hi-from-secret; }\n");
    sh.write("front/package.json", r#"{"name": "front", "main": "../secret/mod.sh"}"#);

    let result = sh.run("set +e; import front; echo import=$?").await;
    assert_eq!(result.output, "import=126\n");
    assert!(result.error.contains("sensitive path"), "stderr: {}", result.error);
}

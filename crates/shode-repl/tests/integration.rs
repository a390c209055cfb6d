//! Integration tests for the shode REPL and CLI.

use std::process::Command;

use shode_repl::{LineOutcome, Repl};

fn repl() -> (Repl, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repl = Repl::with_root(dir.path().to_path_buf()).expect("repl");
    (repl, dir)
}

/// Feed lines one at a time and collect what would be printed.
fn run_lines(repl: &mut Repl, lines: &[&str]) -> Vec<String> {
    let mut outputs = Vec::new();
    for line in lines {
        match repl.process_line(line) {
            LineOutcome::Output(Some(output)) => outputs.push(output),
            LineOutcome::Output(None) => {}
            LineOutcome::Exit => outputs.push("<exit>".to_string()),
        }
    }
    outputs
}

// ============================================================================
// Session state
// ============================================================================

#[test]
fn state_persists_across_lines() {
    let (mut repl, _dir) = repl();
    let out = run_lines(
        &mut repl,
        &["NAME=world", "greet() { echo \"hello $1\"; }", "greet $NAME"],
    );
    assert_eq!(out, vec!["hello world"]);
}

#[test]
fn empty_lines_print_nothing() {
    let (mut repl, _dir) = repl();
    assert_eq!(repl.process_line("   "), LineOutcome::Output(None));
    assert_eq!(repl.process_line("# just a comment"), LineOutcome::Output(None));
}

#[test]
fn failures_show_status_and_stderr() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["nosuchcommand_xyz"]);
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("nosuchcommand_xyz: command not found"), "{}", out[0]);
    assert!(out[0].ends_with("✗ code=127"), "{}", out[0]);
    assert_eq!(repl.engine().last_status(), 127);
}

#[test]
fn parse_errors_are_reported() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["if true; then"]);
    assert!(out[0].starts_with("Error: "), "{}", out[0]);
}

#[test]
fn cd_changes_the_session_directory() {
    let (mut repl, dir) = repl();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    run_lines(&mut repl, &["cd sub"]);
    let out = run_lines(&mut repl, &["/cwd"]);
    let expected = dir.path().canonicalize().unwrap().join("sub");
    assert_eq!(out, vec![expected.display().to_string()]);
}

// ============================================================================
// Meta-commands
// ============================================================================

#[test]
fn quit_variants_exit() {
    let (mut repl, _dir) = repl();
    for line in ["/quit", "/q", "quit", "exit"] {
        assert_eq!(repl.process_line(line), LineOutcome::Exit, "{line}");
    }
}

#[test]
fn help_lists_meta_commands() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["/help"]);
    assert!(out[0].contains("/modules"));
    assert!(out[0].contains("import path/to/module"));
}

#[test]
fn ast_mode_prints_instead_of_running() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["/ast", "X=1 && echo $X", "/ast"]);
    assert_eq!(
        out,
        vec![
            "AST mode: ON".to_string(),
            "(and-or (assign X 1) && (cmd echo ${X}))".to_string(),
            "AST mode: OFF".to_string(),
        ]
    );
    assert_eq!(repl.engine().env().get_env("X"), None);
}

#[test]
fn vars_filters_by_prefix() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["MYAPP_A=1; MYAPP_B=two", "/vars MYAPP_"]);
    assert_eq!(out, vec!["Variables:\n  MYAPP_A = \"1\"\n  MYAPP_B = \"two\""]);
}

#[test]
fn functions_and_status() {
    let (mut repl, _dir) = repl();
    let out = run_lines(
        &mut repl,
        &["/functions", "b() { true; }; a() { true; }", "/functions", "set +e; false", "/$?"],
    );
    assert_eq!(
        out,
        vec![
            "(no functions defined)".to_string(),
            "a\nb".to_string(),
            "✗ code=1".to_string(),
            "1".to_string(),
        ]
    );
}

#[test]
fn status_shows_execution_counters() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["set +e; echo a | cat; nosuchcmd_xyz", "/status"]);
    let lines: Vec<&str> = out[1].lines().collect();
    assert_eq!(
        &lines[..6],
        &[
            "last status: 127",
            "commands:    4 (3 ok, 1 failed, 75.0% success)",
            "by kind:     builtin=2 intrinsic=1",
            "errors:      command_not_found=1",
            "pipelines:   1 (0 failed)",
            "loops:       0 (0 iterations)",
        ]
    );
    assert!(lines[6].ends_with("over 1 runs"), "{}", lines[6]);
}

#[test]
fn modules_lists_imports() {
    let (mut repl, dir) = repl();
    let module = dir.path().join("tool");
    std::fs::create_dir(&module).unwrap();
    std::fs::write(module.join("index.sh"), "export_hi() {\n    echo hi\n}\n").unwrap();

    assert_eq!(run_lines(&mut repl, &["/modules"]), vec!["(no modules loaded)"]);
    let out = run_lines(&mut repl, &["import tool", "hi", "/modules"]);
    assert_eq!(out[0], "hi");
    assert!(out[1].contains("tool -"), "{}", out[1]);
    assert!(out[1].contains("exports: hi"), "{}", out[1]);
}

#[test]
fn security_report_is_json() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["/security"]);
    let report: serde_json::Value = serde_json::from_str(&out[0]).expect("valid json");
    assert!(report["dangerous_commands"].as_array().is_some_and(|a| !a.is_empty()));
}

#[test]
fn unknown_meta_command() {
    let (mut repl, _dir) = repl();
    let out = run_lines(&mut repl, &["/frobnicate"]);
    assert!(out[0].starts_with("Unknown command: /frobnicate"));
}

// ============================================================================
// CLI
// ============================================================================

fn shode() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shode"));
    cmd.env("SHODE_CONFIG", "/nonexistent/shode-config.toml");
    cmd
}

#[test]
fn cli_runs_command_strings() {
    let output = shode().args(["-c", "echo $1-$2 | upper", "a", "b"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "A-B\n");
}

#[test]
fn cli_exit_status_follows_script() {
    let output = shode().args(["-c", "echo partial; exit 3"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "partial\n");
}

#[test]
fn cli_runs_script_files_with_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("s.sh");
    std::fs::write(&script, "#!/usr/bin/env shode\necho \"$# $1\"\nfalse\necho unreachable\n").unwrap();

    let output = shode().arg(&script).arg("first").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1 first\n");
}

#[test]
fn cli_parse_error_is_usage_failure() {
    let output = shode().args(["-c", "for x in"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected"));
}

#[test]
fn cli_ast_prints_sexpr() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("s.sh");
    std::fs::write(&script, "echo a | cat\n").unwrap();
    let output = shode().arg("--ast").arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "(pipe (cmd echo a) (cmd cat))\n");
}

#[test]
fn cli_version_and_unknown_flag() {
    let version = shode().arg("--version").output().unwrap();
    assert!(String::from_utf8_lossy(&version.stdout).starts_with("shode "));

    let unknown = shode().arg("--bogus").output().unwrap();
    assert_eq!(unknown.status.code(), Some(2));
}

//! Pipelines: concurrent stages, mixed builtin and external stages,
//! status rules and cancellation.

mod common;

use std::time::Duration;

use common::Shell;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use shode_kernel::ShellError;

#[tokio::test]
async fn builtin_to_builtin() {
    let sh = Shell::new();
    let result = sh.run("echo hello | cat").await;
    assert_eq!(result.output, "hello\n");
    assert_eq!(result.commands.len(), 1);
    let only = &result.commands[0];
    assert_eq!(only.command, "echo hello | cat");
    assert_eq!(only.kind, None);
    assert_eq!(only.output, "hello\n");
}

#[tokio::test]
async fn three_builtin_stages() {
    let sh = Shell::new();
    assert_eq!(sh.output("echo '  b a' | upper | trim").await, "B A\n");
}

#[tokio::test]
async fn builtin_into_external() {
    let sh = Shell::new();
    assert_eq!(sh.output("echo hello | sh -c 'tr a-z A-Z'").await, "HELLO\n");
}

#[tokio::test]
async fn external_into_builtin() {
    let sh = Shell::new();
    assert_eq!(sh.output("sh -c 'echo hi' | upper").await, "HI\n");
}

#[tokio::test]
async fn external_into_external() {
    let sh = Shell::new();
    assert_eq!(
        sh.output("sh -c 'printf \"c\\na\\nb\\n\"' | sort").await,
        "a\nb\nc\n"
    );
}

#[tokio::test]
async fn large_output_flows_through() {
    let sh = Shell::new();
    let out = sh.output("sh -c 'seq 1 20000' | wc").await;
    assert_eq!(out, "20000 20000 108894\n");
}

#[tokio::test]
async fn stages_do_not_leak_state() {
    let sh = Shell::new();
    sh.write("d/keep", "");
    assert_eq!(
        sh.output("X=1; export X=2 | cat; cd d | cat; echo $X; pwd").await,
        format!("1\n{}\n", sh.root().display())
    );
}

#[tokio::test]
async fn last_stage_status_wins_by_default() {
    let sh = Shell::new();
    let result = sh.run("false | true; echo $?").await;
    assert_eq!(result.output, "0\n");
}

#[tokio::test]
async fn pipefail_reports_failing_stage() {
    let sh = Shell::new();
    let result = sh.run("set +e -o pipefail; sh -c 'exit 3' | cat; echo $?").await;
    assert_eq!(result.output, "3\n");
}

#[tokio::test]
async fn failing_pipeline_triggers_errexit() {
    let sh = Shell::new();
    let result = sh.run("echo x | false; echo never").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn negation_inverts_and_is_exempt() {
    let sh = Shell::new();
    assert_eq!(sh.output("! echo x | false; echo $?").await, "0\n");
    assert_eq!(sh.output("! true; echo $?").await, "1\n");
}

#[tokio::test]
async fn pipeline_in_function_body() {
    let sh = Shell::new();
    assert_eq!(sh.output("shout() { echo $1 | upper; }; shout hey").await, "HEY\n");
}

#[tokio::test]
async fn stdin_redirect_feeds_first_stage() {
    let sh = Shell::new();
    sh.write("in.txt", "one\ntwo\n");
    assert_eq!(sh.output("cat < in.txt | upper").await, "ONE\nTWO\n");
}

#[tokio::test]
async fn output_redirect_on_last_stage() {
    let sh = Shell::new();
    sh.run("echo piped | upper > out.txt").await;
    assert_eq!(std::fs::read_to_string(sh.path("out.txt")).unwrap(), "PIPED\n");
}

#[tokio::test]
async fn cancellation_kills_external_stages() {
    let sh = Shell::new();
    let pid_file = sh.path("pid");
    let script = "echo x | sh -c 'echo $$ > pid; exec sleep 30'";

    let canceller = async {
        let pid = loop {
            if let Ok(text) = tokio::fs::read_to_string(&pid_file).await {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    break pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        sh.cancel.cancel();
        pid
    };

    let (outcome, pid) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(sh.engine.execute_str(&sh.cancel, script), canceller)
    })
    .await
    .expect("pipeline did not stop after cancellation");

    let err = outcome.expect_err("cancelled run is an error");
    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert!(matches!(err, ShellError::Execution(_)));

    let mut gone = false;
    for _ in 0..50 {
        if kill(Pid::from_raw(pid), None).is_err() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(gone, "process {pid} survived cancellation");
}

#[tokio::test]
async fn cancelled_token_stops_before_running() {
    let sh = Shell::new();
    sh.cancel.cancel();
    let err = sh
        .engine
        .execute_str(&sh.cancel, "echo never > touched.txt")
        .await
        .expect_err("already cancelled");
    assert!(err.is_cancelled());
    assert!(!sh.path("touched.txt").exists());
}

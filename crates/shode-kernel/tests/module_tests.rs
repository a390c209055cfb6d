//! Importing modules and calling their exports from scripts.

mod common;

use common::Shell;
use shode_kernel::{CommandKind, ErrorKind};

const TOOL: &str = r#"GREETING=hey

export_greet() {
    echo "$GREETING $1"
}

helper() {
    echo helper
}

export_both() {
    helper
    echo "both $#"
}
"#;

fn with_tool() -> Shell {
    let sh = Shell::new();
    sh.write("mods/tool/index.sh", TOOL);
    sh
}

#[tokio::test]
async fn export_runs_against_module_environment() {
    let sh = with_tool();
    let result = sh.run("GREETING=caller; import mods/tool; greet you").await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.error);
    assert_eq!(result.output, "hey you\n");
    assert_eq!(result.last_command().unwrap().kind, Some(CommandKind::ModuleExport));
    assert_eq!(sh.var("GREETING").as_deref(), Some("caller"));
}

#[tokio::test]
async fn internal_functions_stay_private() {
    let sh = with_tool();
    let result = sh.run("import mods/tool; helper").await;
    assert_eq!(result.exit_code, 127);
    assert!(sh.engine.is_exported_function("greet").await);
    assert!(!sh.engine.is_exported_function("helper").await);
    assert!(!sh.engine.is_exported_function("export_greet").await);
}

#[tokio::test]
async fn exports_can_call_module_helpers() {
    let sh = with_tool();
    assert_eq!(
        sh.output("import mods/tool; both a b").await,
        "helper\nboth 2\n"
    );
}

#[tokio::test]
async fn exports_need_an_import_in_scope() {
    let sh = with_tool();
    sh.engine.modules().load_module("mods/tool").await.unwrap();
    let result = sh.run("greet you").await;
    assert_eq!(result.exit_code, 127);
}

#[tokio::test]
async fn imports_persist_between_runs() {
    let sh = with_tool();
    sh.run("import mods/tool").await;
    assert_eq!(sh.output("greet again").await, "hey again\n");
}

#[tokio::test]
async fn script_function_shadows_export() {
    let sh = with_tool();
    assert_eq!(
        sh.output("import mods/tool; greet() { echo local; }; greet x").await,
        "local\n"
    );
}

#[tokio::test]
async fn module_changes_do_not_leak_into_caller() {
    let sh = Shell::new();
    sh.write(
        "mods/setter/index.sh",
        "export_set_it() {\n    export LEAK=yes\n    INSIDE=1\n}\n",
    );
    assert_eq!(
        sh.output(r#"import mods/setter; set_it; echo "[$LEAK][$INSIDE]""#).await,
        "[][]\n"
    );
}

#[tokio::test]
async fn manifest_main_and_export_filter() {
    let sh = Shell::new();
    sh.write(
        "lib/fancy/package.json",
        r#"{"name": "fancy", "version": "1.2.0", "main": "src/entry.sh", "exports": ["shout"]}"#,
    );
    sh.write(
        "lib/fancy/src/entry.sh",
        "export_shout() {\n    upper $1\n}\nexport_hidden() {\n    echo hidden\n}\n",
    );
    let result = sh.run("import lib/fancy; shout quiet").await;
    assert_eq!(result.output, "QUIET\n");

    let module = sh.engine.modules().load_module("lib/fancy").await.unwrap();
    assert_eq!(module.name, "fancy");
    assert_eq!(module.version.as_deref(), Some("1.2.0"));
    assert!(module.entry.ends_with("src/entry.sh"));
    assert!(!module.has_export("hidden"));
    assert_eq!(sh.run("hidden").await.exit_code, 127);
}

#[tokio::test]
async fn search_dir_fallback() {
    let sh = Shell::new();
    sh.write("sh_models/util/util.sh", "export_ping() {\n    echo pong\n}\n");
    assert_eq!(sh.output("import util; ping").await, "pong\n");
}

#[tokio::test]
async fn single_file_module() {
    let sh = Shell::new();
    sh.write("single.sh", "export_one() {\n    echo one\n}\n");
    assert_eq!(sh.output("import single.sh; one").await, "one\n");
}

#[tokio::test]
async fn import_resolves_against_script_cwd() {
    let sh = with_tool();
    assert_eq!(sh.output("cd mods; import tool; greet cd").await, "hey cd\n");
}

#[tokio::test]
async fn missing_module_is_reported() {
    let sh = Shell::new();
    let result = sh.run("import nowhere").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.commands[0].error_kind, Some(ErrorKind::ModuleNotFound));
    assert!(result.error.contains("nowhere"));
}

#[tokio::test]
async fn module_without_entry_point_is_reported() {
    let sh = Shell::new();
    sh.write("empty/README", "nothing here");
    let result = sh.run("import empty").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.commands[0].error_kind, Some(ErrorKind::EntryPointNotFound));
}

#[tokio::test]
async fn loaded_modules_are_cached() {
    let sh = with_tool();
    let first = sh.engine.modules().load_module("mods/tool").await.unwrap();
    std::fs::write(sh.path("mods/tool/index.sh"), "export_other() {\n    echo other\n}\n").unwrap();
    let second = sh.engine.modules().load_module("mods/tool").await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(second.has_export("greet"));
}

use std::path::PathBuf;
use std::process::Command;

fn temp_workspace(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("rehearse-cli-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_rehearse"))
        .args(args)
        .output()
        .expect("run cli")
}

const PASSING: &str = "\
command: widgets delete w1
events:
- expect_stderr: \"Deleting widget [w1]...\\nContinue (y/N)? \"
- user_input:
  - \"y\"
- api_call:
    expect_request:
      uri: https://widgets.example.com/v1/widgets/w1
      method: DELETE
    return_response:
      status: 200
- expect_stdout: \"Deleted [w1].\\n\"
- expect_exit_code: 0
";

#[test]
fn run_passing_scenario_exits_zero() {
    let ws = temp_workspace("run");
    let scenario = ws.join("delete.yaml");
    std::fs::write(&scenario, PASSING).expect("write scenario");

    let out = run_cli(&["run", scenario.to_str().expect("utf8 path")]);
    assert!(
        out.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("PASS"), "{text}");
}

#[test]
fn run_failing_scenario_exits_one_and_reports_json() {
    let ws = temp_workspace("fail");
    let scenario = ws.join("delete.yaml");
    std::fs::write(&scenario, PASSING.replace("Deleted", "Removed")).expect("write scenario");

    let out = run_cli(&["--json", "run", scenario.to_str().expect("utf8 path")]);
    assert_eq!(out.status.code(), Some(1));
    let parsed: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("json summary on stdout");
    assert_eq!(parsed["status"], "fail");
    assert_eq!(parsed["failed"], 1);
}

#[test]
fn update_flag_rewrites_on_disk() {
    let ws = temp_workspace("update");
    let scenario = ws.join("delete.yaml");
    std::fs::write(&scenario, PASSING.replace("Deleted", "Removed")).expect("write scenario");

    let out = run_cli(&[
        "run",
        "--update-stdout",
        scenario.to_str().expect("utf8 path"),
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let text = std::fs::read_to_string(&scenario).expect("read");
    assert!(text.contains("Deleted [w1]."), "{text}");
}

#[test]
fn validate_flags_schema_violations() {
    let ws = temp_workspace("validate");
    let good = ws.join("good.yaml");
    std::fs::write(&good, PASSING).expect("write scenario");
    let bad = ws.join("bad.yaml");
    std::fs::write(&bad, "command: widgets list\nevents:\n- expect_stout: \"typo\"\n")
        .expect("write scenario");

    let out = run_cli(&["validate", good.to_str().expect("utf8")]);
    assert!(out.status.success());

    let out = run_cli(&["validate", bad.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(2));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("expect_stout"), "{text}");
}

#[test]
fn version_emits_json_when_asked() {
    let out = run_cli(&["--json", "version"]);
    assert!(out.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert!(parsed["version"].is_string());
}

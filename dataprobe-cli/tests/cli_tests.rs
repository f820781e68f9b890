use assert_cmd::Command;
use dataprobe_cli::mock_server::{bind, MockAnalysisServer, MockOptions};
use predicates::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::tempdir;

/// Serve a mock analysis service on a free port from a background runtime
fn spawn_mock(options: MockOptions) -> String {
    let (tx, rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let server = Arc::new(MockAnalysisServer::new(options));
            let (addr, serving) = bind(server, ([127, 0, 0, 1], 0).into()).unwrap();
            tx.send(addr).unwrap();
            serving.await;
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

fn probe_cmd(base_url: &str) -> Command {
    let mut cmd = Command::cargo_bin("dataprobe").unwrap();
    cmd.env_remove("DATAPROBE_BASE_URL")
        .args(["probe", "--file", "/data/bank.csv", "--poll-interval-ms", "10"])
        .args(["--base-url", base_url]);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("dataprobe").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("mock-server"));
}

#[test]
fn test_probe_requires_file() {
    let mut cmd = Command::cargo_bin("dataprobe").unwrap();
    cmd.arg("probe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
fn test_probe_prints_view_model_json() {
    let base_url = spawn_mock(MockOptions::default());

    let output = probe_cmd(&base_url).arg("--json").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["phase"], "completed");
    assert_eq!(view["preview"]["columns"][0]["pinned"], "start");
    assert_eq!(view["preview"]["columns"][4]["pinned"], "end");
    assert_eq!(view["preview"]["columns"][0]["width"], 150);
    assert_eq!(view["preview"]["rows"].as_array().unwrap().len(), 10);
    assert_eq!(view["profile"]["dataset_display_name"], "bank_marketing");
    assert_eq!(view["profile"]["columns"].as_array().unwrap().len(), 5);
}

#[test]
fn test_probe_filter_narrows_column_list() {
    let base_url = spawn_mock(MockOptions::default());

    probe_cmd(&base_url)
        .args(["--filter", "bal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ balance"))
        .stdout(predicate::str::contains("✓ marital").not());
}

#[test]
fn test_probe_writes_output_file() {
    let base_url = spawn_mock(MockOptions::default());
    let dir = tempdir().unwrap();
    let path = dir.path().join("result.json");

    probe_cmd(&base_url)
        .args(["--json", "--page", "2", "--rows", "15"])
        .arg("--output")
        .arg(&path)
        .assert()
        .success();

    let view: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(view["preview"]["rows"].as_array().unwrap().len(), 5);
    assert_eq!(view["preview"]["total_rows"], 15);
}

#[test]
fn test_probe_reports_failed_step() {
    let base_url = spawn_mock(MockOptions {
        fail_step: Some(1),
        ..MockOptions::default()
    });

    probe_cmd(&base_url)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed at step 1"))
        .stderr(predicate::str::contains("simulated load failure"));
}

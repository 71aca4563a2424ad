use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HOST_NETWORK_POD: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: api
spec:
  hostNetwork: true
  containers:
    - name: api
      image: api:1.0
"#;

const QUIET_POD: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: worker
spec:
  containers:
    - name: worker
      image: worker:2.1
"#;

fn sync_scan(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sync-scan").unwrap();
    // keep a developer's global config out of the run
    cmd.env("HOME", home);
    cmd
}

#[test]
fn clean_scan_exits_zero() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("worker.yaml"), QUIET_POD).unwrap();

    sync_scan(dir.path())
        .args(["scan", "-i", "k8s", "-r", "AC_K8S_0003", "-o", "json", "-d"])
        .arg(dir.path())
        .assert()
        .code(0)
        .stdout(predicate::str::contains("\"violations\": []"));
}

#[test]
fn violations_exit_three() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("api.yaml"), HOST_NETWORK_POD).unwrap();

    sync_scan(dir.path())
        .args(["scan", "-o", "json", "-d"])
        .arg(dir.path())
        .assert()
        .code(3)
        .stdout(predicate::str::contains("AC_K8S_0003"));
}

#[test]
fn directory_errors_exit_four() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("worker.yaml"), QUIET_POD).unwrap();
    fs::write(dir.path().join("broken.yaml"), "kind: [unclosed").unwrap();

    sync_scan(dir.path())
        .args(["scan", "-r", "AC_K8S_0003", "-o", "yaml", "-d"])
        .arg(dir.path())
        .assert()
        .code(4)
        .stdout(predicate::str::contains("scan_errors"));
}

#[test]
fn invalid_input_exits_one() {
    let dir = TempDir::new().unwrap();

    sync_scan(dir.path())
        .args(["scan", "-i", "k8s"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("empty iac path, either use '-f' or '-d' option"));

    sync_scan(dir.path())
        .args(["scan", "-i", "terraform", "-d"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("iac type or version not supported"));
}

#[test]
fn missing_config_file_exits_one() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("api.yaml"), HOST_NETWORK_POD).unwrap();

    sync_scan(dir.path())
        .args(["-c", "does-not-exist.toml", "scan", "-d"])
        .arg(dir.path())
        .assert()
        .code(1);
}

#[test]
fn config_file_skip_rules_apply() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("api.yaml"), HOST_NETWORK_POD).unwrap();
    let config = dir.path().join("scan.toml");
    fs::write(&config, "[rules]\nscan-rules = [\"AC_K8S_0003\"]\nskip-rules = [\"AC_K8S_0003\"]\n").unwrap();

    sync_scan(dir.path())
        .arg("-c")
        .arg(&config)
        .args(["scan", "-o", "json", "-d"])
        .arg(dir.path())
        .assert()
        .code(0);
}

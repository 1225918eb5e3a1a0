#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const GROUP_YAML: &str = r#"
name: cli-test
containers:
  - alias: api
    image: myapp:latest
    depends_on: [db, cache]
  - alias: db
    image: postgres:16
    ports: ["db.port:5432"]
  - alias: cache
    image: redis:7
  - alias: docs
    image: nginx
    skip: true
"#;

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("down"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shipyard"));
}

#[test]
fn test_up_help() {
    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("up")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-parallel"))
        .stdout(predicate::str::contains("--properties"));
}

/// 検証は起動順を段階ごとに表示する（Docker不要）
#[test]
fn test_validate_prints_start_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shipyard.yaml");
    fs::write(&path, GROUP_YAML).unwrap();

    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("validate")
        .arg("--file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("cli-test"))
        .stdout(predicate::str::contains("2. "))
        .stdout(predicate::str::contains("docs"));
}

/// カレントディレクトリの定義ファイルを見つける
#[test]
fn test_validate_discovers_group_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("shipyard.yaml"), GROUP_YAML).unwrap();

    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("SHIPYARD_CONFIG_PATH")
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_validate_rejects_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shipyard.yaml");
    fs::write(
        &path,
        r#"
name: cyclic
containers:
  - alias: a
    image: busybox
    depends_on: [b]
  - alias: b
    image: busybox
    depends_on: [a]
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("validate")
        .arg("--file")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("循環依存"));
}

#[test]
fn test_validate_rejects_ambiguous_cmd() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shipyard.yaml");
    fs::write(
        &path,
        r#"
name: broken
containers:
  - alias: a
    image: busybox
    cmd:
      shell: "echo hi"
      exec: ["echo", "hi"]
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("yard").unwrap();
    cmd.arg("validate")
        .arg("--file")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cmd"));
}

//! Tests for the `abu` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn abu(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("abu").unwrap();
    cmd.env("ABU_CONFIG", config_dir.path().join("config.toml")).env("ABU_NO_PROGRESS", "1");
    cmd
}

#[test]
fn test_digest_prints_sha256sum_line() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("hello.txt");
    std::fs::write(&file, b"Hello, World!").unwrap();

    abu(&temp)
        .arg("digest")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f  ",
        ));
}

#[test]
fn test_compare_versions() {
    let temp = TempDir::new().unwrap();

    abu(&temp).args(["compare", "1.2.10", "1.2.9"]).assert().success().stdout("1\n");
    abu(&temp).args(["compare", "1.0", "1.0.0"]).assert().success().stdout("0\n");
    abu(&temp).args(["compare", "0.9", "1.0"]).assert().success().stdout("-1\n");
}

#[test]
fn test_status_and_fallbacks_without_bundle() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    std::fs::write(
        temp.path().join("config.toml"),
        format!("data_dir = {:?}\n", data_dir.to_string_lossy()),
    )
    .unwrap();

    abu(&temp)
        .args(["status", "--native-version", "5.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No bundle installed"));
    abu(&temp).arg("fallbacks").assert().success().stdout(predicate::str::contains("No fallback bundles"));
}

#[test]
fn test_install_rejects_incomplete_release() {
    let temp = TempDir::new().unwrap();
    let release = temp.path().join("release.json");
    std::fs::write(&release, r#"{"downloadUrl":"http://127.0.0.1:9/b.zip"}"#).unwrap();

    abu(&temp)
        .args(["install", "--native-version", "5.0.0"])
        .arg(&release)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required fields"));
}

#[test]
fn test_rollback_to_unknown_bundle_fails() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    std::fs::write(
        temp.path().join("config.toml"),
        format!("data_dir = {:?}\n", data_dir.to_string_lossy()),
    )
    .unwrap();

    abu(&temp).args(["rollback", "1.0.0-36"]).assert().failure();
}

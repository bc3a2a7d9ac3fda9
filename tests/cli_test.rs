//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_rows(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("rows.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn kpis_command_prints_summary() {
    let dir = TempDir::new().unwrap();
    let rows = write_rows(&dir, r#"[{"cost": 10, "sales_1d": 0}, {"cost": 5, "sales_1d": 20}]"#);

    Command::cargo_bin("dvp")
        .unwrap()
        .arg("kpis")
        .arg(&rows)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"adSpend\": 15.0"))
        .stdout(predicate::str::contains("\"acos\": 75.0"));
}

#[test]
fn aggregate_command_prints_buckets() {
    let dir = TempDir::new().unwrap();
    let rows = write_rows(
        &dir,
        r#"[{"date": "2024-03-01", "cost": 2}, {"date": "2024-03-01", "cost": 3}]"#,
    );

    Command::cargo_bin("dvp")
        .unwrap()
        .arg("aggregate")
        .arg(&rows)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"date\": \"2024-03-01\""))
        .stdout(predicate::str::contains("\"spend\": 5.0"));
}

#[test]
fn sort_command_orders_numerically() {
    let dir = TempDir::new().unwrap();
    let rows = write_rows(&dir, r#"[{"v": "10"}, {"v": "2"}]"#);

    let output = Command::cargo_bin("dvp")
        .unwrap()
        .args(["sort", rows.to_str().unwrap(), "--by", "v"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let two = stdout.find("\"2\"").unwrap();
    let ten = stdout.find("\"10\"").unwrap();
    assert!(two < ten, "expected numeric order in output:\n{}", stdout);
}

#[test]
fn sort_command_rejects_bad_order() {
    let dir = TempDir::new().unwrap();
    let rows = write_rows(&dir, "[]");

    Command::cargo_bin("dvp")
        .unwrap()
        .args(["sort", rows.to_str().unwrap(), "--by", "v", "--order", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid sort order"));
}

#[test]
fn missing_rows_file_fails_with_context() {
    Command::cargo_bin("dvp")
        .unwrap()
        .args(["kpis", "/nonexistent/rows.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read rows file"));
}

#[test]
fn config_path_prints_toml_location() {
    Command::cargo_bin("dvp")
        .unwrap()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

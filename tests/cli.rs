use assert_cmd::prelude::*;
use std::{fs, process::Command};
use tempfile::TempDir;

fn write_env(dir: &TempDir) -> String {
    let env_path = dir.path().join("env");
    let content = "DATABASE_URL=postgres://localhost/sievr\nBIND_HTTP=127.0.0.1:0\nVERIFY_SIG=0\n";
    fs::write(&env_path, content).unwrap();
    env_path.to_str().unwrap().to_string()
}

fn explain(env_path: &str, filter: &str) -> assert_cmd::assert::Assert {
    Command::cargo_bin("sievr")
        .unwrap()
        .args(["--env", env_path, "explain", filter])
        .assert()
}

#[test]
fn explain_prints_translated_query() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir);
    let output = explain(&env_path, r#"{"kinds":[1],"since":1685577600}"#)
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("kind IN (1)"));
    assert!(text.contains("created_at > $1"));
    assert!(text.contains("ORDER BY created_at LIMIT 100"));
    assert!(text.contains("$1 = 1685577600"));
}

#[test]
fn explain_empty_filter_matches_everything() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir);
    let output = explain(&env_path, "{}")
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("WHERE true"));
    assert!(text.contains("LIMIT 100"));
}

#[test]
fn explain_binds_tag_values() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir);
    let output = explain(&env_path, r##"{"#e":["abc"],"#p":["def"]}"##)
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("tagvalues && ARRAY[$1,$2]"));
    assert!(text.contains("$1 = abc"));
    assert!(text.contains("$2 = def"));
    assert!(!text.contains("'abc'"));
}

#[test]
fn explain_reports_unsatisfiable_filters() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir);
    let output = explain(&env_path, r#"{"ids":[]}"#)
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("matches nothing"));
    assert!(!text.contains("SELECT"));
}

#[test]
fn explain_rejects_null_and_garbage() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir);
    explain(&env_path, "null").failure();
    explain(&env_path, "not json").failure();
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::cargo_bin("sievr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    for cmd in ["init", "ingest", "serve", "explain"] {
        assert!(text.contains(cmd));
    }
}

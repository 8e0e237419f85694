use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cstore_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cstore"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
root = "{}/data"

[search]
noise_tokens = ["ram", "gb", "ssd", "hdd"]

[sku]
length = 8
"#,
        root.display()
    );

    let config_path = config_dir.join("cstore.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cstore(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cstore_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cstore binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn seed(config_path: &Path) {
    for record in [
        r#"{"Name": "Red runner", "Concatenation": "red shoes size 9"}"#,
        r#"{"Name": "Blue runner", "Concatenation": "blue shoes size 10"}"#,
    ] {
        let (stdout, stderr, success) =
            run_cstore(config_path, &["upsert", "catalog", "shoes", record]);
        assert!(success, "upsert failed: stdout={}, stderr={}", stdout, stderr);
    }
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_cstore(&tmp.path().join("nope.toml"), &["ping", "catalog"]);
    assert!(!success);
    assert!(stderr.contains("configuration file not found"));
}

#[test]
fn test_ping_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_cstore(&config_path, &["ping", "catalog"]);
    assert!(success, "ping failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));
    assert!(tmp.path().join("data/catalog.sqlite").exists());
}

#[test]
fn test_upsert_prints_outcome_with_sku() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_cstore(
        &config_path,
        &["upsert", "catalog", "shoes", r#"{"Name": "x", "Color": ""}"#],
    );
    assert!(success, "upsert failed: stdout={}, stderr={}", stdout, stderr);

    let outcome: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(outcome["created_collection"], serde_json::json!(true));
    assert_eq!(outcome["sku"].as_str().unwrap().len(), 8);
}

#[test]
fn test_upsert_rejects_non_object() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_cstore(&config_path, &["upsert", "catalog", "shoes", "[1, 2]"]);
    assert!(!success);
}

#[test]
fn test_search_boolean_and_ranked() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let (stdout, _, success) =
        run_cstore(&config_path, &["search", "catalog", "shoes", "shoes size 9"]);
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Red runner"));
    assert!(!lines[0].contains("Concatenation"));

    let (stdout, _, success) = run_cstore(
        &config_path,
        &["search", "catalog", "shoes", "blue shoes", "--ranked"],
    );
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("Blue runner"));
    assert!(lines[0].contains("\"score\":2"));
}

#[test]
fn test_search_log_writes_history() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let (_, _, success) = run_cstore(
        &config_path,
        &["search", "catalog", "shoes", "red", "--log"],
    );
    assert!(success);

    let (stdout, _, success) = run_cstore(&config_path, &["stats", "search_history"]);
    assert!(success);
    assert!(stdout.contains("search_queries"));
    assert!(stdout.contains(" 1"));
}

#[test]
fn test_dedupe_and_normalize() {
    let (_tmp, config_path) = setup_test_env();
    for record in [
        r#"{"Model": "X"}"#,
        r#"{"Model": "X"}"#,
        r#"{"Model": "Y"}"#,
        r#"{"Model": "X"}"#,
    ] {
        let (_, _, success) = run_cstore(&config_path, &["upsert", "catalog", "items", record]);
        assert!(success);
    }

    let (stdout, _, success) = run_cstore(&config_path, &["dedupe", "catalog", "items", "Model"]);
    assert!(success);
    assert!(stdout.contains("duplicate rows: 3"));
    assert!(stdout.contains("deleted: 2"));

    let (stdout, _, success) = run_cstore(&config_path, &["normalize", "catalog", "items"]);
    assert!(success);
    assert!(stdout.contains("updated records: 0"));
}

#[test]
fn test_sku_check_and_index() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_cstore(
        &config_path,
        &["upsert", "catalog", "items", r#"{"SKU": "ABCD1234"}"#],
    );
    assert!(success);

    let (stdout, _, _) = run_cstore(&config_path, &["sku-check", "catalog", "items", "ABCD1234"]);
    assert_eq!(stdout.trim(), "in use");
    let (stdout, _, _) = run_cstore(&config_path, &["sku-check", "catalog", "items", "ZZZZ0000"]);
    assert_eq!(stdout.trim(), "available");

    let (stdout, _, success) = run_cstore(&config_path, &["sku-new", "catalog", "items"]);
    assert!(success);
    assert_eq!(stdout.trim().len(), 8);
    assert_ne!(stdout.trim(), "ABCD1234");

    let (_, stderr, success) = run_cstore(
        &config_path,
        &["index", "catalog", "items", "Brand", "Model"],
    );
    assert!(success, "index failed: {}", stderr);
}

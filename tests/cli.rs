//! Command-line interface.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("shapes.py"),
        "def area(w, h):\n    return w * h\n\nprint(area(2, 3))\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "x one\ntwo\nx three\n").unwrap();
    fs::write(
        dir.path().join(".graft.toml"),
        r#"test_command = "grep -c x notes.txt"
target_files = ["shapes.py", "notes.txt"]

[search]
epochs = 1
max_iter = 5
seed = 11
"#,
    )
    .unwrap();
    dir
}

fn graft(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_graft"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run graft")
}

#[test]
fn test_help() {
    let output = graft(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("search"));
    assert!(stdout.contains("points"));
}

#[test]
fn test_points_lists_statements_and_lines() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["points", project]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shapes.py"));
    assert!(stdout.contains("tree:python"));
    assert!(stdout.contains("return w * h"));
    assert!(stdout.contains("notes.txt"));
    assert!(stdout.contains("(line, 3 points)"));
}

#[test]
fn test_points_single_file_at_line_granularity() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["points", project, "--granularity", "line", "--file", "shapes.py"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(line, 4 points)"));
    assert!(!stdout.contains("notes.txt"));
}

#[test]
fn test_points_unknown_file() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["points", project, "--file", "missing.py"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.py"));
}

#[test]
fn test_search_prints_report() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["search", project, "--operators", "deletion", "--epochs", "2"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Search Report"));
    assert!(stdout.contains("Baseline fitness: 2"));
    assert!(stdout.contains("Epoch 1"));
    assert!(stdout.contains("Epoch 2"));
    assert!(stdout.contains("Summary:"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("epoch\titer\tstatus\tfitness\tpatch"));
}

#[test]
fn test_search_leaves_project_untouched() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["search", project, "--strategy", "tabu", "--max-iter", "8"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "x one\ntwo\nx three\n"
    );
}

#[test]
fn test_search_rejects_invalid_overrides() {
    let dir = setup_project();
    let project = dir.path().to_str().unwrap();
    let output = graft(&["search", project, "--epochs", "0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("search.epochs"));
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    let output = graft(&["points", dir.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(".graft"));
}

//! Integration tests for the command line (-c/--command, sheet files)

use std::process::Command;

fn run_command(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .arg("run")
        .arg("-q")
        .arg("--")
        .args(args)
        // Tests must not depend on a user's ~/.config/tabula/config.toml.
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("tabula_test_no_config"))
        .env("HOME", std::env::temp_dir().join("tabula_test_no_home"))
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn temp_file(name: &str, content: &str) -> (std::path::PathBuf, Cleanup) {
    let path = std::env::temp_dir().join(format!(
        "tabula_{}_{}_{:?}",
        name,
        std::process::id(),
        std::thread::current().id(),
    ));
    std::fs::write(&path, content).unwrap();
    (path.clone(), Cleanup(path))
}

struct Cleanup(std::path::PathBuf);
impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn test_basic_arithmetic() {
    let (stdout, _, code) = run_command(&["-c", "5 + 3"]);
    assert_eq!(stdout.trim(), "8");
    assert_eq!(code, 0);
}

#[test]
fn test_auto_prepend_equals() {
    let (stdout1, _, _) = run_command(&["-c", "10 + 5"]);
    let (stdout2, _, _) = run_command(&["-c", "=10 + 5"]);
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_if_returns_text() {
    let (stdout, _, code) = run_command(&["-c", "IF(10>5,\"Yes\",\"No\")"]);
    assert_eq!(stdout.trim(), "Yes");
    assert_eq!(code, 0);
}

#[test]
fn test_boolean_result() {
    let (stdout, _, code) = run_command(&["-c", "AND(TRUE, 1 < 2)"]);
    assert_eq!(stdout.trim(), "TRUE");
    assert_eq!(code, 0);
}

#[test]
fn test_division_by_zero() {
    let (stdout, _, code) = run_command(&["-c", "1/0"]);
    assert_eq!(stdout.trim(), "#DIV/0!");
    assert_eq!(code, 1);
}

#[test]
fn test_unknown_function() {
    let (stdout, _, code) = run_command(&["-c", "NOPE(1)"]);
    assert_eq!(stdout.trim(), "#NAME?");
    assert_eq!(code, 1);
}

#[test]
fn test_syntax_error() {
    let (stdout, stderr, code) = run_command(&["-c", "1 +"]);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Error"));
    assert_eq!(code, 1);
}

#[test]
fn test_unknown_option() {
    let (_, stderr, code) = run_command(&["--bogus"]);
    assert!(stderr.contains("Unknown option"));
    assert_eq!(code, 1);
}

#[test]
fn test_sheet_file_cell() {
    let (path, _cleanup) = temp_file(
        "sum.sheet",
        "# totals\nA1: 10\nA2: 20\nA3: 30\nA4: =SUM(A1:A3)\n",
    );
    let (stdout, _, code) = run_command(&[path.to_str().unwrap(), "--cell", "A4"]);
    assert_eq!(stdout.trim(), "60");
    assert_eq!(code, 0);
}

#[test]
fn test_sheet_file_listing() {
    let (path, _cleanup) = temp_file("list.sheet", "A1: 100\nB1: =A1*2\n[Other]\nA1: =Sheet1!B1+1\n");
    let (stdout, _, code) = run_command(&[path.to_str().unwrap()]);
    assert_eq!(code, 0);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["Sheet1!A1: 100", "Sheet1!B1: 200", "Other!A1: 201"]);
}

#[test]
fn test_command_reads_loaded_sheet() {
    let (path, _cleanup) = temp_file("cmd.sheet", "A1: 2\nA2: 3\n");
    let (stdout, _, code) = run_command(&[path.to_str().unwrap(), "-c", "A1*A2"]);
    assert_eq!(stdout.trim(), "6");
    assert_eq!(code, 0);
}

#[test]
fn test_cycle_in_sheet_file() {
    let (path, _cleanup) = temp_file("cycle.sheet", "A1: =B1\nB1: =A1\n");
    let (stdout, _, code) = run_command(&[path.to_str().unwrap(), "--cell", "A1"]);
    assert_eq!(stdout.trim(), "#CYCLE!");
    assert_eq!(code, 1);
}

#[test]
fn test_malformed_sheet_file() {
    let (path, _cleanup) = temp_file("bad.sheet", "A1 42\n");
    let (_, stderr, code) = run_command(&[path.to_str().unwrap()]);
    assert!(stderr.contains("line 1"));
    assert_eq!(code, 1);
}

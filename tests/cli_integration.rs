//! Integration tests for the command-line interface: set, values, diff,
//! lint and schema against a scratch workspace.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

const MANIFEST: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    field.knot8.io/replicas: /spec/replicas
    knot8.io/original: |
      replicas: \"3\"
spec:
  replicas: \"3\"
";

fn fieldlens(args: &[&str], dir: &TempDir) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_fieldlens"))
        .args(args)
        .current_dir(dir.path())
        .output()
        .expect("failed to run fieldlens")
}

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("app.yaml"), MANIFEST).unwrap();
    dir
}

#[test]
fn set_edits_in_place() {
    let dir = setup();
    let out = fieldlens(&["set", "-f", "app.yaml", "replicas=5"], &dir);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let content = fs::read_to_string(dir.path().join("app.yaml")).unwrap();
    assert!(content.contains("replicas: \"5\""), "content:\n{content}");
    assert!(content.contains("field.knot8.io/replicas"), "annotations survive");
}

#[test]
fn cat_streams_to_stdout_without_touching_the_file() {
    let dir = setup();
    let out = fieldlens(&["cat", "-f", "app.yaml", "replicas=5"], &dir);
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("replicas: \"5\""), "stdout:\n{stdout}");

    let content = fs::read_to_string(dir.path().join("app.yaml")).unwrap();
    assert!(content.contains("replicas: \"3\""), "file untouched:\n{content}");
}

#[test]
fn values_lists_names_and_single_fields() {
    let dir = setup();

    let out = fieldlens(&["values", "-f", "app.yaml", "--names-only"], &dir);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "replicas");

    let out = fieldlens(&["values", "-f", "app.yaml", "replicas"], &dir);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "3");
}

#[test]
fn diff_reports_drift_and_freeze_clears_it() {
    let dir = setup();

    let out = fieldlens(&["diff", "-f", "app.yaml"], &dir);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "{}");

    let out = fieldlens(&["set", "-f", "app.yaml", "replicas=5"], &dir);
    assert!(out.status.success());

    let out = fieldlens(&["diff", "-f", "app.yaml"], &dir);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("replicas"));

    let out = fieldlens(&["set", "-f", "app.yaml", "--freeze"], &dir);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let out = fieldlens(&["diff", "-f", "app.yaml"], &dir);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "{}");
}

#[test]
fn lint_fails_on_disagreeing_values() {
    let dir = setup();
    fs::write(
        dir.path().join("other.yaml"),
        MANIFEST
            .replace("name: app", "name: other")
            .replace("replicas: \"3\"\n", "replicas: \"4\"\n"),
    )
    .unwrap();

    let out = fieldlens(&["lint", "-f", "app.yaml"], &dir);
    assert!(out.status.success());

    let out = fieldlens(&["lint", "-f", "app.yaml", "-f", "other.yaml"], &dir);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not unique"));
}

#[test]
fn schema_emits_annotated_manifests() {
    let dir = setup();
    let out = fieldlens(&["schema", "-f", "app.yaml"], &dir);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("apiVersion: apps/v1"), "stdout:\n{stdout}");
    assert!(stdout.contains("field.knot8.io/replicas"), "stdout:\n{stdout}");
}

#[test]
fn unknown_field_exits_nonzero() {
    let dir = setup();
    let out = fieldlens(&["set", "-f", "app.yaml", "nope=1"], &dir);
    assert!(!out.status.success());
}

//! Workflow tests against real files: discovery, batched sets, commits,
//! freeze/diff, schema merging, and the three-way pull.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use fieldlens::buffer::FileSource;
use fieldlens::{fields, open_set, Error, LensMap};

fn write_manifest(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sources(paths: &[&PathBuf]) -> Vec<FileSource> {
    paths.iter().map(|p| FileSource::Path((*p).clone())).collect()
}

const APP: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    field.knot8.io/replicas: /spec/replicas
    field.knot8.io/image: /spec/template/spec/containers/~{\"name\":\"app\"}/image
spec:
  replicas: \"3\"
  template:
    spec:
      containers:
        - name: app
          image: registry/app:v1
";

const CONFIG: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  annotations:
    field.knot8.io/replicas: /data/settings/~(yaml)/replicas
data:
  settings: |
    replicas: \"3\"
    debug: \"false\"
";

#[test]
fn set_commits_across_files_and_formats() {
    let dir = TempDir::new().unwrap();
    let app = write_manifest(&dir, "app.yaml", APP);
    let config = write_manifest(&dir, "config.yaml", CONFIG);

    let lenses = LensMap::default();
    let set = open_set(sources(&[&app, &config]), None).unwrap();
    set.fields.check_uniqueness(&lenses).unwrap();

    let mut batch = set.fields.new_edit_batch(&lenses);
    batch.set("replicas", "5").unwrap();
    batch.set("image", "registry/app:v2").unwrap();
    batch.commit().unwrap();
    set.manifests.commit().unwrap();

    let app_out = fs::read_to_string(&app).unwrap();
    assert!(app_out.contains("replicas: \"5\""), "app:\n{app_out}");
    assert!(app_out.contains("image: registry/app:v2"), "app:\n{app_out}");

    let config_out = fs::read_to_string(&config).unwrap();
    assert!(
        config_out.contains("replicas: \"5\""),
        "config:\n{config_out}"
    );
    assert!(
        config_out.contains("debug: \"false\""),
        "config:\n{config_out}"
    );

    // A fresh load observes the new values everywhere.
    let reloaded = open_set(sources(&[&app, &config]), None).unwrap();
    assert_eq!(reloaded.fields.get_value("replicas", &lenses).unwrap(), "5");
}

#[test]
fn lint_reports_disagreeing_pointers() {
    let dir = TempDir::new().unwrap();
    let app = write_manifest(&dir, "app.yaml", APP);
    let config = write_manifest(
        &dir,
        "config.yaml",
        &CONFIG.replace("replicas: \"3\"", "replicas: \"4\""),
    );

    let lenses = LensMap::default();
    let set = open_set(sources(&[&app, &config]), None).unwrap();
    let err = set.fields.check_uniqueness(&lenses).unwrap_err();
    assert!(err.is_values_not_unique());
}

#[test]
fn schema_file_declares_fields_out_of_band() {
    let plain = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
spec:
  replicas: \"3\"
";
    let schema = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    field.knot8.io/replicas: /spec/replicas
";
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir, "app.yaml", plain);
    let schema = write_manifest(&dir, "schema.yaml", schema);

    let lenses = LensMap::default();
    let set = open_set(
        sources(&[&manifest]),
        Some(FileSource::Path(schema)),
    )
    .unwrap();

    assert_eq!(set.fields.names(), vec!["replicas".to_string()]);
    assert_eq!(set.fields.get_value("replicas", &lenses).unwrap(), "3");

    // The schema-declared pointer edits the plain manifest.
    let mut batch = set.fields.new_edit_batch(&lenses);
    batch.set("replicas", "7").unwrap();
    batch.commit().unwrap();
    set.manifests.commit().unwrap();
    assert!(fs::read_to_string(&manifest)
        .unwrap()
        .contains("replicas: \"7\""));
}

const FROZEN: &str = "\
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

#[test]
fn freeze_then_diff_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "app.yaml", FROZEN);
    let lenses = LensMap::default();

    // No drift right after freezing.
    let set = open_set(sources(&[&path]), None).unwrap();
    assert!(fields::diff(&set, &lenses).unwrap().is_empty());

    // Drift appears after a set...
    let mut batch = set.fields.new_edit_batch(&lenses);
    batch.set("replicas", "5").unwrap();
    batch.commit().unwrap();
    set.manifests.commit().unwrap();

    let set = open_set(sources(&[&path]), None).unwrap();
    let dirty = fields::diff(&set, &lenses).unwrap();
    assert_eq!(dirty.get("replicas").map(String::as_str), Some("5"));

    // ...and freezing again clears it.
    fields::freeze(&set, &lenses).unwrap();
    set.manifests.commit().unwrap();

    let set = open_set(sources(&[&path]), None).unwrap();
    assert!(fields::diff(&set, &lenses).unwrap().is_empty());
}

#[test]
fn pull_applies_local_edits_to_upstream() {
    let dir = TempDir::new().unwrap();
    let local_path = write_manifest(
        &dir,
        "local.yaml",
        &FROZEN.replace("spec:\n  replicas: \"3\"", "spec:\n  replicas: \"5\""),
    );
    // Upstream moved to 4 and froze there, keeping its own annotations.
    let upstream_path = write_manifest(
        &dir,
        "upstream.yaml",
        &FROZEN.replace("\"3\"", "\"4\""),
    );

    let lenses = LensMap::default();
    let local = open_set(sources(&[&local_path]), None).unwrap();
    let upstream = open_set(sources(&[&upstream_path]), None).unwrap();

    fields::pull(&local, &upstream, &lenses).unwrap();
    local.manifests.commit().unwrap();

    let merged = fs::read_to_string(&local_path).unwrap();
    assert!(
        merged.contains("replicas: \"5\""),
        "local edit survives the merge:\n{merged}"
    );
    assert!(
        merged.contains("knot8.io/original"),
        "upstream annotations survive:\n{merged}"
    );
}

#[test]
fn pull_rejects_multiple_local_files() {
    let dir = TempDir::new().unwrap();
    let a = write_manifest(&dir, "a.yaml", FROZEN);
    let b = write_manifest(&dir, "b.yaml", &FROZEN.replace("name: app", "name: other"));
    let upstream = write_manifest(&dir, "up.yaml", FROZEN);

    let lenses = LensMap::default();
    let local = open_set(sources(&[&a, &b]), None).unwrap();
    let upstream = open_set(sources(&[&upstream]), None).unwrap();

    assert!(matches!(
        fields::pull(&local, &upstream, &lenses),
        Err(Error::Syntax { .. })
    ));
}

#[test]
fn parse_failure_is_fatal_for_the_file() {
    let dir = TempDir::new().unwrap();
    let bad = write_manifest(&dir, "bad.yaml", "apiVersion: v1\nkind: [unclosed\n");
    assert!(open_set(sources(&[&bad]), None).is_err());
}

#[test]
fn non_manifest_files_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let plain = write_manifest(&dir, "notes.yaml", "just: notes\n");
    let app = write_manifest(&dir, "app.yaml", APP);

    let set = open_set(sources(&[&plain, &app]), None).unwrap();
    assert_eq!(set.manifests.0.len(), 1);
}

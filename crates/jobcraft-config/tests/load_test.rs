//! Loading definitions from disk.

use jobcraft_config::{ConfigError, load_job, load_pipeline};

#[test]
fn test_load_job_from_yaml_file() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("score.yaml");
  std::fs::write(
    &path,
    "job_id: score\nsteps:\n  - step_id: a\n    op: compute.llm\n    params: {prompt: \"@payload.text\"}\n",
  )
  .unwrap();

  let job = load_job(&path).unwrap();
  assert_eq!(job.job_id, "score");
  assert_eq!(job.steps[0].op, "compute.llm");
}

#[test]
fn test_load_pipeline_from_json_file() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("nightly.json");
  std::fs::write(
    &path,
    r#"{"pipeline_id": "nightly", "stop_on_failure": false, "entries": [{"job": "a"}]}"#,
  )
  .unwrap();

  let pipeline = load_pipeline(&path).unwrap();
  assert!(!pipeline.stop_on_failure);
  assert_eq!(pipeline.entries.len(), 1);
}

#[test]
fn test_load_rejects_unknown_extension() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("job.toml");
  std::fs::write(&path, "job_id = 'x'").unwrap();

  assert!(matches!(
    load_job(&path),
    Err(ConfigError::UnknownFormat { .. })
  ));
}

#[test]
fn test_load_missing_file() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let result = load_job(&dir.path().join("missing.json"));
  assert!(matches!(result, Err(ConfigError::Io { .. })));
}

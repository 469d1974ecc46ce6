//! Loading definitions from JSON or YAML documents.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::job::JobDef;
use crate::pipeline::PipelineDef;

/// Serialization format of a definition document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
  Json,
  Yaml,
}

impl DefinitionFormat {
  /// Pick the format from a file extension (`json`, `yaml`, `yml`).
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Some(DefinitionFormat::Json),
      Some("yaml") | Some("yml") => Some(DefinitionFormat::Yaml),
      _ => None,
    }
  }

  /// Extensions probed when looking definitions up by id.
  pub fn extensions() -> &'static [&'static str] {
    &["json", "yaml", "yml"]
  }
}

fn parse<T: DeserializeOwned>(content: &str, format: DefinitionFormat) -> Result<T, ConfigError> {
  match format {
    DefinitionFormat::Json => Ok(serde_json::from_str(content)?),
    DefinitionFormat::Yaml => Ok(serde_yaml::from_str(content)?),
  }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
  let format = DefinitionFormat::from_path(path).ok_or_else(|| ConfigError::UnknownFormat {
    path: path.to_path_buf(),
  })?;
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  parse(&content, format)
}

/// Parse a job definition from a string.
pub fn parse_job(content: &str, format: DefinitionFormat) -> Result<JobDef, ConfigError> {
  parse(content, format)
}

/// Parse a pipeline definition from a string.
pub fn parse_pipeline(content: &str, format: DefinitionFormat) -> Result<PipelineDef, ConfigError> {
  parse(content, format)
}

/// Read and parse a job definition file; the format follows the extension.
pub fn load_job(path: &Path) -> Result<JobDef, ConfigError> {
  load(path)
}

/// Read and parse a pipeline definition file; the format follows the extension.
pub fn load_pipeline(path: &Path) -> Result<PipelineDef, ConfigError> {
  load(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::PipelineEntry;
  use serde_json::json;

  #[test]
  fn test_parse_job_json_defaults() {
    let job = parse_job(
      r#"{"job_id": "j1", "steps": [{"step_id": "a", "op": "call", "params": {"callable": "double", "x": 5}}]}"#,
      DefinitionFormat::Json,
    )
    .unwrap();

    assert_eq!(job.job_id, "j1");
    assert_eq!(job.version, "2.0");
    assert_eq!(job.steps.len(), 1);
    assert!(!job.steps[0].continue_on_error);
    assert_eq!(job.steps[0].max_attempts, None);
    assert_eq!(job.steps[0].params["x"], 5);
  }

  #[test]
  fn test_parse_job_yaml() {
    let yaml = r#"
job_id: ingest
version: "1.0"
steps:
  - step_id: extract
    op: call
    params:
      callable: extract
      source: "@payload.source"
  - step_id: store
    op: storacle.submit
    continue_on_error: true
"#;
    let job = parse_job(yaml, DefinitionFormat::Yaml).unwrap();

    assert_eq!(job.version, "1.0");
    assert_eq!(job.steps[0].params["source"], "@payload.source");
    assert!(job.steps[1].continue_on_error);
    assert_eq!(job.steps[1].params, json!({}));
  }

  #[test]
  fn test_parse_pipeline_entries() {
    let pipeline = parse_pipeline(
      r#"{"pipeline_id": "nightly", "entries": [{"job": "ingest"}, {"pipeline": "scoring", "payload": {"cohort": "a"}}]}"#,
      DefinitionFormat::Json,
    )
    .unwrap();

    assert!(pipeline.stop_on_failure);
    assert_eq!(pipeline.entries[0], PipelineEntry::job("ingest"));
    assert_eq!(pipeline.entries[1].label(), "pipeline:scoring");
    assert_eq!(pipeline.entries[1].payload(), Some(&json!({"cohort": "a"})));
  }

  #[test]
  fn test_format_from_path() {
    assert_eq!(
      DefinitionFormat::from_path(Path::new("jobs/a.yml")),
      Some(DefinitionFormat::Yaml)
    );
    assert_eq!(
      DefinitionFormat::from_path(Path::new("a.json")),
      Some(DefinitionFormat::Json)
    );
    assert_eq!(DefinitionFormat::from_path(Path::new("a.toml")), None);
  }
}

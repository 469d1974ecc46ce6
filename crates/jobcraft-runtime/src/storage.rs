//! Boundary to the external storage/query collaborator.
//!
//! The core sends `{operation, params}` and expects
//! `{rows?, count?, ok, error?}` back; everything else about the backend is
//! opaque.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOperation {
  Query,
  Submit,
}

impl StorageOperation {
  pub fn as_str(&self) -> &'static str {
    match self {
      StorageOperation::Query => "query",
      StorageOperation::Submit => "submit",
    }
  }
}

impl fmt::Display for StorageOperation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRequest {
  pub operation: StorageOperation,
  pub params: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageResponse {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rows: Option<Vec<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub count: Option<u64>,
  pub ok: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl StorageResponse {
  /// A successful response carrying rows.
  pub fn rows(rows: Vec<Value>) -> Self {
    Self {
      count: Some(rows.len() as u64),
      rows: Some(rows),
      ok: true,
      error: None,
    }
  }

  /// A rejected request.
  pub fn rejected(error: impl Into<String>) -> Self {
    Self {
      ok: false,
      error: Some(error.into()),
      ..Self::default()
    }
  }

  /// The step output for an accepted response: the present data fields.
  pub(crate) fn into_output(self) -> Value {
    let mut out = Map::new();
    if let Some(rows) = self.rows {
      out.insert("rows".to_string(), Value::Array(rows));
    }
    if let Some(count) = self.count {
      out.insert("count".to_string(), Value::from(count));
    }
    out.insert("ok".to_string(), Value::Bool(true));
    Value::Object(out)
  }
}

/// The storage/query collaborator behind `storacle.query` and `storacle.submit`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
  /// Execute a request. Transport failures are errors; a backend that
  /// understood and refused the request answers `ok: false` instead.
  async fn execute(&self, request: StorageRequest) -> Result<StorageResponse, HandlerError>;
}

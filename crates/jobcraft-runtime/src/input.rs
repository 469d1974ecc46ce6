//! Step parameter resolution.
//!
//! Resolves the references in a step's params against the run context:
//!
//! - `@payload...` looks into the job's input payload
//! - `@run.<step_id>...` looks into the output recorded for an earlier step
//!
//! Resolution is single-pass. A referenced value is copied into the params as
//! is, even when it is itself a string that starts with `@`.
//!
//! # Example
//! ```json
//! { "callable": "add", "x": "@run.a.value", "y": 1 }
//! ```
//! with `run = {"a": {"value": 10}}` resolves to
//! ```json
//! { "callable": "add", "x": 10, "y": 1 }
//! ```

use indexmap::IndexMap;
use jobcraft_job::{ParamTemplate, Reference, ReferenceSyntaxError, Root, Segment, StringLeaf, classify};
use serde_json::{Map, Value};

use crate::error::ResolutionError;

/// What references can see while a step is being resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
  pub payload: &'a Value,
  /// Outputs (or error markers) of the steps run so far.
  pub run: &'a IndexMap<String, Value>,
}

impl<'a> ResolutionContext<'a> {
  pub fn new(payload: &'a Value, run: &'a IndexMap<String, Value>) -> Self {
    Self { payload, run }
  }
}

/// Resolve a compiled params template.
pub fn resolve_template(
  step_id: &str,
  template: &ParamTemplate,
  ctx: &ResolutionContext<'_>,
) -> Result<Value, ResolutionError> {
  match template {
    ParamTemplate::Literal(value) => Ok(value.clone()),
    ParamTemplate::Reference(reference) => resolve_reference(step_id, reference, ctx),
    ParamTemplate::Array(items) => items
      .iter()
      .map(|item| resolve_template(step_id, item, ctx))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    ParamTemplate::Object(fields) => {
      let mut map = Map::with_capacity(fields.len());
      for (key, field) in fields {
        map.insert(key.clone(), resolve_template(step_id, field, ctx)?);
      }
      Ok(Value::Object(map))
    }
  }
}

/// Resolve a raw JSON value, parsing reference strings as they are met.
pub fn resolve_value(
  step_id: &str,
  value: &Value,
  ctx: &ResolutionContext<'_>,
) -> Result<Value, ResolutionError> {
  match value {
    Value::String(s) => match classify(s) {
      StringLeaf::Literal(literal) => Ok(Value::String(literal.to_string())),
      StringLeaf::Reference(raw) => {
        let reference = Reference::parse(raw).map_err(|e| syntax_error(step_id, e))?;
        resolve_reference(step_id, &reference, ctx)
      }
    },
    Value::Array(items) => items
      .iter()
      .map(|item| resolve_value(step_id, item, ctx))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => {
      let mut resolved = Map::with_capacity(map.len());
      for (key, field) in map {
        resolved.insert(key.clone(), resolve_value(step_id, field, ctx)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

/// Look a single reference up in the context.
pub fn resolve_reference(
  step_id: &str,
  reference: &Reference,
  ctx: &ResolutionContext<'_>,
) -> Result<Value, ResolutionError> {
  let mut current = match reference.root() {
    Root::Payload => ctx.payload,
    Root::Run(target) => ctx
      .run
      .get(target)
      .ok_or_else(|| ResolutionError::UnresolvedStep {
        step_id: step_id.to_string(),
        reference: reference.raw().to_string(),
        target: target.clone(),
      })?,
  };

  for segment in reference.path() {
    current = match (segment, current) {
      (Segment::Field(name), Value::Object(map)) => map.get(name),
      (Segment::Index(index), Value::Array(items)) => {
        Some(items.get(*index).ok_or_else(|| ResolutionError::Index {
          step_id: step_id.to_string(),
          reference: reference.raw().to_string(),
          index: *index,
          len: items.len(),
        })?)
      }
      _ => None,
    }
    .ok_or_else(|| ResolutionError::PathNotFound {
      step_id: step_id.to_string(),
      reference: reference.raw().to_string(),
      segment: segment.to_string(),
    })?;
  }

  Ok(current.clone())
}

fn syntax_error(step_id: &str, error: ReferenceSyntaxError) -> ResolutionError {
  match error {
    ReferenceSyntaxError::UnknownRoot { reference, root } => ResolutionError::UnknownRoot {
      step_id: step_id.to_string(),
      reference,
      root,
    },
    ReferenceSyntaxError::Malformed { reference, message } => ResolutionError::Malformed {
      step_id: step_id.to_string(),
      reference,
      message,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn run_outputs() -> IndexMap<String, Value> {
    let mut run = IndexMap::new();
    run.insert("a".to_string(), json!({"value": 10, "rows": [{"id": 1}, {"id": 2}]}));
    run.insert("s".to_string(), json!("@payload"));
    run
  }

  #[test]
  fn test_resolve_nested_structure() {
    let payload = json!({"patient": {"id": "p-1"}});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);

    let params = json!({
      "x": "@run.a.value",
      "ids": ["@run.a.rows[1].id", "@payload.patient.id", 3],
      "whole": "@run.a",
      "literal": "@@run.a"
    });
    let resolved = resolve_value("b", &params, &ctx).unwrap();

    assert_eq!(
      resolved,
      json!({
        "x": 10,
        "ids": [2, "p-1", 3],
        "whole": {"value": 10, "rows": [{"id": 1}, {"id": 2}]},
        "literal": "@run.a"
      })
    );
  }

  #[test]
  fn test_template_and_raw_resolution_agree() {
    let payload = json!({"n": 4});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);
    let params = json!({"x": "@run.a.rows[0]", "y": ["@payload.n", "plain"]});

    let template = ParamTemplate::parse(&params).unwrap();
    assert_eq!(
      resolve_template("b", &template, &ctx).unwrap(),
      resolve_value("b", &params, &ctx).unwrap()
    );
  }

  #[test]
  fn test_resolution_is_single_pass() {
    let payload = json!({});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);

    assert_eq!(resolve_value("b", &json!("@run.s"), &ctx).unwrap(), json!("@payload"));
  }

  #[test]
  fn test_unresolved_step() {
    let payload = json!({});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);

    let err = resolve_value("b", &json!({"x": "@run.missing.value"}), &ctx).unwrap_err();
    assert_eq!(
      err,
      ResolutionError::UnresolvedStep {
        step_id: "b".to_string(),
        reference: "@run.missing.value".to_string(),
        target: "missing".to_string(),
      }
    );
  }

  #[test]
  fn test_path_not_found() {
    let payload = json!({"a": 1});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);

    let err = resolve_value("b", &json!("@run.a.nope"), &ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::PathNotFound { ref segment, .. } if segment == ".nope"));

    // indexing into a non-list is a missing path, not an index error
    let err = resolve_value("b", &json!("@payload.a[0]"), &ctx).unwrap_err();
    assert!(matches!(err, ResolutionError::PathNotFound { .. }));
  }

  #[test]
  fn test_index_out_of_bounds() {
    let payload = json!({});
    let run = run_outputs();
    let ctx = ResolutionContext::new(&payload, &run);

    let err = resolve_value("b", &json!("@run.a.rows[5]"), &ctx).unwrap_err();
    assert_eq!(
      err,
      ResolutionError::Index {
        step_id: "b".to_string(),
        reference: "@run.a.rows[5]".to_string(),
        index: 5,
        len: 2,
      }
    );
    assert_eq!(err.reference(), "@run.a.rows[5]");
  }

  #[test]
  fn test_raw_values_report_syntax_errors() {
    let payload = json!({});
    let run = IndexMap::new();
    let ctx = ResolutionContext::new(&payload, &run);

    assert!(matches!(
      resolve_value("b", &json!("@env.HOME"), &ctx),
      Err(ResolutionError::UnknownRoot { ref root, .. }) if root == "env"
    ));
    assert!(matches!(
      resolve_value("b", &json!("@payload.items[x]"), &ctx),
      Err(ResolutionError::Malformed { .. })
    ));
  }
}

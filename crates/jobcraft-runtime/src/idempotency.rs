//! Idempotency keys for step manifests.
//!
//! A key is `sha256:` followed by the hex SHA-256 of the op name, a newline,
//! and the canonical JSON of the resolved params. Canonical JSON sorts object
//! keys and emits no whitespace, so the key only changes when a value does.

use std::fmt::Write;

use jobcraft_job::Op;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derive the idempotency key for an op and its resolved params.
pub fn idempotency_key(op: &Op, params: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(op.name().as_bytes());
  hasher.update(b"\n");
  hasher.update(canonical_json(params).as_bytes());
  format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Serialize a value with sorted object keys and no whitespace.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut entries: Vec<_> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (key, item)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        // Display on a JSON string value writes it quoted and escaped
        let _ = write!(out, "{}:", Value::String(key.clone()));
        write_canonical(item, out);
      }
      out.push('}');
    }
    scalar => {
      let _ = write!(out, "{}", scalar);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_canonical_json_sorts_keys() {
    let value = json!({"b": [1, {"z": null, "a": "x"}], "a": true});
    assert_eq!(canonical_json(&value), r#"{"a":true,"b":[1,{"a":"x","z":null}]}"#);
  }

  #[test]
  fn test_canonical_json_escapes_strings() {
    assert_eq!(canonical_json(&json!({"k\"": "line\n"})), r#"{"k\"":"line\n"}"#);
  }

  #[test]
  fn test_key_is_stable_for_equal_params() {
    let a = json!({"x": 5, "nested": {"p": [1, 2], "q": "s"}});
    let b = json!({"nested": {"q": "s", "p": [1, 2]}, "x": 5});
    let op = Op::Compute("transform".to_string());

    assert_eq!(idempotency_key(&op, &a), idempotency_key(&op, &b));
    assert!(idempotency_key(&op, &a).starts_with("sha256:"));
    assert_eq!(idempotency_key(&op, &a).len(), "sha256:".len() + 64);
  }

  #[test]
  fn test_key_changes_with_any_leaf() {
    let op = Op::Call;
    let base = idempotency_key(&op, &json!({"callable": "double", "x": [1, 2]}));

    assert_ne!(base, idempotency_key(&op, &json!({"callable": "double", "x": [1, 3]})));
    assert_ne!(base, idempotency_key(&op, &json!({"callable": "add", "x": [1, 2]})));
    assert_ne!(base, idempotency_key(&Op::PlanBuild, &json!({"callable": "double", "x": [1, 2]})));
  }
}

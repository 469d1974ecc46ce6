use std::collections::HashSet;

use jobcraft_config::{JobDef, StepDef};
use jobcraft_job::{
  FieldView, JobInstance, Op, ParamTemplate, ReferenceSyntaxError, StepInstance,
};
use tracing::debug;

use crate::error::CompileError;

/// Schema major versions this compiler accepts.
pub const SUPPORTED_MAJOR_VERSIONS: &[u32] = &[1, 2];

/// Compiler transforms a JobDef into a JobInstance.
pub trait Compiler: Send + Sync {
  /// Compile a job definition for one invocation.
  ///
  /// This process:
  /// 1. Validates ids, schema version and op names
  /// 2. Parses every reference and checks it only points at earlier steps
  /// 3. Checks the params each op requires
  ///
  /// References are not resolved here; step outputs only exist at run time.
  fn compile(&self, def: &JobDef, payload: serde_json::Value) -> Result<JobInstance, CompileError>;

  /// Validate a job definition without binding a payload.
  fn validate(&self, def: &JobDef) -> Result<(), CompileError> {
    self.compile(def, serde_json::Value::Null).map(|_| ())
  }
}

/// Standard compiler implementation.
#[derive(Debug, Clone, Default)]
pub struct StandardCompiler;

impl StandardCompiler {
  pub fn new() -> Self {
    Self
  }

  fn check_version(&self, def: &JobDef) -> Result<(), CompileError> {
    let major = def
      .version
      .split('.')
      .next()
      .and_then(|m| m.trim().parse::<u32>().ok());

    match major {
      Some(m) if SUPPORTED_MAJOR_VERSIONS.contains(&m) => Ok(()),
      _ => Err(CompileError::UnsupportedVersion {
        job_id: def.job_id.clone(),
        version: def.version.clone(),
      }),
    }
  }

  /// Compile a single step given the ids of every earlier step.
  fn compile_step(
    &self,
    step: &StepDef,
    earlier: &HashSet<&str>,
    all_ids: &HashSet<&str>,
  ) -> Result<StepInstance, CompileError> {
    let op: Op = step.op.parse().map_err(|_| CompileError::UnknownOp {
      step_id: step.step_id.clone(),
      op: step.op.clone(),
    })?;

    if !step.params.is_object() {
      return Err(CompileError::InvalidParams {
        step_id: step.step_id.clone(),
        message: "params must be an object".to_string(),
      });
    }

    let template = ParamTemplate::parse(&step.params).map_err(|e| {
      let (reference, message) = match &e {
        ReferenceSyntaxError::UnknownRoot { reference, root } => {
          (reference.clone(), format!("unknown root '{}'", root))
        }
        ReferenceSyntaxError::Malformed { reference, message } => {
          (reference.clone(), message.clone())
        }
      };
      CompileError::MalformedReference {
        step_id: step.step_id.clone(),
        reference,
        message,
      }
    })?;

    for reference in template.references() {
      let Some(target) = reference.step_id() else {
        continue;
      };
      if target == step.step_id {
        return Err(CompileError::SelfReference {
          step_id: step.step_id.clone(),
          reference: reference.raw().to_string(),
        });
      }
      if !earlier.contains(target) {
        let err = if all_ids.contains(target) {
          CompileError::ForwardReference {
            step_id: step.step_id.clone(),
            target: target.to_string(),
            reference: reference.raw().to_string(),
          }
        } else {
          CompileError::UnknownStep {
            step_id: step.step_id.clone(),
            target: target.to_string(),
            reference: reference.raw().to_string(),
          }
        };
        return Err(err);
      }
    }

    check_op_params(&step.step_id, &op, &template)?;

    Ok(StepInstance {
      step_id: step.step_id.clone(),
      op,
      params: step.params.clone(),
      template,
      continue_on_error: step.continue_on_error,
      max_attempts: step.max_attempts,
    })
  }
}

impl Compiler for StandardCompiler {
  fn compile(&self, def: &JobDef, payload: serde_json::Value) -> Result<JobInstance, CompileError> {
    if def.job_id.trim().is_empty() {
      return Err(CompileError::EmptyJobId);
    }
    self.check_version(def)?;

    // Collect step IDs and check for duplicates
    let mut all_ids = HashSet::new();
    for (index, step) in def.steps.iter().enumerate() {
      if step.step_id.trim().is_empty() {
        return Err(CompileError::EmptyStepId { index });
      }
      if step.step_id.contains(['.', '[', ']']) {
        return Err(CompileError::InvalidStepId {
          step_id: step.step_id.clone(),
        });
      }
      if !all_ids.insert(step.step_id.as_str()) {
        return Err(CompileError::DuplicateStepId {
          step_id: step.step_id.clone(),
        });
      }
    }

    let mut earlier = HashSet::new();
    let mut steps = Vec::with_capacity(def.steps.len());
    for step in &def.steps {
      steps.push(self.compile_step(step, &earlier, &all_ids)?);
      earlier.insert(step.step_id.as_str());
    }

    debug!(job_id = %def.job_id, steps = steps.len(), "job compiled");

    Ok(JobInstance {
      job_id: def.job_id.clone(),
      version: def.version.clone(),
      steps,
      payload,
    })
  }
}

/// Check the params an op needs that can be known before execution.
///
/// Fields filled by references are checked again at dispatch time.
fn check_op_params(step_id: &str, op: &Op, template: &ParamTemplate) -> Result<(), CompileError> {
  let invalid = |message: &str| CompileError::InvalidParams {
    step_id: step_id.to_string(),
    message: message.to_string(),
  };

  match op {
    Op::Call => match template.field("callable") {
      Some(FieldView::Literal(serde_json::Value::String(name))) if !name.is_empty() => Ok(()),
      Some(FieldView::Dynamic(_)) => Err(invalid("'callable' must be a literal name")),
      _ => Err(invalid("'call' requires a non-empty string 'callable'")),
    },
    Op::PlanBuild => {
      match template.field("method") {
        Some(FieldView::Literal(serde_json::Value::String(_))) | Some(FieldView::Dynamic(_)) => {}
        _ => return Err(invalid("'plan.build' requires a string 'method'")),
      }
      match template.field("items") {
        Some(FieldView::Literal(serde_json::Value::Array(items))) if items.len() == 1 => Ok(()),
        Some(FieldView::Dynamic(ParamTemplate::Array(items))) if items.len() == 1 => Ok(()),
        Some(FieldView::Dynamic(ParamTemplate::Reference(_))) => Ok(()),
        _ => Err(invalid("'plan.build' requires 'items' to be a single-element list")),
      }
    }
    Op::JobRun => match template.field("job_id") {
      Some(FieldView::Literal(serde_json::Value::String(id))) if !id.is_empty() => Ok(()),
      _ => Err(invalid("'job.run' requires a literal non-empty 'job_id'")),
    },
    Op::StoracleQuery | Op::StoracleSubmit | Op::Compute(_) => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use jobcraft_config::StepDef;
  use serde_json::json;

  fn step(id: &str, op: &str, params: serde_json::Value) -> StepDef {
    StepDef::new(id, op, params)
  }

  #[test]
  fn test_compile_simple_job() {
    let def = JobDef::new(
      "j1",
      vec![
        step("a", "call", json!({"callable": "double", "x": 5})),
        step("b", "call", json!({"callable": "add", "x": "@run.a.value", "y": 1})),
      ],
    );

    let instance = StandardCompiler::new()
      .compile(&def, json!({"k": 1}))
      .unwrap();

    assert_eq!(instance.job_id, "j1");
    assert_eq!(instance.step_ids(), vec!["a", "b"]);
    assert_eq!(instance.payload, json!({"k": 1}));
    assert_eq!(instance.get_step("b").unwrap().depends_on(), vec!["a"]);
    assert!(instance.get_step("a").unwrap().template.is_literal());
  }

  #[test]
  fn test_empty_job_id() {
    let def = JobDef::new("  ", vec![]);
    assert_eq!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::EmptyJobId)
    );
  }

  #[test]
  fn test_unsupported_version() {
    let mut def = JobDef::new("j", vec![]);
    def.version = "3.1".to_string();
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::UnsupportedVersion { .. })
    ));

    def.version = "1.4".to_string();
    assert!(StandardCompiler::new().validate(&def).is_ok());
  }

  #[test]
  fn test_duplicate_step_id() {
    let def = JobDef::new(
      "j",
      vec![
        step("a", "storacle.query", json!({})),
        step("a", "storacle.query", json!({})),
      ],
    );
    assert_eq!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::DuplicateStepId {
        step_id: "a".to_string()
      })
    );
  }

  #[test]
  fn test_step_ids_must_be_referenceable() {
    for id in ["fetch.v2", "rows[0]", "a]"] {
      let def = JobDef::new("j", vec![step(id, "storacle.query", json!({}))]);
      let err = StandardCompiler::new().validate(&def).unwrap_err();
      assert_eq!(
        err,
        CompileError::InvalidStepId {
          step_id: id.to_string()
        }
      );
      assert_eq!(err.step_id(), Some(id));
    }

    let def = JobDef::new("j", vec![step("fetch_v2", "storacle.query", json!({}))]);
    assert!(StandardCompiler::new().validate(&def).is_ok());
  }

  #[test]
  fn test_unknown_op() {
    let def = JobDef::new("j", vec![step("a", "storacle.drop", json!({}))]);
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::UnknownOp { ref op, .. }) if op == "storacle.drop"
    ));
  }

  #[test]
  fn test_self_reference() {
    let def = JobDef::new(
      "j",
      vec![step("a", "storacle.query", json!({"q": "@run.a.rows"}))],
    );
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::SelfReference { .. })
    ));
  }

  #[test]
  fn test_unknown_step_reference() {
    let def = JobDef::new(
      "j",
      vec![step("a", "storacle.query", json!({"q": "@run.ghost"}))],
    );
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::UnknownStep { ref target, .. }) if target == "ghost"
    ));
  }

  #[test]
  fn test_malformed_and_unknown_root_references() {
    let def = JobDef::new(
      "j",
      vec![step("a", "storacle.query", json!({"q": "@payload.items["}))],
    );
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::MalformedReference { .. })
    ));

    let def = JobDef::new(
      "j",
      vec![step("a", "storacle.query", json!({"q": "@secrets.token"}))],
    );
    let err = StandardCompiler::new().validate(&def).unwrap_err();
    assert_eq!(err.step_id(), Some("a"));
    assert!(err.to_string().contains("unknown root 'secrets'"));
  }

  #[test]
  fn test_call_requires_literal_callable() {
    let def = JobDef::new("j", vec![step("a", "call", json!({"x": 1}))]);
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::InvalidParams { .. })
    ));

    let def = JobDef::new(
      "j",
      vec![step("a", "call", json!({"callable": "@payload.fn"}))],
    );
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::InvalidParams { .. })
    ));
  }

  #[test]
  fn test_plan_build_items_shape() {
    let ok = JobDef::new(
      "j",
      vec![step(
        "p",
        "plan.build",
        json!({"method": "upsert", "items": [{"table": "t"}]}),
      )],
    );
    assert!(StandardCompiler::new().validate(&ok).is_ok());

    let two_items = JobDef::new(
      "j",
      vec![step(
        "p",
        "plan.build",
        json!({"method": "upsert", "items": [{}, {}]}),
      )],
    );
    assert!(StandardCompiler::new().validate(&two_items).is_err());

    let by_reference = JobDef::new(
      "j",
      vec![step(
        "p",
        "plan.build",
        json!({"method": "upsert", "items": "@payload.items"}),
      )],
    );
    assert!(StandardCompiler::new().validate(&by_reference).is_ok());
  }

  #[test]
  fn test_job_run_requires_job_id() {
    let def = JobDef::new("j", vec![step("n", "job.run", json!({}))]);
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::InvalidParams { .. })
    ));
  }

  #[test]
  fn test_params_must_be_object() {
    let def = JobDef::new("j", vec![step("a", "compute.llm", json!([1, 2]))]);
    assert!(matches!(
      StandardCompiler::new().validate(&def),
      Err(CompileError::InvalidParams { .. })
    ));
  }
}

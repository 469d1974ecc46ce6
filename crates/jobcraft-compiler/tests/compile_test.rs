//! Properties of compilation that hold for any job definition.

use jobcraft_compiler::{CompileError, Compiler, StandardCompiler};
use jobcraft_config::{JobDef, StepDef};
use serde_json::json;

fn three_step_job() -> JobDef {
  JobDef::new(
    "pipeline-step",
    vec![
      StepDef::new("fetch", "storacle.query", json!({"patient": "@payload.patient_id"})),
      StepDef::new(
        "score",
        "compute.llm",
        json!({"rows": "@run.fetch.rows", "first": "@run.fetch.rows[0]"}),
      ),
      StepDef::new(
        "store",
        "storacle.submit",
        json!({"score": "@run.score.value", "raw": "@run.fetch"}),
      ),
    ],
  )
}

#[test]
fn test_compilation_is_deterministic() {
  let compiler = StandardCompiler::new();
  let def = three_step_job();
  let payload = json!({"patient_id": "p-1"});

  let first = compiler.compile(&def, payload.clone()).unwrap();
  let second = compiler.compile(&def, payload).unwrap();

  assert_eq!(first, second);
  assert_eq!(first.step_ids(), vec!["fetch", "score", "store"]);
}

#[test]
fn test_forward_reference_is_rejected() {
  let def = JobDef::new(
    "j",
    vec![
      StepDef::new("step1", "storacle.query", json!({})),
      StepDef::new("step2", "compute.transform", json!({"x": "@run.step3.value"})),
      StepDef::new("step3", "storacle.query", json!({})),
    ],
  );

  let err = StandardCompiler::new().compile(&def, json!({})).unwrap_err();
  assert_eq!(
    err,
    CompileError::ForwardReference {
      step_id: "step2".to_string(),
      target: "step3".to_string(),
      reference: "@run.step3.value".to_string(),
    }
  );
}

#[test]
fn test_params_are_kept_unresolved() {
  let instance = StandardCompiler::new()
    .compile(&three_step_job(), json!({"patient_id": "p-1"}))
    .unwrap();

  let score = instance.get_step("score").unwrap();
  assert_eq!(score.params["rows"], "@run.fetch.rows");
  assert_eq!(score.depends_on(), vec!["fetch"]);

  let store = instance.get_step("store").unwrap();
  let mut deps = store.depends_on();
  deps.sort();
  assert_eq!(deps, vec!["fetch", "score"]);
}

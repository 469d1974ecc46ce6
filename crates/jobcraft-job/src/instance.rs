use serde_json::Value;

use crate::op::Op;
use crate::reference::Reference;
use crate::template::ParamTemplate;

/// A compiled job, ready for one execution.
///
/// Steps keep the order of the definition; the executor never reorders them.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInstance {
  pub job_id: String,
  pub version: String,
  pub steps: Vec<StepInstance>,
  pub payload: Value,
}

/// One step of a compiled job.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInstance {
  pub step_id: String,
  pub op: Op,
  /// Params as written, references unresolved.
  pub params: Value,
  /// Params with references parsed.
  pub template: ParamTemplate,
  pub continue_on_error: bool,
  pub max_attempts: Option<u32>,
}

impl JobInstance {
  /// Get a step by ID.
  pub fn get_step(&self, step_id: &str) -> Option<&StepInstance> {
    self.steps.iter().find(|s| s.step_id == step_id)
  }

  /// Step ids in execution order.
  pub fn step_ids(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.step_id.as_str()).collect()
  }
}

impl StepInstance {
  pub fn references(&self) -> Vec<&Reference> {
    self.template.references()
  }

  /// Distinct step ids this step reads from, in first-use order.
  pub fn depends_on(&self) -> Vec<&str> {
    let mut deps: Vec<&str> = Vec::new();
    for step_id in self.references().into_iter().filter_map(Reference::step_id) {
      if !deps.contains(&step_id) {
        deps.push(step_id);
      }
    }
    deps
  }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OpError;

/// Coarse routing category of an operation.
///
/// Backends decide which handler executes a step and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
  Native,
  Callable,
  Compute,
  Orchestration,
}

impl Backend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Backend::Native => "native",
      Backend::Callable => "callable",
      Backend::Compute => "compute",
      Backend::Orchestration => "orchestration",
    }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The operation a step performs.
///
/// Native and orchestration ops form a closed set. `compute.*` is open: any
/// non-empty kind is accepted and routed to the compute handler, which decides
/// what the kind means for its deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Op {
  /// Invoke a registered pure callable (`call`).
  Call,
  /// Shape pre-built items into a write plan (`plan.build`).
  PlanBuild,
  /// Read from the storage backend (`storacle.query`).
  StoracleQuery,
  /// Submit a plan to the storage backend (`storacle.submit`).
  StoracleSubmit,
  /// A compute operation such as `compute.llm` or `compute.transform`.
  Compute(String),
  /// Run another job as a nested run (`job.run`).
  JobRun,
}

impl Op {
  /// The backend tag this op is dispatched to.
  pub fn backend(&self) -> Backend {
    match self {
      Op::Call => Backend::Callable,
      Op::PlanBuild | Op::StoracleQuery | Op::StoracleSubmit => Backend::Native,
      Op::Compute(_) => Backend::Compute,
      Op::JobRun => Backend::Orchestration,
    }
  }

  /// The stable string identifier, e.g. `storacle.query`.
  pub fn name(&self) -> String {
    match self {
      Op::Call => "call".to_string(),
      Op::PlanBuild => "plan.build".to_string(),
      Op::StoracleQuery => "storacle.query".to_string(),
      Op::StoracleSubmit => "storacle.submit".to_string(),
      Op::Compute(kind) => format!("compute.{}", kind),
      Op::JobRun => "job.run".to_string(),
    }
  }
}

impl FromStr for Op {
  type Err = OpError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "call" => Ok(Op::Call),
      "plan.build" => Ok(Op::PlanBuild),
      "storacle.query" => Ok(Op::StoracleQuery),
      "storacle.submit" => Ok(Op::StoracleSubmit),
      "job.run" => Ok(Op::JobRun),
      other => match other.strip_prefix("compute.") {
        Some(kind) if !kind.is_empty() => Ok(Op::Compute(kind.to_string())),
        _ => Err(OpError { op: s.to_string() }),
      },
    }
  }
}

impl TryFrom<String> for Op {
  type Error = OpError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Op> for String {
  fn from(op: Op) -> Self {
    op.name()
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_known_ops() {
    assert_eq!("call".parse::<Op>().unwrap(), Op::Call);
    assert_eq!("plan.build".parse::<Op>().unwrap(), Op::PlanBuild);
    assert_eq!("storacle.query".parse::<Op>().unwrap(), Op::StoracleQuery);
    assert_eq!("storacle.submit".parse::<Op>().unwrap(), Op::StoracleSubmit);
    assert_eq!("job.run".parse::<Op>().unwrap(), Op::JobRun);
    assert_eq!(
      "compute.llm".parse::<Op>().unwrap(),
      Op::Compute("llm".to_string())
    );
  }

  #[test]
  fn test_parse_unknown_ops() {
    assert!("storacle.delete".parse::<Op>().is_err());
    assert!("compute.".parse::<Op>().is_err());
    assert!("".parse::<Op>().is_err());
  }

  #[test]
  fn test_backend_routing() {
    assert_eq!(Op::Call.backend(), Backend::Callable);
    assert_eq!(Op::PlanBuild.backend(), Backend::Native);
    assert_eq!(Op::StoracleSubmit.backend(), Backend::Native);
    assert_eq!(Op::Compute("transform".into()).backend(), Backend::Compute);
    assert_eq!(Op::JobRun.backend(), Backend::Orchestration);
  }

  #[test]
  fn test_serde_as_string() {
    let op = Op::Compute("transform".to_string());
    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json, "compute.transform");
    let back: Op = serde_json::from_value(json).unwrap();
    assert_eq!(back, op);
  }
}

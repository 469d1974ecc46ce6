use thiserror::Error;

/// An operation name that is not part of the op taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown op: {op}")]
pub struct OpError {
  pub op: String,
}

/// A reference string that does not follow the reference grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceSyntaxError {
  /// The root is neither `run` nor `payload`.
  #[error("unknown reference root '{root}' in '{reference}'")]
  UnknownRoot { reference: String, root: String },

  /// The path could not be parsed.
  #[error("malformed reference '{reference}': {message}")]
  Malformed { reference: String, message: String },
}

impl ReferenceSyntaxError {
  /// The offending reference string.
  pub fn reference(&self) -> &str {
    match self {
      ReferenceSyntaxError::UnknownRoot { reference, .. }
      | ReferenceSyntaxError::Malformed { reference, .. } => reference,
    }
  }
}

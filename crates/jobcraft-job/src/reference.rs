//! Reference expressions.
//!
//! A reference is a string leaf of the form `@<root><path>`:
//!
//! ```text
//! @run.fetch                 whole output of step `fetch`
//! @run.fetch.rows[0].id      path into the output of step `fetch`
//! @payload                   the whole job payload
//! @payload.patient.ids[2]    path into the payload
//! @@handle                   escaped literal, resolves to "@handle"
//! ```

use std::fmt;

use crate::error::ReferenceSyntaxError;

/// Leading character that marks a reference.
pub const SENTINEL: char = '@';

/// Where a reference starts looking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
  /// Output of an earlier step.
  Run(String),
  /// The job's input payload.
  Payload,
}

/// One step of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Field(String),
  Index(usize),
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Segment::Field(name) => write!(f, ".{}", name),
      Segment::Index(i) => write!(f, "[{}]", i),
    }
  }
}

/// A parsed reference expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  raw: String,
  root: Root,
  path: Vec<Segment>,
}

/// Classification of a string leaf inside step params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringLeaf<'a> {
  /// A plain string, with any `@@` escape already removed.
  Literal(&'a str),
  /// A string that must be parsed as a reference.
  Reference(&'a str),
}

/// Decide whether a string leaf is a literal or a reference.
pub fn classify(s: &str) -> StringLeaf<'_> {
  if let Some(rest) = s.strip_prefix("@@") {
    // keep one '@'
    StringLeaf::Literal(&s[s.len() - rest.len() - 1..])
  } else if s.starts_with(SENTINEL) {
    StringLeaf::Reference(s)
  } else {
    StringLeaf::Literal(s)
  }
}

impl Reference {
  /// Parse a reference string, including its leading sentinel.
  pub fn parse(raw: &str) -> Result<Self, ReferenceSyntaxError> {
    let malformed = |message: &str| ReferenceSyntaxError::Malformed {
      reference: raw.to_string(),
      message: message.to_string(),
    };

    let body = raw
      .strip_prefix(SENTINEL)
      .ok_or_else(|| malformed("missing leading '@'"))?;

    let root_end = body.find(['.', '[']).unwrap_or(body.len());
    let root_name = &body[..root_end];
    let mut segments = parse_path(&body[root_end..]).map_err(|message| malformed(&message))?;

    let root = match root_name {
      "payload" => Root::Payload,
      "run" => {
        if segments.is_empty() {
          return Err(malformed("missing step id after '@run'"));
        }
        match segments.remove(0) {
          Segment::Field(step_id) => Root::Run(step_id),
          Segment::Index(_) => return Err(malformed("step id must be a name, not an index")),
        }
      }
      "" => return Err(malformed("missing root")),
      other => {
        return Err(ReferenceSyntaxError::UnknownRoot {
          reference: raw.to_string(),
          root: other.to_string(),
        });
      }
    };

    Ok(Self {
      raw: raw.to_string(),
      root,
      path: segments,
    })
  }

  /// The reference as written.
  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn root(&self) -> &Root {
    &self.root
  }

  /// Path segments after the root (after the step id for `@run`).
  pub fn path(&self) -> &[Segment] {
    &self.path
  }

  /// The referenced step, for `@run` references.
  pub fn step_id(&self) -> Option<&str> {
    match &self.root {
      Root::Run(step_id) => Some(step_id),
      Root::Payload => None,
    }
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// Parse `.field[0].other` into segments.
fn parse_path(mut rest: &str) -> Result<Vec<Segment>, String> {
  let mut segments = Vec::new();

  while let Some(c) = rest.chars().next() {
    match c {
      '.' => {
        let after = &rest[1..];
        let end = after.find(['.', '[']).unwrap_or(after.len());
        let name = &after[..end];
        if name.is_empty() {
          return Err("empty field name".to_string());
        }
        if name.contains(']') {
          return Err(format!("unexpected ']' in field '{}'", name));
        }
        segments.push(Segment::Field(name.to_string()));
        rest = &after[end..];
      }
      '[' => {
        let close = rest
          .find(']')
          .ok_or_else(|| "unterminated '['".to_string())?;
        let digits = &rest[1..close];
        let index = digits
          .parse::<usize>()
          .map_err(|_| format!("invalid index '{}'", digits))?;
        segments.push(Segment::Index(index));
        rest = &rest[close + 1..];
      }
      other => return Err(format!("unexpected character '{}'", other)),
    }
  }

  Ok(segments)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_run_reference() {
    let r = Reference::parse("@run.fetch.rows[0].id").unwrap();
    assert_eq!(r.root(), &Root::Run("fetch".to_string()));
    assert_eq!(
      r.path(),
      &[
        Segment::Field("rows".to_string()),
        Segment::Index(0),
        Segment::Field("id".to_string()),
      ]
    );
    assert_eq!(r.step_id(), Some("fetch"));
    assert_eq!(r.raw(), "@run.fetch.rows[0].id");
  }

  #[test]
  fn test_parse_whole_output_and_payload() {
    let r = Reference::parse("@run.a").unwrap();
    assert!(r.path().is_empty());

    let p = Reference::parse("@payload").unwrap();
    assert_eq!(p.root(), &Root::Payload);
    assert!(p.path().is_empty());

    let p = Reference::parse("@payload[1][2]").unwrap();
    assert_eq!(p.path(), &[Segment::Index(1), Segment::Index(2)]);
  }

  #[test]
  fn test_unknown_root() {
    let err = Reference::parse("@env.HOME").unwrap_err();
    assert!(matches!(
      err,
      ReferenceSyntaxError::UnknownRoot { ref root, .. } if root == "env"
    ));
  }

  #[test]
  fn test_malformed_references() {
    for raw in [
      "@run",
      "@run[0]",
      "@run.a..b",
      "@payload.items[",
      "@payload.items[x]",
      "@payload.items[-1]",
      "@",
      "@payload.a]",
    ] {
      let err = Reference::parse(raw).unwrap_err();
      assert!(
        matches!(err, ReferenceSyntaxError::Malformed { .. }),
        "expected malformed for {}",
        raw
      );
      assert_eq!(err.reference(), raw);
    }
  }

  #[test]
  fn test_classify() {
    assert_eq!(classify("hello"), StringLeaf::Literal("hello"));
    assert_eq!(classify("a@b.com"), StringLeaf::Literal("a@b.com"));
    assert_eq!(classify("@@handle"), StringLeaf::Literal("@handle"));
    assert_eq!(classify("@run.a"), StringLeaf::Reference("@run.a"));
  }
}

use serde_json::Value;

use crate::error::ReferenceSyntaxError;
use crate::reference::{Reference, StringLeaf, classify};

/// Step parameters with every reference string parsed.
///
/// Subtrees without references collapse into a single [`ParamTemplate::Literal`],
/// so resolution only walks the parts that actually vary between runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTemplate {
  Literal(Value),
  Reference(Reference),
  Array(Vec<ParamTemplate>),
  Object(Vec<(String, ParamTemplate)>),
}

impl ParamTemplate {
  /// Parse a params document, failing on the first malformed reference.
  pub fn parse(value: &Value) -> Result<Self, ReferenceSyntaxError> {
    match value {
      Value::String(s) => match classify(s) {
        StringLeaf::Literal(literal) => Ok(ParamTemplate::Literal(Value::String(literal.to_string()))),
        StringLeaf::Reference(raw) => Ok(ParamTemplate::Reference(Reference::parse(raw)?)),
      },
      Value::Array(items) => {
        let children = items
          .iter()
          .map(ParamTemplate::parse)
          .collect::<Result<Vec<_>, _>>()?;
        if children.iter().all(ParamTemplate::is_literal) {
          Ok(ParamTemplate::Literal(Value::Array(
            children.into_iter().filter_map(ParamTemplate::into_literal).collect(),
          )))
        } else {
          Ok(ParamTemplate::Array(children))
        }
      }
      Value::Object(map) => {
        let children = map
          .iter()
          .map(|(k, v)| ParamTemplate::parse(v).map(|t| (k.clone(), t)))
          .collect::<Result<Vec<_>, _>>()?;
        if children.iter().all(|(_, t)| t.is_literal()) {
          Ok(ParamTemplate::Literal(Value::Object(
            children
              .into_iter()
              .filter_map(|(k, t)| t.into_literal().map(|v| (k, v)))
              .collect(),
          )))
        } else {
          Ok(ParamTemplate::Object(children))
        }
      }
      other => Ok(ParamTemplate::Literal(other.clone())),
    }
  }

  pub fn is_literal(&self) -> bool {
    matches!(self, ParamTemplate::Literal(_))
  }

  fn into_literal(self) -> Option<Value> {
    match self {
      ParamTemplate::Literal(v) => Some(v),
      _ => None,
    }
  }

  /// All references in depth-first order.
  pub fn references(&self) -> Vec<&Reference> {
    let mut out = Vec::new();
    self.collect_references(&mut out);
    out
  }

  fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
    match self {
      ParamTemplate::Literal(_) => {}
      ParamTemplate::Reference(r) => out.push(r),
      ParamTemplate::Array(items) => items.iter().for_each(|t| t.collect_references(out)),
      ParamTemplate::Object(fields) => fields.iter().for_each(|(_, t)| t.collect_references(out)),
    }
  }

  /// The template for a top-level field of an object template.
  pub fn field(&self, name: &str) -> Option<FieldView<'_>> {
    match self {
      ParamTemplate::Literal(Value::Object(map)) => map.get(name).map(FieldView::Literal),
      ParamTemplate::Object(fields) => fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, t)| match t {
          ParamTemplate::Literal(v) => FieldView::Literal(v),
          other => FieldView::Dynamic(other),
        }),
      _ => None,
    }
  }
}

/// A top-level field as seen at compile time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldView<'a> {
  /// Known before execution.
  Literal(&'a Value),
  /// Contains references; only known at run time.
  Dynamic(&'a ParamTemplate),
}

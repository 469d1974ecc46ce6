//! Pure transform functions invoked by `call` steps.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::HandlerError;

/// A side-effect-free transform.
///
/// The executor may call a callable any number of times with the same params
/// (for example when retrying), so implementations must not have effects.
pub trait Callable: Send + Sync {
  /// Transform resolved params (without the `callable` key) into an output.
  fn call(&self, params: &Value) -> Result<Value, HandlerError>;
}

impl<F> Callable for F
where
  F: Fn(&Value) -> Result<Value, HandlerError> + Send + Sync,
{
  fn call(&self, params: &Value) -> Result<Value, HandlerError> {
    self(params)
  }
}

/// Callables addressable by name.
#[derive(Clone, Default)]
pub struct CallableRegistry {
  callables: HashMap<String, Arc<dyn Callable>>,
}

impl CallableRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a callable, replacing any previous one with the same name.
  pub fn register(&mut self, name: impl Into<String>, callable: impl Callable + 'static) {
    self.callables.insert(name.into(), Arc::new(callable));
  }

  /// Register a closure as a callable.
  pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
  where
    F: Fn(&Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
  {
    self.register(name, f);
  }

  pub fn get(&self, name: &str) -> Option<&Arc<dyn Callable>> {
    self.callables.get(name)
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<_> = self.callables.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl fmt::Debug for CallableRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CallableRegistry")
      .field("callables", &self.names())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_closure_callables() {
    let mut registry = CallableRegistry::new();
    registry.register_fn("double", |params| {
      let x = params["x"]
        .as_i64()
        .ok_or_else(|| HandlerError::new("x must be an integer"))?;
      Ok(json!({"value": x * 2}))
    });

    let double = registry.get("double").unwrap();
    assert_eq!(double.call(&json!({"x": 5})).unwrap(), json!({"value": 10}));
    assert_eq!(
      double.call(&json!({"x": "five"})).unwrap_err(),
      HandlerError::new("x must be an integer")
    );
    assert!(registry.get("triple").is_none());
    assert_eq!(registry.names(), vec!["double"]);
  }
}

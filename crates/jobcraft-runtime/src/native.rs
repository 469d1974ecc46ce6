//! In-process ops: `call`, `plan.build`, `storacle.query` and `storacle.submit`.

use serde_json::{Value, json};

use crate::callable::CallableRegistry;
use crate::error::{DispatchError, HandlerError, StepError};
use crate::storage::{StorageBackend, StorageOperation, StorageRequest};

/// Invoke the callable named by `params.callable` with the remaining params.
pub(crate) fn call(callables: &CallableRegistry, params: &Value) -> Result<Value, StepError> {
  let name = params
    .get("callable")
    .and_then(Value::as_str)
    .ok_or_else(|| HandlerError::new("call requires a string 'callable' parameter"))?;

  let callable = callables
    .get(name)
    .ok_or_else(|| DispatchError::UnknownCallable {
      name: name.to_string(),
    })?;

  let mut args = params.clone();
  if let Value::Object(map) = &mut args {
    map.remove("callable");
  }
  Ok(callable.call(&args)?)
}

/// Shape already-resolved params into a write plan.
pub(crate) fn plan_build(params: &Value) -> Result<Value, HandlerError> {
  let method = params
    .get("method")
    .and_then(Value::as_str)
    .ok_or_else(|| HandlerError::new("plan.build requires a string 'method' parameter"))?;

  let items = params
    .get("items")
    .and_then(Value::as_array)
    .ok_or_else(|| HandlerError::new("plan.build requires an 'items' list"))?;

  if items.len() != 1 {
    return Err(HandlerError::new(format!(
      "plan.build expects exactly one item, got {}",
      items.len()
    )));
  }

  Ok(json!({
    "plan": {
      "method": method,
      "items": items,
    }
  }))
}

/// Send a request to the storage backend.
pub(crate) async fn storacle(
  backend: Option<&dyn StorageBackend>,
  operation: StorageOperation,
  params: &Value,
) -> Result<Value, StepError> {
  let backend = backend.ok_or_else(|| DispatchError::NoStorageBackend {
    op: format!("storacle.{}", operation),
  })?;

  let response = backend
    .execute(StorageRequest {
      operation,
      params: params.clone(),
    })
    .await?;

  if !response.ok {
    let message = response
      .error
      .unwrap_or_else(|| format!("storage backend rejected {}", operation));
    return Err(HandlerError::new(message).into());
  }
  Ok(response.into_output())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::StorageResponse;
  use async_trait::async_trait;

  struct Rejecting;

  #[async_trait]
  impl StorageBackend for Rejecting {
    async fn execute(&self, request: StorageRequest) -> Result<StorageResponse, HandlerError> {
      Ok(StorageResponse::rejected(format!("{} denied", request.operation)))
    }
  }

  struct Echo;

  #[async_trait]
  impl StorageBackend for Echo {
    async fn execute(&self, request: StorageRequest) -> Result<StorageResponse, HandlerError> {
      Ok(StorageResponse::rows(vec![request.params]))
    }
  }

  #[test]
  fn test_plan_build() {
    let out = plan_build(&json!({"method": "upsert", "items": [{"id": 1}]})).unwrap();
    assert_eq!(out, json!({"plan": {"method": "upsert", "items": [{"id": 1}]}}));
  }

  #[test]
  fn test_plan_build_rejects_multiple_items() {
    let err = plan_build(&json!({"method": "upsert", "items": [1, 2]})).unwrap_err();
    assert!(err.message.contains("exactly one item"));
  }

  #[test]
  fn test_call_strips_callable_key() {
    let mut callables = CallableRegistry::new();
    callables.register_fn("echo", |params| Ok(params.clone()));

    let out = call(&callables, &json!({"callable": "echo", "x": 1})).unwrap();
    assert_eq!(out, json!({"x": 1}));
  }

  #[test]
  fn test_unknown_callable_is_dispatch_error() {
    let err = call(&CallableRegistry::new(), &json!({"callable": "nope"})).unwrap_err();
    assert!(matches!(
      err,
      StepError::Dispatch(DispatchError::UnknownCallable { .. })
    ));
  }

  #[tokio::test]
  async fn test_storacle_without_backend() {
    let err = storacle(None, StorageOperation::Query, &json!({}))
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      StepError::Dispatch(DispatchError::NoStorageBackend { .. })
    ));
  }

  #[tokio::test]
  async fn test_storacle_rejection_is_handler_error() {
    let err = storacle(Some(&Rejecting), StorageOperation::Submit, &json!({}))
      .await
      .unwrap_err();
    assert_eq!(err, StepError::Handler(HandlerError::new("submit denied")));
  }

  #[tokio::test]
  async fn test_storacle_query_output() {
    let out = storacle(Some(&Echo), StorageOperation::Query, &json!({"table": "t"}))
      .await
      .unwrap();
    assert_eq!(out, json!({"rows": [{"table": "t"}], "count": 1, "ok": true}));
  }
}

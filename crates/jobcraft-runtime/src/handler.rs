//! Pluggable handlers for the deployment-specific backends.
//!
//! Native ops (`call`, `plan.build`, `storacle.*`) never reach the registry.
//! Handlers exist for the backends whose behavior varies by deployment:
//! `compute` (which model or transform engine) and `orchestration` (how nested
//! jobs are found and run).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jobcraft_job::Backend;
use jobcraft_store::StepManifest;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, HandlerError, StepError};
use crate::executor::{Executor, Lineage};

/// The backends a [`Handler`] can be registered for.
///
/// `native` and `callable` ops run in-process and never consult the registry,
/// so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerBackend {
  Compute,
  Orchestration,
}

impl HandlerBackend {
  pub fn as_str(&self) -> &'static str {
    Backend::from(*self).as_str()
  }
}

impl From<HandlerBackend> for Backend {
  fn from(backend: HandlerBackend) -> Self {
    match backend {
      HandlerBackend::Compute => Backend::Compute,
      HandlerBackend::Orchestration => Backend::Orchestration,
    }
  }
}

impl TryFrom<Backend> for HandlerBackend {
  type Error = Backend;

  fn try_from(backend: Backend) -> Result<Self, Self::Error> {
    match backend {
      Backend::Compute => Ok(HandlerBackend::Compute),
      Backend::Orchestration => Ok(HandlerBackend::Orchestration),
      other => Err(other),
    }
  }
}

impl fmt::Display for HandlerBackend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What a handler can see besides the manifest.
pub struct DispatchContext<'a> {
  pub executor: &'a Executor,
  pub run_id: &'a str,
  pub lineage: &'a Lineage,
  pub cancel: &'a CancellationToken,
}

/// Executes manifests for one backend.
#[async_trait]
pub trait Handler: Send + Sync {
  async fn handle(
    &self,
    manifest: &StepManifest,
    ctx: &DispatchContext<'_>,
  ) -> Result<Value, HandlerError>;
}

/// One handler per backend tag; the last registration wins.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
  handlers: HashMap<HandlerBackend, Arc<dyn Handler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler, returning the one it replaces.
  pub fn register(
    &mut self,
    backend: HandlerBackend,
    handler: Arc<dyn Handler>,
  ) -> Option<Arc<dyn Handler>> {
    self.handlers.insert(backend, handler)
  }

  pub fn get(&self, backend: HandlerBackend) -> Option<&Arc<dyn Handler>> {
    self.handlers.get(&backend)
  }

  /// Route a manifest to the handler for its op's backend.
  pub async fn dispatch(
    &self,
    manifest: &StepManifest,
    ctx: &DispatchContext<'_>,
  ) -> Result<Value, StepError> {
    let backend = manifest.op.backend();
    let handler = HandlerBackend::try_from(backend)
      .ok()
      .and_then(|b| self.get(b))
      .ok_or(DispatchError::UnregisteredBackend { backend })?;
    Ok(handler.handle(manifest, ctx).await?)
  }
}

impl fmt::Debug for HandlerRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut backends: Vec<_> = self.handlers.keys().map(HandlerBackend::as_str).collect();
    backends.sort_unstable();
    f.debug_struct("HandlerRegistry")
      .field("backends", &backends)
      .finish()
  }
}

//! Jobcraft Runtime
//!
//! Executes compiled jobs and pipelines:
//!
//! - [`Executor`] runs a job's steps in order, recording a manifest before
//!   every dispatch and a [`RunRecord`](jobcraft_store::RunRecord) at the end
//! - Native ops run in-process; `compute` and `orchestration` ops go to the
//!   [`Handler`] registered for their backend
//! - [`PipelineRunner`] runs job and sub-pipeline entries in sequence
//!
//! ```ignore
//! let executor = Executor::builder(Arc::new(MemoryStore::new()))
//!   .callable_fn("double", |p| Ok(json!({"value": p["x"].as_i64().unwrap_or(0) * 2})))
//!   .handler(HandlerBackend::Orchestration, Arc::new(JobRunHandler::new(catalog)))
//!   .build();
//!
//! let record = executor.run_job(&def, payload, CancellationToken::new()).await?;
//! ```

mod callable;
mod config;
mod error;
mod events;
mod executor;
mod handler;
mod idempotency;
mod input;
mod native;
mod orchestration;
mod pipeline;
mod storage;

pub use callable::{Callable, CallableRegistry};
pub use config::{DEFAULT_MAX_DEPTH, ExecutorConfig};
pub use error::{
  DispatchError, ExecutionError, HandlerError, PipelineError, ResolutionError, StepError,
};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{Executor, ExecutorBuilder, Lineage};
pub use handler::{DispatchContext, Handler, HandlerBackend, HandlerRegistry};
pub use idempotency::{canonical_json, idempotency_key};
pub use input::{ResolutionContext, resolve_reference, resolve_template, resolve_value};
pub use orchestration::JobRunHandler;
pub use pipeline::{EntryResult, PipelineResult, PipelineRunner};
pub use storage::{StorageBackend, StorageOperation, StorageRequest, StorageResponse};

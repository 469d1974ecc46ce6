//! Execution events and notifiers.
//!
//! The executor and the pipeline runner emit an event at every lifecycle
//! point. Consumers decide what to do with them: stream them to a UI, count
//! them, or drop them.

use jobcraft_store::{ErrorKind, RunStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during job and pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    job_id: String,
  },

  StepStarted {
    run_id: String,
    step_id: String,
    op: String,
  },

  StepSucceeded {
    run_id: String,
    step_id: String,
    attempts: u32,
  },

  /// A step failed. `continued` is set when `continue_on_error` let the run go on.
  StepFailed {
    run_id: String,
    step_id: String,
    kind: ErrorKind,
    message: String,
    continued: bool,
  },

  RunFinished {
    run_id: String,
    job_id: String,
    status: RunStatus,
  },

  PipelineStarted {
    pipeline_id: String,
  },

  PipelineFinished {
    pipeline_id: String,
    status: RunStatus,
  },
}

/// Receiver of execution events.
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs. Must not block.
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded: notify() must never wait on the consumer.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

//! Jobcraft Config
//!
//! This crate contains the serializable job and pipeline definition types for
//! jobcraft. These types represent definitions as they are stored, before the
//! compiler validates them and turns them into runtime structures.
//!
//! Definitions can be loaded from:
//! - JSON files (`.json`)
//! - YAML files (`.yaml`, `.yml`)
//! - Any in-memory string, with an explicit [`DefinitionFormat`]

mod error;
mod format;
mod job;
mod pipeline;

pub use error::ConfigError;
pub use format::{DefinitionFormat, load_job, load_pipeline, parse_job, parse_pipeline};
pub use job::{DEFAULT_VERSION, JobDef, StepDef};
pub use pipeline::{PipelineDef, PipelineEntry};

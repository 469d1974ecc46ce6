//! Jobcraft Job
//!
//! This crate provides the compiled job representation for jobcraft.
//! A [`JobInstance`] is the validated form of a `JobDef` for one invocation,
//! ready to be handed to the executor.
//!
//! Key differences from `jobcraft-config`:
//! - Operation names are parsed into the closed [`Op`] variant with a fixed [`Backend`]
//! - Reference strings are parsed once into a [`ParamTemplate`] tree
//! - The invocation payload travels with the instance

mod error;
mod instance;
mod op;
mod reference;
mod template;

pub use error::{OpError, ReferenceSyntaxError};
pub use instance::{JobInstance, StepInstance};
pub use op::{Backend, Op};
pub use reference::{Reference, Root, SENTINEL, Segment, StringLeaf, classify};
pub use template::{FieldView, ParamTemplate};

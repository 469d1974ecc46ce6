mod compiler;
mod error;

pub use compiler::{Compiler, SUPPORTED_MAJOR_VERSIONS, StandardCompiler};
pub use error::CompileError;

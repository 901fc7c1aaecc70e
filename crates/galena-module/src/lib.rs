//! Partitioned-module intermediate form for Galena.
//!
//! The external accelerator compiler splits a whole-model graph into global
//! partition functions called from a single entry function. This crate models
//! that module shape and provides the analyses the stitcher needs on it:
//! ordered call-site extraction, backward origin tracing, and bucketing of the
//! call sites into the `cpu-pre / accelerator / cpu-post` segment plan.

pub mod module;
pub mod segment;
pub mod trace;

pub use module::{Call, Expr, Function, GlobalFunction, PartitionedModule};
pub use segment::SegmentPlan;
pub use trace::{output_origins, trace_to_origin, Origin, OriginSet};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors for partitioned-module validation.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Entry function calls unknown function: {0}")]
    UnknownFunction(String),

    #[error("Entry function references unknown variable: {0}")]
    UnknownVariable(String),
}

//! Core graph and tensor types for Galena.
//!
//! This crate provides the foundational abstractions that the other Galena
//! crates depend on:
//! - Device tags for partitioned segments (`Device`)
//! - Strongly typed executor-graph structure with a JSON wire form
//!   (`JsonGraph`, `GraphNode`, `EntryRef`) and fragment joining
//! - Parameter tensors with nested-array serialization (`Tensor`)
//! - Content fingerprinting for cache keys (`graph_fingerprint`)

pub mod device;
pub mod graph;
pub mod hashing;
pub mod tensor;

pub use device::Device;
pub use graph::{join, EntryRef, GraphNode, JsonGraph};
pub use hashing::{fnv1a_hash, graph_fingerprint};
pub use tensor::{Tensor, TensorValues};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for galena-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed graph document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Invalid tensor data: {0}")]
    InvalidTensor(String),
}

//! Partition-stitching compiler frontend for the Galena accelerator.
//!
//! A trained model, imported through one of several frameworks, is handed to
//! the external accelerator compiler, which splits it into at most three
//! ordered segments: an optional CPU pre-segment, the accelerator segment,
//! and an optional CPU post-segment. This crate reconstructs three
//! independently executable graphs from that partitioned module:
//!
//! 1. Each compiled partition function registers its serialized fragment in a
//!    [`Session`] as a side effect of the external compile.
//! 2. The partitioned module's call sites are bucketed into the segment plan
//!    and same-device fragments are joined with rebased node indices.
//! 3. The passthrough stitcher injects synthetic input nodes so every value a
//!    downstream segment needs is materialized, never recomputed.
//! 4. The name normalizer strips codegen mangling and records which graph
//!    inputs bind which positions of the user's flattened input list.
//!
//! The finished set of [`GraphDescriptor`]s can be persisted to a JSON cache
//! keyed by a fingerprint of the pre-partition graph and reloaded on the next
//! compile of the same model.

pub mod cache;
pub mod config;
pub mod extract;
pub mod names;
pub mod session;
pub mod stitch;
pub mod verify;

pub use cache::{load_graphs, store_graphs};
pub use config::CompilerConfig;
pub use extract::extract_graphs;
pub use names::NormalizerState;
pub use session::{Fragment, Session};
pub use stitch::add_passthrough_if_needed;
pub use verify::GraphVerifier;

use galena_core::{graph_fingerprint, Device, JsonGraph, Tensor};
use galena_module::PartitionedModule;
use std::collections::{BTreeMap, HashMap};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors for the stitching pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported model framework: {0}")]
    UnsupportedFramework(String),

    #[error("No fragment registered for partition function: {0}")]
    MissingFragment(String),

    #[error("Graph error: {0}")]
    Graph(#[from] galena_core::Error),

    #[error("Module error: {0}")]
    Module(#[from] galena_module::ModuleError),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache parse error: {0}")]
    CacheParse(#[from] serde_json::Error),

    #[error("Malformed cache document: {0}")]
    InvalidCache(String),

    #[error("Verification mismatch: {0}")]
    Verification(String),

    #[error("Partitioning failed: {0}")]
    Partition(String),
}

/// Per-partition-function parameter tensors, in codegen declaration order.
pub type PartitionParams = HashMap<String, Vec<Tensor>>;

/// Source framework of an imported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Pytorch,
    Tensorflow,
    TfGraphDef,
    Onnx,
    Mxnet,
    Jax,
}

impl Framework {
    /// Parse a framework name; unrecognized names fail fast rather than
    /// falling back.
    pub fn from_name(name: &str) -> Result<Framework> {
        match name {
            "pytorch" => Ok(Framework::Pytorch),
            "tensorflow" => Ok(Framework::Tensorflow),
            "tf_graphdef" => Ok(Framework::TfGraphDef),
            "onnx" => Ok(Framework::Onnx),
            "mxnet" => Ok(Framework::Mxnet),
            "jax" => Ok(Framework::Jax),
            other => Err(Error::UnsupportedFramework(other.to_string())),
        }
    }

    /// Canonical framework name.
    pub fn name(&self) -> &'static str {
        match self {
            Framework::Pytorch => "pytorch",
            Framework::Tensorflow => "tensorflow",
            Framework::TfGraphDef => "tf_graphdef",
            Framework::Onnx => "onnx",
            Framework::Mxnet => "mxnet",
            Framework::Jax => "jax",
        }
    }
}

/// Narrow interface to the framework import step.
///
/// `graph_text` is the framework's canonical rendering of the pre-partition
/// graph (traced-graph text, ONNX text, graphdef text, or symbol JSON) and is
/// the sole input to the cache key. Sample inputs and reference outputs feed
/// the verification hook.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub framework: Framework,
    pub graph_text: String,
    /// Flattened model input names, in user order.
    pub input_names: Vec<String>,
    pub sample_inputs: Vec<Tensor>,
    pub reference_outputs: Vec<Tensor>,
}

impl ModelSource {
    /// Cache key: content fingerprint of the canonical graph rendering.
    pub fn graph_hash(&self) -> String {
        graph_fingerprint(&self.graph_text)
    }
}

/// Result of the external partitioning compile.
pub struct PartitionOutcome {
    pub module: PartitionedModule,
    pub params: PartitionParams,
    /// Importer-supplied mapping from generated to framework parameter names,
    /// used to seed the name normalizer.
    pub param_name_lookup: HashMap<String, String>,
}

/// Contract with the external accelerator compiler: import the source,
/// partition it, and register one serialized fragment per partition function
/// into the session while compiling.
pub trait PartitionCompiler {
    fn compile(
        &mut self,
        session: &mut Session,
        source: &ModelSource,
        cfg: &CompilerConfig,
    ) -> Result<PartitionOutcome>;
}

/// One stitched, externally consumable graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDescriptor {
    /// The serialized node-list structure, in typed form.
    pub graph: JsonGraph,

    /// Parameter tensors by normalized name.
    pub params: BTreeMap<String, Tensor>,

    /// Execution target of this graph.
    pub device: Device,

    /// Content hash of the source model graph.
    pub hash: String,

    /// For the head graph only: node index to position in the flattened user
    /// input list, covering true model inputs (not parameters or passthrough
    /// nodes).
    pub nid_to_input_idx: Option<BTreeMap<usize, usize>>,

    /// For the head graph only: total count of flattened model inputs.
    pub num_model_inputs: Option<usize>,
}

/// Compile (or reload from cache) the stitched graph set for a model.
///
/// This is the top-level entry point: it checks the serialization cache,
/// runs the external compiler against a fresh [`Session`], optionally invokes
/// the verification hook, extracts and stitches the per-segment graphs, and
/// stores the result back to the cache.
#[tracing::instrument(skip_all, fields(framework = source.framework.name(), num_inputs = source.input_names.len()))]
pub fn load_graph(
    compiler: &mut dyn PartitionCompiler,
    verifier: Option<&dyn GraphVerifier>,
    source: &ModelSource,
    cfg: &CompilerConfig,
) -> Result<Vec<GraphDescriptor>> {
    if !cfg.graph_store_path.is_empty() && !cfg.graph_load_path.is_empty() {
        tracing::warn!("graph serialization will be skipped: both store and load paths are configured");
    }

    let graph_hash = source.graph_hash();
    if let Some(cached) = cache::load_graphs(cfg, &graph_hash)? {
        return Ok(cached);
    }

    let mut session = Session::new();
    let outcome = compiler.compile(&mut session, source, cfg)?;

    if cfg.verify_compile {
        if let Some(verifier) = verifier {
            verifier.verify(
                &outcome.module,
                &outcome.params,
                &source.sample_inputs,
                &source.reference_outputs,
            )?;
        }
    }

    let mut state = NormalizerState::with_lookup(outcome.param_name_lookup);
    let graphs = extract::extract_graphs(
        &session,
        &outcome.module,
        &outcome.params,
        &source.input_names,
        &mut state,
        &graph_hash,
    )?;

    cache::store_graphs(cfg, &graphs)?;

    Ok(graphs)
}

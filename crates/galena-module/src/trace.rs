//! Backward tracing of values to the partition function or model input that
//! produced them.

use crate::module::{Expr, PartitionedModule};
use std::collections::HashSet;

/// The resolved producer of a traced value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Producing partition function, or a model input name.
    pub name: String,
    /// Output slot on the producer: the tuple field index, 0 for single
    /// outputs and model inputs.
    pub slot: usize,
}

impl Origin {
    pub fn new(name: impl Into<String>, slot: usize) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

/// Candidate origins a trace may resolve to: the entry function's parameters
/// plus the partition functions themselves.
#[derive(Debug, Clone)]
pub struct OriginSet {
    names: HashSet<String>,
}

impl OriginSet {
    /// Candidates for `module`: its entry parameters and partition functions.
    pub fn from_module(module: &PartitionedModule) -> Self {
        let mut names: HashSet<String> = module.main.params.iter().cloned().collect();
        names.extend(module.functions.iter().map(|f| f.name.clone()));
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Trace `expr` backward until it resolves to an origin.
///
/// A call to a partition function resolves to `(callee, 0)`; a tuple
/// projection of a traced expression overrides the slot with the projection
/// index; a reference to an entry parameter resolves to `(param, 0)`.
/// Returns `None` when the expression does not reach any candidate, which
/// callers treat as a violated partitioning contract.
pub fn trace_to_origin(expr: &Expr, origins: &OriginSet) -> Option<Origin> {
    match expr {
        Expr::Var(name) => origins.contains(name).then(|| Origin::new(name.clone(), 0)),
        Expr::Call(call) => origins
            .contains(&call.callee)
            .then(|| Origin::new(call.callee.clone(), 0)),
        Expr::TupleGetItem { tuple, index } => {
            trace_to_origin(tuple, origins).map(|origin| Origin {
                slot: *index,
                ..origin
            })
        }
        Expr::Tuple(_) => None,
    }
}

/// Origins of every output of the entry body: one per tuple field, or a
/// single entry for a non-tuple body.
pub fn output_origins(body: &Expr, origins: &OriginSet) -> Vec<Option<Origin>> {
    match body {
        Expr::Tuple(fields) => fields
            .iter()
            .map(|field| trace_to_origin(field, origins))
            .collect(),
        other => vec![trace_to_origin(other, origins)],
    }
}

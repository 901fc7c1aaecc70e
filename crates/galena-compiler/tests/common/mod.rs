//! Shared builders for stitching tests.

#![allow(dead_code)]

use galena_core::{Device, EntryRef, GraphNode, JsonGraph};
use galena_module::{Expr, Function, GlobalFunction, PartitionedModule};

/// Fragment with the given input nodes followed by a chain of ops, each
/// consuming the previous node. The head points at the last node.
pub fn chain_fragment(inputs: &[&str], ops: &[&str]) -> JsonGraph {
    let mut nodes: Vec<GraphNode> = inputs.iter().map(|name| GraphNode::input(*name)).collect();
    for (i, op) in ops.iter().enumerate() {
        nodes.push(GraphNode {
            op: "add".to_string(),
            name: op.to_string(),
            attrs: Default::default(),
            inputs: vec![EntryRef::new(inputs.len() + i - 1)],
        });
    }
    let last = nodes.len() - 1;
    let count = nodes.len();
    JsonGraph {
        nodes,
        arg_nodes: (0..inputs.len()).collect(),
        heads: vec![EntryRef::new(last)],
        node_row_ptr: (0..=count).collect(),
        extra: Default::default(),
    }
}

/// The same fragment with explicit head node indices.
pub fn with_heads(mut graph: JsonGraph, heads: &[usize]) -> JsonGraph {
    graph.heads = heads.iter().map(|&nid| EntryRef::new(nid)).collect();
    graph
}

/// Serialize a fragment the way the external codegen reports it.
pub fn fragment_text(graph: &JsonGraph) -> String {
    graph.to_text().unwrap()
}

pub fn global_function(name: &str, device: Device) -> GlobalFunction {
    GlobalFunction {
        name: name.to_string(),
        params: vec!["in0".to_string()],
        device,
    }
}

pub fn module(
    params: &[&str],
    body: Expr,
    functions: Vec<GlobalFunction>,
) -> PartitionedModule {
    PartitionedModule {
        main: Function {
            name: "main".to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        },
        functions,
    }
}

/// Check that no two nodes of `graph` share a name.
pub fn assert_unique_names(graph: &JsonGraph) {
    let mut seen = std::collections::HashSet::new();
    for node in &graph.nodes {
        assert!(
            seen.insert(&node.name),
            "duplicate node name: {}",
            node.name
        );
    }
}

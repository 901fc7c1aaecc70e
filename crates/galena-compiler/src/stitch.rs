//! Passthrough stitching across the cpu-pre / accelerator / cpu-post graphs.
//!
//! After the per-segment graphs are joined, values still flow between
//! segments only implicitly, through the entry function's call arguments.
//! Stitching makes that flow explicit: every value a downstream segment
//! needs from an earlier one (or straight from the model inputs) is
//! materialized as a synthetic input node the downstream graph can bind,
//! without ever duplicating a value that already travels the natural
//! call-argument path.

use galena_core::{GraphNode, JsonGraph};
use galena_module::{
    output_origins, trace_to_origin, Origin, OriginSet, PartitionedModule, SegmentPlan,
};

/// Wire cross-segment values through the three joined graphs.
///
/// Passthrough nodes are named `passthrough_first_to_second_<n>` and
/// `passthrough_second_to_third_<n>`; forwarded model inputs keep their
/// original names so the input-index map can still find them.
///
/// # Panics
///
/// Panics when a model output or an accelerator argument does not trace back
/// to any partition function or model input; that means the partitioning
/// contract was violated upstream.
pub fn add_passthrough_if_needed(
    mut first: Option<&mut JsonGraph>,
    second: &mut JsonGraph,
    third: Option<&mut JsonGraph>,
    module: &PartitionedModule,
    plan: &SegmentPlan,
    input_names: &[String],
) {
    let origins = OriginSet::from_module(module);

    // Which segment (or model input) produced each model output.
    let main_output_origins: Vec<Origin> = output_origins(&module.main.body, &origins)
        .into_iter()
        .enumerate()
        .map(|(slot, origin)| {
            origin.unwrap_or_else(|| panic!("model output {} does not trace to an origin", slot))
        })
        .collect();

    // Where every argument consumed by the accelerator segment comes from.
    let mut second_input_origins: Vec<Origin> = Vec::new();
    for call in module
        .call_sites()
        .into_iter()
        .filter(|call| plan.is_device_function(&call.callee))
    {
        for arg in &call.args {
            let origin = trace_to_origin(arg, &origins).unwrap_or_else(|| {
                panic!(
                    "argument of accelerator partition {} does not trace to an origin",
                    call.callee
                )
            });
            second_input_origins.push(origin);
        }
    }

    // Accelerator outputs that are model outputs; mirrored into the post
    // graph below when one exists.
    let second_outputs_required: Vec<Origin> = main_output_origins
        .iter()
        .filter(|origin| plan.is_device_function(&origin.name))
        .cloned()
        .collect();

    let mut first_output_nodes: Vec<GraphNode> = Vec::new();
    if let Some(first) = first.as_deref_mut() {
        // Pre-segment outputs that are model outputs, excluding values the
        // accelerator already consumes as call arguments.
        let mut first_outputs_required: Vec<Origin> = main_output_origins
            .iter()
            .filter(|origin| plan.is_pre_function(&origin.name))
            .cloned()
            .collect();
        first_outputs_required.retain(|output| !second_input_origins.contains(output));

        for (count, output) in first_outputs_required.iter().enumerate() {
            let head = first.heads[output.slot];
            first_output_nodes.push(
                first.nodes[head.node]
                    .retyped_as_input(&format!("passthrough_first_to_second_{}", count)),
            );
        }

        // Model inputs the accelerator graph consumes directly must be
        // forwarded by the pre graph, since the runtime binds user inputs to
        // the first graph in the chain.
        for name in input_names {
            let Some(nid) = second.node_index_by_name(name) else {
                continue;
            };
            if first.node_index_by_name(name).is_some() {
                continue;
            }
            let node = second.nodes[nid].clone();
            first.push_arg(node);
        }

        for node in &first_output_nodes {
            second.push_arg(node.clone());
        }
    }

    if let Some(third) = third {
        // Model inputs the post graph consumes must thread end to end: the
        // pre graph (when present) and the accelerator graph each forward
        // them, unless already wired.
        for name in input_names {
            let Some(nid) = third.node_index_by_name(name) else {
                continue;
            };
            let node = third.nodes[nid].clone();
            if let Some(first) = first.as_deref_mut() {
                if first.node_index_by_name(name).is_none() {
                    first.push_arg(node.clone());
                }
            }
            if second.node_index_by_name(name).is_none() {
                second.push_arg(node);
            }
        }

        let mut second_output_nodes: Vec<GraphNode> = Vec::new();
        for (count, output) in second_outputs_required.iter().enumerate() {
            let head = second.heads[output.slot];
            second_output_nodes.push(
                second.nodes[head.node]
                    .retyped_as_input(&format!("passthrough_second_to_third_{}", count)),
            );
        }

        // Passthrough all pre and accelerator model outputs into the post
        // graph, which is the final return point.
        for node in first_output_nodes.iter().chain(second_output_nodes.iter()) {
            third.push_arg(node.clone());
        }
    }
}

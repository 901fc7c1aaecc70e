//! Graph extraction: join registered fragments per segment, stitch, and
//! normalize into the externally consumable descriptor list.

use crate::names::{self, NormalizerState};
use crate::session::Session;
use crate::stitch;
use crate::{Error, GraphDescriptor, PartitionParams, Result};
use galena_core::{graph, Device, JsonGraph, Tensor};
use galena_module::{PartitionedModule, SegmentPlan};
use std::collections::BTreeMap;

/// Build the ordered graph set `[cpu_pre?, accelerator, cpu_post?]` from the
/// fragments registered during compilation of `module`.
pub fn extract_graphs(
    session: &Session,
    module: &PartitionedModule,
    partition_params: &PartitionParams,
    input_names: &[String],
    state: &mut NormalizerState,
    graph_hash: &str,
) -> Result<Vec<GraphDescriptor>> {
    module.validate()?;
    let plan = SegmentPlan::from_module(module);
    tracing::debug!(
        cpu_pre = plan.cpu_pre.len(),
        device = plan.device.len(),
        cpu_post = plan.cpu_post.len(),
        "segment plan"
    );

    let mut first = join_segment(session, Device::Cpu, &plan.cpu_pre)?;
    let mut second = join_segment(session, Device::Tt, &plan.device)?
        .ok_or_else(|| Error::MissingFragment("accelerator segment".to_string()))?;
    let mut third = join_segment(session, Device::Cpu, &plan.cpu_post)?;

    let first_params = segment_params(session, Device::Cpu, &plan.cpu_pre, partition_params);
    let second_params = segment_params(session, Device::Tt, &plan.device, partition_params);
    let third_params = segment_params(session, Device::Cpu, &plan.cpu_post, partition_params);

    stitch::add_passthrough_if_needed(
        first.as_mut(),
        &mut second,
        third.as_mut(),
        module,
        &plan,
        input_names,
    );

    // The head graph is the one the runtime binds the user's flattened inputs
    // to; only it carries the input-index map. Input order is not guaranteed
    // to survive the import, hence the explicit map.
    let num_model_inputs = input_names.len();
    let mut graphs = Vec::new();

    if let Some(mut graph) = first {
        let nid_to_input_idx = names::input_index_map(input_names, &graph);
        let mut params = first_params;
        names::clean_names(&mut graph, &mut params, Device::Cpu, state);
        graphs.push(GraphDescriptor {
            graph,
            params,
            device: Device::Cpu,
            hash: graph_hash.to_string(),
            nid_to_input_idx: Some(nid_to_input_idx),
            num_model_inputs: Some(num_model_inputs),
        });

        let mut params = second_params;
        names::clean_names(&mut second, &mut params, Device::Tt, state);
        graphs.push(GraphDescriptor {
            graph: second,
            params,
            device: Device::Tt,
            hash: graph_hash.to_string(),
            nid_to_input_idx: None,
            num_model_inputs: None,
        });
    } else {
        let nid_to_input_idx = names::input_index_map(input_names, &second);
        let mut params = second_params;
        names::clean_names(&mut second, &mut params, Device::Tt, state);
        graphs.push(GraphDescriptor {
            graph: second,
            params,
            device: Device::Tt,
            hash: graph_hash.to_string(),
            nid_to_input_idx: Some(nid_to_input_idx),
            num_model_inputs: Some(num_model_inputs),
        });
    }

    if let Some(mut graph) = third {
        let mut params = third_params;
        names::clean_names(&mut graph, &mut params, Device::Cpu, state);
        graphs.push(GraphDescriptor {
            graph,
            params,
            device: Device::Cpu,
            hash: graph_hash.to_string(),
            nid_to_input_idx: None,
            num_model_inputs: None,
        });
    }

    Ok(graphs)
}

/// Parse and join the registered fragments of one segment bucket, in plan
/// order. `None` for an empty bucket.
fn join_segment(
    session: &Session,
    device: Device,
    functions: &[String],
) -> Result<Option<JsonGraph>> {
    if functions.is_empty() {
        return Ok(None);
    }
    let mut fragments = Vec::with_capacity(functions.len());
    for function in functions {
        let fragment = session
            .fragment(device, function)
            .ok_or_else(|| Error::MissingFragment(function.clone()))?;
        fragments.push(JsonGraph::parse(&fragment.graph_text)?);
    }
    Ok(Some(graph::join(fragments)?))
}

/// Parameter dictionary of one segment: each function's registered parameter
/// names zipped with the tensors the external compiler returned for it.
fn segment_params(
    session: &Session,
    device: Device,
    functions: &[String],
    partition_params: &PartitionParams,
) -> BTreeMap<String, Tensor> {
    let mut params = BTreeMap::new();
    for function in functions {
        let Some(fragment) = session.fragment(device, function) else {
            continue;
        };
        let Some(tensors) = partition_params.get(function) else {
            continue;
        };
        for (name, tensor) in fragment.param_names.iter().zip(tensors) {
            params.insert(name.clone(), tensor.clone());
        }
    }
    params
}

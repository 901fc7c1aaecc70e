//! Name normalization and input-index bookkeeping.
//!
//! The external codegen mangles every partition-local parameter as
//! `<prefix><ordinal>_<raw name>`, with a device-specific prefix.
//! Normalization strips the prefix and moves the ordinal to the tail so that
//! a parameter tensor's key matches the node name that references it. Names
//! without the prefix carry an importer-assigned trailing `_<count>` and are
//! resolved through a caller-owned lookup table, so repeated normalization of
//! the same raw name stays consistent.

use galena_core::{Device, JsonGraph, Tensor};
use std::collections::{BTreeMap, HashMap};

/// Mangle prefix of accelerator partition codegen.
pub const DEVICE_NAME_PREFIX: &str = "gen_galena_main_";

/// Mangle prefix of CPU fallback partition codegen.
pub const CPU_NAME_PREFIX: &str = "gen_galena_cpudevice_main_";

/// Caller-owned normalization state: raw name to synchronized name.
///
/// One instance spans all graphs of a compilation, so a raw name seen in two
/// segments maps to the same synchronized name in both.
#[derive(Debug, Default)]
pub struct NormalizerState {
    lookup: HashMap<String, String>,
}

impl NormalizerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State seeded with an importer-supplied name mapping (generated name to
    /// framework name).
    pub fn with_lookup(lookup: HashMap<String, String>) -> Self {
        Self { lookup }
    }
}

/// The mangle prefix the codegen uses for `device`.
pub fn name_prefix(device: Device) -> &'static str {
    if device.is_cpu() {
        CPU_NAME_PREFIX
    } else {
        DEVICE_NAME_PREFIX
    }
}

/// Strip `prefix` and move the leading declaration ordinal to the tail:
/// `gen_galena_main_12_encoder.weight` becomes `encoder.weight12`.
fn demangle(name: &str, prefix: &str) -> Option<String> {
    if !name.contains(prefix) {
        return None;
    }
    let stripped = name.replace(prefix, "");
    let split = stripped.find('_')?;
    Some(format!("{}{}", &stripped[split + 1..], &stripped[..split]))
}

/// Split a trailing `_<count>` suffix off `name`.
fn trim_count(name: &str) -> Option<(&str, &str)> {
    name.rfind('_').map(|i| (&name[..i], &name[i + 1..]))
}

/// Normalize node and parameter names of one stitched graph in place.
///
/// Parameter keys and node names go through the same transform so they stay
/// synchronized: after this call, every parameter key has exactly one node of
/// the same name.
pub fn clean_names(
    graph: &mut JsonGraph,
    params: &mut BTreeMap<String, Tensor>,
    device: Device,
    state: &mut NormalizerState,
) {
    let prefix = name_prefix(device);

    if !params.is_empty() {
        let old_params = std::mem::take(params);
        for (key, tensor) in old_params {
            let synced = if let Some(demangled) = demangle(&key, prefix) {
                demangled
            } else if let Some((base, count)) = trim_count(&key) {
                let old_name = state
                    .lookup
                    .get(base)
                    .cloned()
                    .unwrap_or_else(|| base.to_string());
                let synced = format!("{}_{}", old_name, count);
                state.lookup.insert(key.clone(), synced.clone());
                synced
            } else {
                key
            };
            params.insert(synced, tensor);
        }
    }

    for node in &mut graph.nodes {
        if let Some(demangled) = demangle(&node.name, prefix) {
            node.name = demangled;
        } else if let Some(synced) = state.lookup.get(&node.name) {
            node.name = synced.clone();
        }
    }
}

/// Map each arg node carrying a true model input to that input's position in
/// the flattened user input list.
///
/// Arg nodes whose name is not among the model inputs (parameters and
/// passthrough nodes) are skipped. Computed before name normalization, since
/// model input names are never mangled.
pub fn input_index_map(input_names: &[String], graph: &JsonGraph) -> BTreeMap<usize, usize> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (idx, name) in input_names.iter().enumerate() {
        // First match wins for a duplicated input name.
        positions.entry(name.as_str()).or_insert(idx);
    }

    let mut map = BTreeMap::new();
    for &arg in &graph.arg_nodes {
        if let Some(&idx) = positions.get(graph.nodes[arg].name.as_str()) {
            map.insert(arg, idx);
        }
    }
    map
}

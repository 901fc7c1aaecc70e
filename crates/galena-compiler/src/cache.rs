//! On-disk cache of stitched graph sets, keyed by source-graph fingerprint.
//!
//! The cache file is one JSON document whose top-level keys are the graph
//! ordinals within the set (`"0"`, `"1"`, `"2"`); each entry holds the node
//! graph, the parameter tensors in nested-array form, the device tag, the
//! source hash, and (for the head graph) the input-index map with stringified
//! keys. Writes are plain scoped file I/O with no partial-write recovery; a
//! malformed file on load surfaces its parse error rather than silently
//! recompiling.

use crate::config::CompilerConfig;
use crate::{Error, GraphDescriptor, Result};
use galena_core::{Device, JsonGraph, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Env toggle for automatic cache path derivation: `0` disabled, `1` enabled,
/// `-1` force-recache.
pub const CACHE_ENV_VAR: &str = "GALENA_GRAPH_CACHE";

/// Env var carrying the accelerator toolchain revision embedded in automatic
/// cache paths, so graph sets from an older toolchain are never reused.
pub const TOOLCHAIN_REV_ENV_VAR: &str = "GALENA_TOOLCHAIN_REV";

const AUTO_CACHE_DIR: &str = "generated_modules/graph_cache";

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    graph: JsonGraph,
    params: BTreeMap<String, Tensor>,
    device: Device,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nid_to_input_idx: Option<BTreeMap<String, usize>>,
}

/// Resolve the cache path for this compilation: the explicit configured path,
/// or an automatically derived one when the env toggle asks for it.
///
/// # Panics
///
/// Panics on an unparseable toggle value, and on a missing toolchain revision
/// when automatic caching is enabled; both are operator environment mistakes
/// that must not be masked.
fn cache_path(graph_hash: &str, cfg: &CompilerConfig, is_load: bool) -> String {
    let raw = std::env::var(CACHE_ENV_VAR).unwrap_or_else(|_| "0".to_string());
    let auto_cache: i64 = raw.parse().unwrap_or_else(|_| {
        panic!(
            "{} value of {} not understood; set to 1 to enable the cache, 0 to disable and -1 to recache",
            CACHE_ENV_VAR, raw
        )
    });

    if auto_cache != 0 && cfg.graph_store_path.is_empty() && cfg.graph_load_path.is_empty() {
        assert!(
            auto_cache == -1 || auto_cache == 1,
            "{} value of {} not understood; set to 1 to enable the cache, 0 to disable and -1 to recache",
            CACHE_ENV_VAR,
            auto_cache
        );
        if auto_cache == -1 && is_load {
            // Force-recache: never load, always store fresh.
            String::new()
        } else {
            let rev = std::env::var(TOOLCHAIN_REV_ENV_VAR).unwrap_or_default();
            assert!(
                !rev.is_empty(),
                "could not determine the toolchain revision for the graph cache; set {} to the accelerator compiler commit",
                TOOLCHAIN_REV_ENV_VAR
            );
            let short: String = rev.chars().take(8).collect();
            format!("{}/{}_{}", AUTO_CACHE_DIR, short, graph_hash)
        }
    } else if is_load {
        cfg.graph_load_path.clone()
    } else {
        cfg.graph_store_path.clone()
    }
}

/// Load a previously stored graph set.
///
/// Returns `None` when no load path is configured, the file does not exist,
/// or constant propagation is active (cached graphs would be stale). A file
/// that exists but fails to parse is an error, not a cache miss.
pub fn load_graphs(cfg: &CompilerConfig, graph_hash: &str) -> Result<Option<Vec<GraphDescriptor>>> {
    let load_path = cache_path(graph_hash, cfg, true);
    if load_path.is_empty() || !Path::new(&load_path).exists() || cfg.enable_constant_prop {
        return Ok(None);
    }

    let text = fs::read_to_string(&load_path)?;
    let entries: BTreeMap<String, CacheEntry> = serde_json::from_str(&text)?;

    let mut ordered = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        let ordinal: usize = id
            .parse()
            .map_err(|_| Error::InvalidCache(format!("non-integer graph ordinal: {}", id)))?;
        ordered.push((ordinal, entry));
    }
    ordered.sort_by_key(|(ordinal, _)| *ordinal);

    let mut graphs = Vec::with_capacity(ordered.len());
    for (_, entry) in ordered {
        entry.graph.validate().map_err(Error::Graph)?;
        let nid_to_input_idx = entry
            .nid_to_input_idx
            .map(|map| {
                map.into_iter()
                    .map(|(nid, idx)| {
                        nid.parse::<usize>().map(|nid| (nid, idx)).map_err(|_| {
                            Error::InvalidCache(format!("non-integer node id key: {}", nid))
                        })
                    })
                    .collect::<Result<BTreeMap<usize, usize>>>()
            })
            .transpose()?;
        graphs.push(GraphDescriptor {
            graph: entry.graph,
            params: entry.params,
            device: entry.device,
            hash: entry.hash,
            nid_to_input_idx,
            num_model_inputs: None,
        });
    }

    tracing::info!(path = %load_path, "loaded serialized graph set");
    Ok(Some(graphs))
}

/// Store a stitched graph set.
///
/// Skipped silently when no store path is configured, constant propagation is
/// active, or the accelerator graph is empty.
pub fn store_graphs(cfg: &CompilerConfig, graphs: &[GraphDescriptor]) -> Result<()> {
    let Some(head) = graphs.first() else {
        return Ok(());
    };
    let store_path = cache_path(&head.hash, cfg, false);
    let device_graph_empty = graphs
        .iter()
        .find(|g| g.device == Device::Tt)
        .map_or(true, |g| g.graph.is_empty());
    if store_path.is_empty() || cfg.enable_constant_prop || device_graph_empty {
        return Ok(());
    }

    let mut entries: BTreeMap<String, CacheEntry> = BTreeMap::new();
    for (id, descriptor) in graphs.iter().enumerate() {
        entries.insert(
            id.to_string(),
            CacheEntry {
                graph: descriptor.graph.clone(),
                params: descriptor.params.clone(),
                device: descriptor.device,
                hash: descriptor.hash.clone(),
                nid_to_input_idx: descriptor.nid_to_input_idx.as_ref().map(|map| {
                    map.iter().map(|(nid, idx)| (nid.to_string(), *idx)).collect()
                }),
            },
        );
    }

    let text = serde_json::to_string_pretty(&entries)?;
    if let Some(parent) = Path::new(&store_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&store_path, text)?;

    tracing::info!(path = %store_path, "stored serialized graph set");
    Ok(())
}

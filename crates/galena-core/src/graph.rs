//! Strongly typed form of the serialized executor graph.
//!
//! The wire format is the executor's JSON document: a flat `nodes` list,
//! `arg_nodes` (graph input indices), `heads` (graph output references), and
//! `node_row_ptr` (storage row index). Conversion to and from the JSON form
//! happens only at the boundary (`parse` / `to_text`); every index is checked
//! for validity on entry so the rest of the pipeline can rely on it.
//!
//! Fragments produced for the same device are merged with [`join`], which
//! rebases node references by the running node count so that the concatenated
//! graph stays internally consistent.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to a node output: `[node_id, output_index, version]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize, usize)", into = "(usize, usize, usize)")]
pub struct EntryRef {
    /// Index of the referenced node in the graph's `nodes` list.
    pub node: usize,
    /// Output slot on the referenced node.
    pub output: usize,
    /// Version counter (unused by the stitcher, carried through).
    pub version: usize,
}

impl EntryRef {
    /// Reference to output 0 of `node`.
    pub fn new(node: usize) -> Self {
        Self {
            node,
            output: 0,
            version: 0,
        }
    }

    /// The same reference with the node id shifted by `offset`.
    fn rebased(self, offset: usize) -> Self {
        Self {
            node: self.node + offset,
            ..self
        }
    }
}

impl From<(usize, usize, usize)> for EntryRef {
    fn from((node, output, version): (usize, usize, usize)) -> Self {
        Self {
            node,
            output,
            version,
        }
    }
}

impl From<EntryRef> for (usize, usize, usize) {
    fn from(entry: EntryRef) -> Self {
        (entry.node, entry.output, entry.version)
    }
}

/// One node of a serialized executor graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node kind: `"input"` for graph arguments, otherwise the operator name.
    pub op: String,

    /// Node name; unique within a well-formed graph.
    pub name: String,

    /// Opaque per-node attributes, carried through verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,

    /// References to the producing nodes of each operand.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<EntryRef>,
}

impl GraphNode {
    /// Synthetic input node carrying `name`, with no attributes.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            op: "input".to_string(),
            name: name.into(),
            attrs: Map::new(),
            inputs: Vec::new(),
        }
    }

    /// Clone of this node retyped as an input node named `name`.
    ///
    /// Attributes (shape, dtype) are kept so the consumer can bind the value;
    /// operand references are dropped because the clone lands in a graph that
    /// does not contain the producers.
    pub fn retyped_as_input(&self, name: &str) -> Self {
        Self {
            op: "input".to_string(),
            name: name.to_string(),
            attrs: self.attrs.clone(),
            inputs: Vec::new(),
        }
    }

    /// Check whether this node is a graph input.
    pub fn is_input(&self) -> bool {
        self.op == "input"
    }
}

/// Serialized executor graph in its typed, index-checked form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonGraph {
    /// All nodes, in execution order.
    pub nodes: Vec<GraphNode>,

    /// Indices of the input nodes.
    pub arg_nodes: Vec<usize>,

    /// Graph output references.
    pub heads: Vec<EntryRef>,

    /// Storage row index, one running counter per node row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_row_ptr: Vec<usize>,

    /// Any other top-level field of the wire document, carried through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JsonGraph {
    /// Parse the wire form, validating every node reference.
    pub fn parse(text: &str) -> Result<Self> {
        let graph: JsonGraph = serde_json::from_str(text)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Serialize back to the wire form.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check that every head, arg-node, and operand reference resolves to an
    /// existing node.
    pub fn validate(&self) -> Result<()> {
        let count = self.nodes.len();
        for (nid, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                if input.node >= count {
                    return Err(Error::InvalidGraph(format!(
                        "node {} ({}) references missing node {}",
                        nid, node.name, input.node
                    )));
                }
            }
        }
        for head in &self.heads {
            if head.node >= count {
                return Err(Error::InvalidGraph(format!(
                    "head references missing node {}",
                    head.node
                )));
            }
        }
        for &arg in &self.arg_nodes {
            if arg >= count {
                return Err(Error::InvalidGraph(format!(
                    "arg_nodes references missing node {}",
                    arg
                )));
            }
        }
        Ok(())
    }

    /// Check whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the first node named `name`.
    pub fn node_index_by_name(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Append `node` as a new graph argument and head, returning its index.
    ///
    /// This is how passthrough and forwarded inputs are wired in: the value
    /// becomes bindable (arg) and observable (head) without any computation.
    pub fn push_arg(&mut self, node: GraphNode) -> usize {
        self.nodes.push(node);
        let nid = self.nodes.len() - 1;
        self.arg_nodes.push(nid);
        self.heads.push(EntryRef::new(nid));
        nid
    }
}

/// Merge an ordered list of same-device graph fragments into one graph.
///
/// The first fragment is taken verbatim. Each subsequent fragment has every
/// operand, head, and arg-node reference shifted by the node count accumulated
/// so far, and its `node_row_ptr` entries shifted by the accumulated row count,
/// before its fields are concatenated onto the result. Fragment order must
/// match the order the partition functions are called in, since it decides
/// which nodes count as "earlier" for passthrough wiring.
pub fn join(fragments: Vec<JsonGraph>) -> Result<JsonGraph> {
    let mut fragments = fragments.into_iter();
    let mut joined = fragments
        .next()
        .ok_or_else(|| Error::InvalidGraph("cannot join an empty fragment list".to_string()))?;

    for mut graph in fragments {
        let node_offset = joined.nodes.len();
        let row_offset = joined.node_row_ptr.len();

        for node in &mut graph.nodes {
            for input in &mut node.inputs {
                *input = input.rebased(node_offset);
            }
        }
        for head in &mut graph.heads {
            *head = head.rebased(node_offset);
        }
        for arg in &mut graph.arg_nodes {
            *arg += node_offset;
        }
        for row in &mut graph.node_row_ptr {
            *row += row_offset;
        }

        joined.nodes.extend(graph.nodes);
        joined.arg_nodes.extend(graph.arg_nodes);
        joined.heads.extend(graph.heads);
        joined.node_row_ptr.extend(graph.node_row_ptr);
        for (key, value) in graph.extra {
            if let Some(Value::Array(existing)) = joined.extra.get_mut(&key) {
                if let Value::Array(incoming) = value {
                    existing.extend(incoming);
                }
                continue;
            }
            joined.extra.entry(key).or_insert(value);
        }
    }

    joined.validate()?;
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(num_ops: usize, tag: &str) -> JsonGraph {
        // One input node followed by a chain of ops, each consuming the
        // previous node. Head points at the last node.
        let mut nodes = vec![GraphNode::input(format!("{}_in", tag))];
        for i in 0..num_ops {
            nodes.push(GraphNode {
                op: "add".to_string(),
                name: format!("{}_op{}", tag, i),
                attrs: Map::new(),
                inputs: vec![EntryRef::new(i)],
            });
        }
        let last = nodes.len() - 1;
        JsonGraph {
            nodes,
            arg_nodes: vec![0],
            heads: vec![EntryRef::new(last)],
            node_row_ptr: (0..=num_ops + 1).collect(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_entry_ref_wire_form() {
        let entry = EntryRef::new(7);
        assert_eq!(serde_json::to_string(&entry).unwrap(), "[7,0,0]");

        let parsed: EntryRef = serde_json::from_str("[3,1,0]").unwrap();
        assert_eq!(parsed.node, 3);
        assert_eq!(parsed.output, 1);
    }

    #[test]
    fn test_parse_round_trip() {
        let graph = fragment(2, "a");
        let text = graph.to_text().unwrap();
        let reparsed = JsonGraph::parse(&text).unwrap();
        assert_eq!(graph, reparsed);
    }

    #[test]
    fn test_parse_rejects_dangling_head() {
        let text = r#"{"nodes":[{"op":"input","name":"x"}],"arg_nodes":[0],"heads":[[5,0,0]],"node_row_ptr":[0,1]}"#;
        assert!(JsonGraph::parse(text).is_err());
    }

    #[test]
    fn test_join_node_count_is_sum() {
        let fragments = vec![fragment(2, "a"), fragment(4, "b"), fragment(1, "c")];
        let expected: usize = fragments.iter().map(|f| f.nodes.len()).sum();
        let joined = join(fragments).unwrap();
        assert_eq!(joined.nodes.len(), expected);
    }

    #[test]
    fn test_join_rebases_all_references() {
        let a = fragment(2, "a"); // 3 nodes
        let b = fragment(1, "b"); // 2 nodes
        let joined = join(vec![a, b]).unwrap();

        // b's input node lands at index 3, its op at 4.
        assert_eq!(joined.arg_nodes, vec![0, 3]);
        assert_eq!(joined.heads[0].node, 2);
        assert_eq!(joined.heads[1].node, 4);
        assert_eq!(joined.nodes[4].inputs[0].node, 3);

        // Every reference resolves inside the joined graph.
        joined.validate().unwrap();
    }

    #[test]
    fn test_join_shifts_node_row_ptr() {
        let a = fragment(2, "a"); // row ptr [0,1,2,3]
        let b = fragment(1, "b"); // row ptr [0,1,2]
        let joined = join(vec![a, b]).unwrap();
        assert_eq!(joined.node_row_ptr, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_join_single_fragment_is_verbatim() {
        let a = fragment(3, "a");
        let joined = join(vec![a.clone()]).unwrap();
        assert_eq!(joined, a);
    }

    #[test]
    fn test_join_concatenates_extra_list_fields() {
        let mut a = fragment(1, "a");
        a.extra
            .insert("storage_ids".to_string(), serde_json::json!([0, 1]));
        let mut b = fragment(1, "b");
        b.extra
            .insert("storage_ids".to_string(), serde_json::json!([0, 1]));

        let joined = join(vec![a, b]).unwrap();
        assert_eq!(joined.extra["storage_ids"], serde_json::json!([0, 1, 0, 1]));
    }

    #[test]
    fn test_push_arg_appends_arg_and_head() {
        let mut graph = fragment(1, "a");
        let nid = graph.push_arg(GraphNode::input("forwarded"));
        assert_eq!(nid, 2);
        assert!(graph.arg_nodes.contains(&2));
        assert_eq!(graph.heads.last().unwrap().node, 2);
        graph.validate().unwrap();
    }

    #[test]
    fn test_retyped_as_input_drops_operands() {
        let node = GraphNode {
            op: "multiply".to_string(),
            name: "mul0".to_string(),
            attrs: Map::new(),
            inputs: vec![EntryRef::new(0), EntryRef::new(1)],
        };
        let input = node.retyped_as_input("passthrough_first_to_second_0");
        assert!(input.is_input());
        assert!(input.inputs.is_empty());
        assert_eq!(input.name, "passthrough_first_to_second_0");
    }
}

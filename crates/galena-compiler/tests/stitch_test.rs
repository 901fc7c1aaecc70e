//! End-to-end stitching scenarios over `extract_graphs`.

mod common;

use common::{assert_unique_names, chain_fragment, fragment_text, global_function, module, with_heads};
use galena_compiler::{extract_graphs, NormalizerState, PartitionParams, Session};
use galena_core::{Device, Tensor};
use galena_module::Expr;

const HASH: &str = "f00dfeedf00dfeed";

/// Model that partitions into cpu-pre (3 nodes), accelerator (5 nodes), and
/// cpu-post (2 nodes). One accelerator output is a direct model output, and
/// the post segment consumes the model input `aux` by name.
#[test]
fn test_three_segment_model() {
    let mut session = Session::new();
    session.register(
        Device::Cpu,
        "pre_fn",
        fragment_text(&chain_fragment(&["x"], &["exp0", "exp1"])),
        vec![],
    );
    session.register(
        Device::Tt,
        "dev_fn",
        fragment_text(&chain_fragment(
            &["dev_in", "gen_galena_main_0_w"],
            &["mm0", "mm1", "mm2"],
        )),
        vec!["gen_galena_main_0_w".to_string()],
    );
    session.register(
        Device::Cpu,
        "post_fn",
        fragment_text(&chain_fragment(&["aux"], &["neg0"])),
        vec![],
    );

    let pre_call = Expr::call("pre_fn", vec![Expr::var("x")]);
    let body = Expr::Tuple(vec![
        Expr::call("dev_fn", vec![pre_call]),
        Expr::call("post_fn", vec![Expr::var("aux")]),
    ]);
    let module = module(
        &["x", "aux"],
        body,
        vec![
            global_function("pre_fn", Device::Cpu),
            global_function("dev_fn", Device::Tt),
            global_function("post_fn", Device::Cpu),
        ],
    );

    let mut params = PartitionParams::new();
    params.insert(
        "dev_fn".to_string(),
        vec![Tensor::from_f32(vec![2], vec![0.5, -0.5]).unwrap()],
    );

    let input_names = vec!["x".to_string(), "aux".to_string()];
    let mut state = NormalizerState::new();
    let graphs = extract_graphs(&session, &module, &params, &input_names, &mut state, HASH).unwrap();

    assert_eq!(graphs.len(), 3);
    assert_eq!(
        graphs.iter().map(|g| g.device).collect::<Vec<_>>(),
        vec![Device::Cpu, Device::Tt, Device::Cpu]
    );

    let (first, second, third) = (&graphs[0], &graphs[1], &graphs[2]);

    // The pre graph forwards `aux` for the post segment: 3 own nodes plus the
    // forwarded input, which stays bindable and observable.
    assert_eq!(first.graph.nodes.len(), 4);
    let aux_nid = first.graph.node_index_by_name("aux").unwrap();
    assert!(first.graph.arg_nodes.contains(&aux_nid));
    assert!(first.graph.heads.iter().any(|h| h.node == aux_nid));

    // Head graph bookkeeping covers both true model inputs, nothing else.
    assert_eq!(first.num_model_inputs, Some(2));
    let nid_map = first.nid_to_input_idx.as_ref().unwrap();
    assert_eq!(nid_map.len(), 2);
    assert_eq!(nid_map.get(&0), Some(&0));
    assert_eq!(nid_map.get(&aux_nid), Some(&1));

    // Accelerator graph: 5 own nodes plus the forwarded `aux`.
    assert_eq!(second.graph.nodes.len(), 6);
    assert!(second.graph.node_index_by_name("aux").is_some());
    assert_eq!(second.params.keys().collect::<Vec<_>>(), vec!["w0"]);
    assert!(second.graph.node_index_by_name("w0").is_some());

    // Post graph: 2 own nodes plus the accelerator output passed through.
    assert_eq!(third.graph.nodes.len(), 3);
    let pt_nid = third
        .graph
        .node_index_by_name("passthrough_second_to_third_0")
        .unwrap();
    assert!(third.graph.arg_nodes.contains(&pt_nid));
    assert!(third.graph.nodes[pt_nid].is_input());

    for descriptor in &graphs {
        descriptor.graph.validate().unwrap();
        assert_unique_names(&descriptor.graph);
        assert_eq!(descriptor.hash, HASH);
    }
}

/// A pre-segment output that the accelerator already consumes as a call
/// argument must not also be injected as a passthrough.
#[test]
fn test_no_duplicate_passthrough() {
    let mut session = Session::new();
    session.register(
        Device::Cpu,
        "pre_fn",
        fragment_text(&chain_fragment(&["x"], &["sub0"])),
        vec![],
    );
    session.register(
        Device::Tt,
        "dev_fn",
        fragment_text(&chain_fragment(&["dev_in"], &["mm0"])),
        vec![],
    );

    // The pre output is both the accelerator's argument and a model output.
    let pre_out = Expr::call("pre_fn", vec![Expr::var("x")]).get(0);
    let body = Expr::Tuple(vec![
        Expr::call("dev_fn", vec![pre_out.clone()]),
        pre_out,
    ]);
    let module = module(
        &["x"],
        body,
        vec![
            global_function("pre_fn", Device::Cpu),
            global_function("dev_fn", Device::Tt),
        ],
    );

    let input_names = vec!["x".to_string()];
    let mut state = NormalizerState::new();
    let graphs = extract_graphs(
        &session,
        &module,
        &PartitionParams::new(),
        &input_names,
        &mut state,
        HASH,
    )
    .unwrap();

    assert_eq!(graphs.len(), 2);
    let second = &graphs[1];
    assert!(second
        .graph
        .nodes
        .iter()
        .all(|n| !n.name.starts_with("passthrough_")));
    // Nothing was injected at all: the value already rides the call argument.
    assert_eq!(second.graph.nodes.len(), 2);
}

/// A pre-segment output that is a model output but never consumed by the
/// accelerator must surface as a head of the accelerator graph.
#[test]
fn test_passthrough_completeness() {
    let mut session = Session::new();
    session.register(
        Device::Cpu,
        "pre_fn",
        fragment_text(&with_heads(
            chain_fragment(&["x"], &["mean0", "var0"]),
            &[1, 2],
        )),
        vec![],
    );
    session.register(
        Device::Tt,
        "dev_fn",
        fragment_text(&chain_fragment(&["dev_in"], &["mm0"])),
        vec![],
    );

    let pre_call = Expr::call("pre_fn", vec![Expr::var("x")]);
    let body = Expr::Tuple(vec![
        Expr::call("dev_fn", vec![pre_call.clone().get(0)]),
        pre_call.get(1),
    ]);
    let module = module(
        &["x"],
        body,
        vec![
            global_function("pre_fn", Device::Cpu),
            global_function("dev_fn", Device::Tt),
        ],
    );

    let input_names = vec!["x".to_string()];
    let mut state = NormalizerState::new();
    let graphs = extract_graphs(
        &session,
        &module,
        &PartitionParams::new(),
        &input_names,
        &mut state,
        HASH,
    )
    .unwrap();

    let second = &graphs[1];
    let pt_nid = second
        .graph
        .node_index_by_name("passthrough_first_to_second_0")
        .unwrap();
    assert!(second.graph.arg_nodes.contains(&pt_nid));
    assert!(
        second.graph.heads.iter().any(|h| h.node == pt_nid),
        "pre-segment model output must be reachable as an accelerator head"
    );
    assert_unique_names(&second.graph);
}

/// A model with no CPU segments stitches to a single accelerator graph with
/// no passthrough nodes.
#[test]
fn test_accelerator_only_model() {
    let mut session = Session::new();
    session.register(
        Device::Tt,
        "dev_fn",
        fragment_text(&chain_fragment(&["x"], &["mm0"])),
        vec![],
    );

    let module = module(
        &["x"],
        Expr::call("dev_fn", vec![Expr::var("x")]),
        vec![global_function("dev_fn", Device::Tt)],
    );

    let input_names = vec!["x".to_string()];
    let mut state = NormalizerState::new();
    let graphs = extract_graphs(
        &session,
        &module,
        &PartitionParams::new(),
        &input_names,
        &mut state,
        HASH,
    )
    .unwrap();

    assert_eq!(graphs.len(), 1);
    let only = &graphs[0];
    assert_eq!(only.device, Device::Tt);
    assert_eq!(only.graph.nodes.len(), 2);
    assert!(only
        .graph
        .nodes
        .iter()
        .all(|n| !n.name.starts_with("passthrough_")));
    assert_eq!(only.num_model_inputs, Some(1));
    assert_eq!(
        only.nid_to_input_idx.as_ref().unwrap(),
        &std::collections::BTreeMap::from([(0, 0)])
    );
}

/// A called partition function that never registered a fragment is a
/// registration error, not a panic.
#[test]
fn test_missing_fragment_is_an_error() {
    let session = Session::new();
    let module = module(
        &["x"],
        Expr::call("dev_fn", vec![Expr::var("x")]),
        vec![global_function("dev_fn", Device::Tt)],
    );

    let mut state = NormalizerState::new();
    let err = extract_graphs(
        &session,
        &module,
        &PartitionParams::new(),
        &["x".to_string()],
        &mut state,
        HASH,
    )
    .unwrap_err();
    assert!(err.to_string().contains("dev_fn"));
}

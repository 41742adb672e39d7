use vkir::graph::{
    validate_graph_topology, GraphIndexError, GraphRewriter, GraphSerdeError, TopologyError,
};
use vkir::{
    Argument, DType, Graph, MemoryLayout, MetaValue, NodeId, OpKind, ScalarAttr, StorageType,
    TensorSpec,
};

fn spec() -> TensorSpec {
    TensorSpec::new(DType::F32, vec![1, 4, 8, 8])
}

#[test]
fn insert_before_keeps_program_order_and_user_lists() {
    let mut graph = Graph::new();
    let a = graph.add_input(spec());
    let b = graph.add_input(spec());
    let add = graph.add_op(OpKind::Add, &[a, b], spec());
    let out = graph.mark_output(&[add]);

    let mut rewriter = GraphRewriter::new(&mut graph).unwrap();
    assert_eq!(rewriter.nodes_in_order(), vec![a, b, add, out]);
    assert_eq!(rewriter.users_of(a), &[add]);

    let clone = rewriter
        .insert_before(add, OpKind::Clone, vec![Argument::Node(a)], vec![spec()])
        .unwrap();
    assert_eq!(rewriter.nodes_in_order(), vec![a, b, clone, add, out]);
    assert!(rewriter.users_of(a).contains(&clone));
    assert!(rewriter.users_of(a).contains(&add));

    rewriter.replace_use_in(add, a, clone);
    assert_eq!(rewriter.users_of(a), &[clone]);
    assert_eq!(rewriter.users_of(clone), &[add]);
    assert_eq!(
        rewriter.node(add).args,
        vec![Argument::Node(clone), Argument::Node(b)]
    );
    drop(rewriter);

    let ids: Vec<NodeId> = graph.nodes().iter().map(|node| node.id).collect();
    assert_eq!(ids, vec![a, b, clone, add, out]);
}

#[test]
fn replace_use_in_touches_only_the_named_consumer() {
    let mut graph = Graph::new();
    let a = graph.add_input(spec());
    let add = graph.add_op(OpKind::Add, &[a, a], spec());
    let relu = graph.add_op(OpKind::Relu, &[a], spec());
    graph.mark_output(&[add, relu]);

    let mut rewriter = GraphRewriter::new(&mut graph).unwrap();
    let clone = rewriter
        .insert_before(add, OpKind::Clone, vec![Argument::Node(a)], vec![spec()])
        .unwrap();
    rewriter.replace_use_in(add, a, clone);

    // Both argument slots of `add` referenced `a`; both move together.
    assert_eq!(
        rewriter.node(add).args,
        vec![Argument::Node(clone), Argument::Node(clone)]
    );
    assert_eq!(rewriter.node(relu).args, vec![Argument::Node(a)]);
    assert!(rewriter.users_of(a).contains(&relu));
    assert!(!rewriter.users_of(a).contains(&add));
}

#[test]
fn indexing_rejects_references_to_undefined_nodes() {
    let mut graph = Graph::new();
    let a = graph.add_input(spec());
    let relu = graph.add_op(OpKind::Relu, &[a], spec());
    graph.node_mut(relu).unwrap().args = vec![Argument::Node(NodeId(99))];

    let err = GraphRewriter::new(&mut graph).unwrap_err();
    assert_eq!(
        err,
        GraphIndexError::MissingNodeDefinition {
            node: NodeId(99),
            user: relu,
        }
    );
}

#[test]
fn insert_before_rejects_unknown_arguments() {
    let mut graph = Graph::new();
    let a = graph.add_input(spec());
    let relu = graph.add_op(OpKind::Relu, &[a], spec());
    graph.mark_output(&[relu]);
    let node_count = graph.nodes().len();

    let mut rewriter = GraphRewriter::new(&mut graph).unwrap();
    let err = rewriter
        .insert_before(
            relu,
            OpKind::Clone,
            vec![Argument::Node(NodeId(77))],
            vec![spec()],
        )
        .unwrap_err();
    assert!(matches!(err, GraphIndexError::MissingNodeDefinition { .. }));
    drop(rewriter);

    // A failed insertion leaves the graph untouched.
    assert_eq!(graph.nodes().len(), node_count);
}

#[test]
fn json_snapshot_round_trips_structure_and_metadata() {
    let mut graph = Graph::new();
    let x = graph.add_input(spec());
    let split = graph.add_node(
        OpKind::Split,
        vec![Argument::Node(x), Argument::Scalar(ScalarAttr::Int(0))],
        vec![spec(), spec()],
    );
    graph.set_storage(
        split,
        MetaValue::PerOutput(vec![StorageType::Buffer, StorageType::Texture3d]),
    );
    graph.set_layout(split, MetaValue::Single(MemoryLayout::WidthPacked));
    let relu = graph.add_op(OpKind::Relu, &[split], spec());
    graph.mark_output(&[relu]);

    let text = graph.to_json().unwrap();
    let mut restored = Graph::from_json(&text).unwrap();
    assert_eq!(restored, graph);
    assert_eq!(
        restored.node(split).unwrap().storage(),
        Some(StorageType::Buffer)
    );

    // The id allocator survives the snapshot: fresh nodes never collide
    // with restored ones.
    let fresh = restored.add_input(spec());
    assert!(graph.nodes().iter().all(|node| node.id != fresh));
}

#[test]
fn malformed_json_snapshot_is_rejected() {
    let err = Graph::from_json("{\"nodes\": 3}").unwrap_err();
    assert!(matches!(err, GraphSerdeError::Json(_)));
}

#[test]
fn topology_validation_requires_definition_before_use() {
    let mut graph = Graph::new();
    let a = graph.add_input(spec());
    let relu = graph.add_op(OpKind::Relu, &[a], spec());
    graph.mark_output(&[relu]);
    assert!(validate_graph_topology(&graph).is_ok());

    // Point the input at its own consumer to manufacture a forward
    // reference.
    graph.node_mut(a).unwrap().args = vec![Argument::Node(relu)];
    assert_eq!(
        validate_graph_topology(&graph),
        Err(TopologyError {
            missing_node: relu,
            consumer: a,
        })
    );
}

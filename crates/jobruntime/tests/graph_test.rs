// crates/jobruntime/tests/graph_test.rs

use async_trait::async_trait;
use jobcore::{
    Accumulator, Field, FieldSpec, GraphError, Keyed, Node, NodeContext, NodeFailure, NodeResult,
    Scalar,
};
use jobruntime::{GraphBuilder, END, START};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    id: String,
}

impl Keyed for Row {
    fn key(&self) -> &str {
        &self.id
    }
}

const TEXT: Field<Scalar<String>> = Field::new("text");
const ROWS: Field<Accumulator<Row>> = Field::new("rows");
const ROWS_AS_SCALAR: Field<Scalar<String>> = Field::new("rows");

struct Declared {
    name: &'static str,
    reads: Vec<FieldSpec>,
    writes: Vec<FieldSpec>,
}

#[async_trait]
impl Node for Declared {
    fn name(&self) -> &str {
        self.name
    }

    fn reads(&self) -> Vec<FieldSpec> {
        self.reads.clone()
    }

    fn writes(&self) -> Vec<FieldSpec> {
        self.writes.clone()
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        Ok(NodeResult::new())
    }
}

fn plain(name: &'static str) -> Arc<dyn Node> {
    declared(name, vec![], vec![])
}

fn declared(name: &'static str, reads: Vec<FieldSpec>, writes: Vec<FieldSpec>) -> Arc<dyn Node> {
    Arc::new(Declared {
        name,
        reads,
        writes,
    })
}

#[test]
fn test_start_and_end_are_synthesized() {
    let graph = GraphBuilder::new()
        .node(plain("search"))
        .node(plain("extract-resume-text"))
        .node(plain("summarize-listings"))
        .node(plain("extract-resume-fields"))
        .node(plain("score-and-feedback"))
        .edge("search", "summarize-listings")
        .edge("extract-resume-text", "extract-resume-fields")
        .edge("summarize-listings", "score-and-feedback")
        .edge("extract-resume-fields", "score-and-feedback")
        .build()
        .unwrap();

    assert_eq!(graph.len(), 5);
    assert_eq!(graph.successors(START), vec!["extract-resume-text", "search"]);
    assert_eq!(graph.predecessors(END), vec!["score-and-feedback"]);
    assert_eq!(graph.join_points(), vec!["score-and-feedback"]);

    let order = graph.topological_order();
    assert_eq!(order.first(), Some(&START));
    assert_eq!(order.last(), Some(&END));
}

#[test]
fn test_empty_graph_connects_start_to_end() {
    let graph = GraphBuilder::new().build().unwrap();
    assert!(graph.is_empty());
    assert_eq!(graph.successors(START), vec![END]);
}

#[test]
fn test_duplicate_node_is_rejected() {
    let err = GraphBuilder::new()
        .node(plain("search"))
        .node(plain("search"))
        .build()
        .err();
    assert_eq!(err, Some(GraphError::DuplicateNode("search".into())));
}

#[test]
fn test_reserved_name_is_rejected() {
    let err = GraphBuilder::new().node(plain(START)).build().err();
    assert_eq!(err, Some(GraphError::ReservedName(START.into())));
}

#[test]
fn test_dangling_edge_is_rejected() {
    let err = GraphBuilder::new()
        .node(plain("search"))
        .edge("search", "nowhere")
        .build()
        .err();
    assert_eq!(err, Some(GraphError::UnknownNode("nowhere".into())));
}

#[test]
fn test_cycle_is_rejected() {
    let err = GraphBuilder::new()
        .node(plain("root"))
        .node(plain("a"))
        .node(plain("b"))
        .edge("root", "a")
        .edge("a", "b")
        .edge("b", "a")
        .build()
        .err();
    assert!(matches!(err, Some(GraphError::CyclicDependency(_))));
}

#[test]
fn test_rootless_cycle_is_unreachable() {
    let err = GraphBuilder::new()
        .node(plain("x"))
        .node(plain("y"))
        .edge("x", "y")
        .edge("y", "x")
        .build()
        .err();
    assert!(matches!(err, Some(GraphError::Unreachable(_))));
}

#[test]
fn test_read_from_sibling_branch_is_rejected() {
    let err = GraphBuilder::new()
        .node(declared("writer", vec![], vec![TEXT.spec()]))
        .node(declared("reader", vec![TEXT.spec()], vec![]))
        .build()
        .err();
    assert_eq!(
        err,
        Some(GraphError::UnorderedRead {
            node: "reader".into(),
            field: "text".into(),
            producer: "writer".into(),
        })
    );
}

#[test]
fn test_read_from_ancestor_is_accepted() {
    let graph = GraphBuilder::new()
        .node(declared("writer", vec![], vec![TEXT.spec()]))
        .node(plain("middle"))
        .node(declared("reader", vec![TEXT.spec()], vec![]))
        .edge("writer", "middle")
        .edge("middle", "reader")
        .build();
    assert!(graph.is_ok());
}

#[test]
fn test_second_scalar_writer_is_rejected() {
    let err = GraphBuilder::new()
        .node(declared("one", vec![], vec![TEXT.spec()]))
        .node(declared("two", vec![], vec![TEXT.spec()]))
        .edge("one", "two")
        .build()
        .err();
    assert!(matches!(
        err,
        Some(GraphError::MultipleScalarWriters { ref field, .. }) if field == "text"
    ));
}

#[test]
fn test_accumulator_may_have_several_writers() {
    let graph = GraphBuilder::new()
        .node(declared("one", vec![], vec![ROWS.spec()]))
        .node(declared("two", vec![], vec![ROWS.spec()]))
        .build();
    assert!(graph.is_ok());
}

#[test]
fn test_conflicting_field_kinds_are_rejected() {
    let err = GraphBuilder::new()
        .node(declared("one", vec![], vec![ROWS.spec()]))
        .node(declared("two", vec![ROWS_AS_SCALAR.spec()], vec![]))
        .edge("one", "two")
        .build()
        .err();
    assert_eq!(
        err,
        Some(GraphError::FieldKindMismatch {
            field: "rows".into()
        })
    );
}

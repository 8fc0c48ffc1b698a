//! Graph assembly and build-time validation.

use jobcore::{FieldKind, GraphError, Node};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Name of the synthetic entry node.
pub const START: &str = "__start__";
/// Name of the synthetic exit node.
pub const END: &str = "__end__";

pub(crate) struct GraphNode {
    pub(crate) name: String,
    /// `None` for START and END.
    pub(crate) task: Option<Arc<dyn Node>>,
}

/// Collects nodes and explicit edges; [`build`](Self::build) validates them.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<(String, String)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// `to` may not start before `from` finishes.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn build(self) -> Result<JobGraph, GraphError> {
        let mut graph: DiGraph<GraphNode, ()> = DiGraph::new();
        let mut index = HashMap::new();

        for node in self.nodes {
            let name = node.name().to_string();
            if name == START || name == END {
                return Err(GraphError::ReservedName(name));
            }
            if index.contains_key(&name) {
                return Err(GraphError::DuplicateNode(name));
            }
            let idx = graph.add_node(GraphNode {
                name: name.clone(),
                task: Some(node),
            });
            index.insert(name, idx);
        }

        for (from, to) in &self.edges {
            let from_idx = *index
                .get(from)
                .ok_or_else(|| GraphError::UnknownNode(from.clone()))?;
            let to_idx = *index
                .get(to)
                .ok_or_else(|| GraphError::UnknownNode(to.clone()))?;
            graph.update_edge(from_idx, to_idx, ());
        }

        let roots: Vec<NodeIndex> = graph.externals(Direction::Incoming).collect();
        let leaves: Vec<NodeIndex> = graph.externals(Direction::Outgoing).collect();

        let start = graph.add_node(GraphNode {
            name: START.to_string(),
            task: None,
        });
        let end = graph.add_node(GraphNode {
            name: END.to_string(),
            task: None,
        });
        for root in roots {
            graph.add_edge(start, root, ());
        }
        for leaf in leaves {
            graph.add_edge(leaf, end, ());
        }
        if graph.node_count() == 2 {
            graph.add_edge(start, end, ());
        }

        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&graph, start);
        while let Some(idx) = dfs.next(&graph) {
            reached.insert(idx);
        }
        // END is left out: it is only cut off when every leaf sits on a
        // cycle, which the toposort below reports
        if let Some(idx) = graph
            .node_indices()
            .find(|idx| graph[*idx].task.is_some() && !reached.contains(idx))
        {
            return Err(GraphError::Unreachable(graph[idx].name.clone()));
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| GraphError::CyclicDependency(graph[cycle.node_id()].name.clone()))?;

        let built = JobGraph {
            graph,
            index,
            order,
            start,
            end,
        };
        built.check_fields()?;

        tracing::debug!(nodes = built.len(), "graph validated");
        Ok(built)
    }
}

/// Immutable, validated DAG. Built once and shared across runs.
pub struct JobGraph {
    pub(crate) graph: DiGraph<GraphNode, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
    pub(crate) start: NodeIndex,
    pub(crate) end: NodeIndex,
}

impl JobGraph {
    /// Field ownership rules: every scalar has one writer, a name keeps one
    /// kind everywhere, and every producer of a field a node reads is one of
    /// that node's ancestors.
    fn check_fields(&self) -> Result<(), GraphError> {
        let mut kinds: HashMap<&str, FieldKind> = HashMap::new();
        let mut writers: HashMap<&str, Vec<NodeIndex>> = HashMap::new();

        for &idx in &self.order {
            let Some(task) = &self.graph[idx].task else {
                continue;
            };
            for spec in task.writes().into_iter().chain(task.reads()) {
                if *kinds.entry(spec.name).or_insert(spec.kind) != spec.kind {
                    return Err(GraphError::FieldKindMismatch {
                        field: spec.name.to_string(),
                    });
                }
            }
            for spec in task.writes() {
                let producers = writers.entry(spec.name).or_default();
                if spec.kind == FieldKind::Scalar {
                    if let Some(&first) = producers.first() {
                        return Err(GraphError::MultipleScalarWriters {
                            field: spec.name.to_string(),
                            first: self.graph[first].name.clone(),
                            second: self.graph[idx].name.clone(),
                        });
                    }
                }
                producers.push(idx);
            }
        }

        for &idx in &self.order {
            let Some(task) = &self.graph[idx].task else {
                continue;
            };
            for spec in task.reads() {
                for &producer in writers.get(spec.name).into_iter().flatten() {
                    if producer == idx || !has_path_connecting(&self.graph, producer, idx, None) {
                        return Err(GraphError::UnorderedRead {
                            node: self.graph[idx].name.clone(),
                            field: spec.name.to_string(),
                            producer: self.graph[producer].name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of user-registered nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All node names, START and END included, in a topological order.
    pub fn topological_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&idx| self.graph[idx].name.as_str())
            .collect()
    }

    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    pub fn successors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Registered nodes with two or more incoming edges.
    pub fn join_points(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|&&idx| {
                self.graph[idx].task.is_some()
                    && self
                        .graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count()
                        >= 2
            })
            .map(|&idx| self.graph[idx].name.as_str())
            .collect()
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let idx = match name {
            START => Some(self.start),
            END => Some(self.end),
            other => self.index.get(other).copied(),
        };
        let mut names: Vec<&str> = idx
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .map(|n| self.graph[n].name.as_str())
                    .collect()
            })
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub(crate) fn incoming(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Incoming)
    }

    pub(crate) fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Outgoing)
    }

    pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }
}

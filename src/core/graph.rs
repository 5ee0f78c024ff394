//! Immutable pipeline graph and its builder.
//!
//! A graph is a fixed set of named nodes, one outgoing edge per node at
//! most, one entry node and routers attached to decision nodes. Nodes with
//! no outgoing edge are terminal. Nothing can be added after `build`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::node::{Node, NodeId};
use super::router::Route;
use super::state::Field;

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Unconditional forward edge
    Static(NodeId),

    /// Labeled edge re-entering an earlier stage (retry loops)
    Back { to: NodeId, label: &'static str },

    /// Decision point: the router picks the destination
    Routed(Arc<dyn Route>),
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(to) => write!(f, "Static({})", to),
            Self::Back { to, label } => write!(f, "Back({} [{}])", to, label),
            Self::Routed(_) => f.write_str("Routed(..)"),
        }
    }
}

/// A declared barrier: every branch flows into `into`
#[derive(Debug, Clone)]
pub struct Join {
    pub branches: Vec<NodeId>,
    pub into: NodeId,
}

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Graph has no entry node")]
    MissingEntry,

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Node '{0}' registered twice")]
    DuplicateNode(String),

    #[error("Node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    #[error("Back edge '{label}' from '{from}' to '{to}' does not target an earlier node")]
    ForwardBackEdge {
        from: String,
        to: String,
        label: String,
    },

    #[error("Join into '{into}' needs at least two branches")]
    TrivialJoin { into: String },

    #[error("Branches '{first}' and '{second}' both own field '{field}'")]
    OwnershipOverlap {
        first: String,
        second: String,
        field: Field,
    },

    #[error("Branches {branches:?} do not converge on a single node")]
    DivergentBranches { branches: Vec<String> },
}

/// The validated, immutable pipeline graph
pub struct Graph {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    order: Vec<NodeId>,
    edges: HashMap<NodeId, Edge>,
    joins: Vec<Join>,
    entry: NodeId,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("edges", &self.edges)
            .field("joins", &self.joins)
            .finish()
    }
}

impl Graph {
    /// Start building a graph
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// The entry node
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    /// Outgoing edge of a node (None = terminal)
    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.edges.get(name)
    }

    /// Node names in registration order
    pub fn node_names(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Declared joins
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// The single node every branch flows into through a static edge
    pub fn convergence(&self, branches: &[NodeId]) -> Result<NodeId, GraphError> {
        let mut target: Option<NodeId> = None;

        for branch in branches {
            if !self.nodes.contains_key(branch) {
                return Err(GraphError::UnknownNode(branch.to_string()));
            }

            let next = match self.edges.get(branch) {
                Some(Edge::Static(to)) => *to,
                _ => return Err(divergent(branches)),
            };

            match target {
                None => target = Some(next),
                Some(t) if t == next => {}
                Some(_) => return Err(divergent(branches)),
            }
        }

        target.ok_or_else(|| divergent(branches))
    }
}

fn divergent(branches: &[NodeId]) -> GraphError {
    GraphError::DivergentBranches {
        branches: branches.iter().map(|b| b.to_string()).collect(),
    }
}

/// Incremental graph construction; validated by [`GraphBuilder::build`]
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<(NodeId, Edge)>,
    joins: Vec<Join>,
    entry: Option<NodeId>,
}

impl GraphBuilder {
    /// Register a node
    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set the entry node
    pub fn entry(mut self, name: NodeId) -> Self {
        self.entry = Some(name);
        self
    }

    /// Unconditional edge
    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.push((from, Edge::Static(to)));
        self
    }

    /// Labeled back edge into an earlier node
    pub fn back_edge(mut self, from: NodeId, to: NodeId, label: &'static str) -> Self {
        self.edges.push((from, Edge::Back { to, label }));
        self
    }

    /// Attach a router to a decision node
    pub fn route(mut self, from: NodeId, router: impl Route + 'static) -> Self {
        self.edges.push((from, Edge::Routed(Arc::new(router))));
        self
    }

    /// Declare fan-out branches that converge on `into`
    pub fn join(mut self, branches: &[NodeId], into: NodeId) -> Self {
        for branch in branches {
            self.edges.push((*branch, Edge::Static(into)));
        }
        self.joins.push(Join {
            branches: branches.to_vec(),
            into,
        });
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<Graph, GraphError> {
        let mut nodes: HashMap<NodeId, Arc<dyn Node>> = HashMap::new();
        let mut order = Vec::new();

        for node in self.nodes {
            let name = node.name();
            if nodes.insert(name, node).is_some() {
                return Err(GraphError::DuplicateNode(name.to_string()));
            }
            order.push(name);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !nodes.contains_key(entry) {
            return Err(GraphError::UnknownNode(entry.to_string()));
        }

        let position = |name: NodeId| order.iter().position(|n| *n == name);

        let mut edges = HashMap::new();
        for (from, edge) in self.edges {
            if !nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.to_string()));
            }

            match &edge {
                Edge::Static(to) if !nodes.contains_key(to) => {
                    return Err(GraphError::UnknownNode(to.to_string()));
                }
                Edge::Back { to, label } => match (position(from), position(*to)) {
                    (_, None) => return Err(GraphError::UnknownNode(to.to_string())),
                    (Some(f), Some(t)) if t >= f => {
                        return Err(GraphError::ForwardBackEdge {
                            from: from.to_string(),
                            to: to.to_string(),
                            label: label.to_string(),
                        });
                    }
                    _ => {}
                },
                _ => {}
            }

            if edges.insert(from, edge).is_some() {
                return Err(GraphError::DuplicateEdge(from.to_string()));
            }
        }

        for join in &self.joins {
            validate_join(&nodes, join)?;
        }

        Ok(Graph {
            nodes,
            order,
            edges,
            joins: self.joins,
            entry,
        })
    }
}

/// Branches of one join must write pairwise-disjoint fields
fn validate_join(nodes: &HashMap<NodeId, Arc<dyn Node>>, join: &Join) -> Result<(), GraphError> {
    if join.branches.len() < 2 {
        return Err(GraphError::TrivialJoin {
            into: join.into.to_string(),
        });
    }
    if !nodes.contains_key(join.into) {
        return Err(GraphError::UnknownNode(join.into.to_string()));
    }

    let mut owners: HashMap<Field, NodeId> = HashMap::new();
    for branch in &join.branches {
        let node = nodes
            .get(branch)
            .ok_or_else(|| GraphError::UnknownNode(branch.to_string()))?;

        let fields: HashSet<Field> = node.owned_fields().iter().copied().collect();
        for field in fields {
            if let Some(first) = owners.insert(field, *branch) {
                return Err(GraphError::OwnershipOverlap {
                    first: first.to_string(),
                    second: branch.to_string(),
                    field,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::Next;
    use crate::core::state::{PipelineState, StatePatch};
    use async_trait::async_trait;

    struct Stub {
        name: NodeId,
        fields: &'static [Field],
    }

    #[async_trait]
    impl Node for Stub {
        fn name(&self) -> NodeId {
            self.name
        }

        fn owned_fields(&self) -> &'static [Field] {
            self.fields
        }

        async fn run(&self, _state: &PipelineState) -> StatePatch {
            StatePatch::empty()
        }
    }

    fn stub(name: NodeId, fields: &'static [Field]) -> Arc<dyn Node> {
        Arc::new(Stub { name, fields })
    }

    #[test]
    fn test_build_linear_graph() {
        let graph = Graph::builder()
            .node(stub("a", &[Field::Artifact]))
            .node(stub("b", &[Field::ScriptPath]))
            .entry("a")
            .edge("a", "b")
            .build()
            .unwrap();

        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node_count(), 2);
        assert!(matches!(graph.edge("a"), Some(Edge::Static("b"))));
        assert!(graph.edge("b").is_none());
    }

    #[test]
    fn test_missing_entry() {
        let result = Graph::builder().node(stub("a", &[])).build();
        assert_eq!(result.unwrap_err(), GraphError::MissingEntry);
    }

    #[test]
    fn test_unknown_edge_target() {
        let result = Graph::builder()
            .node(stub("a", &[]))
            .entry("a")
            .edge("a", "ghost")
            .build();
        assert_eq!(result.unwrap_err(), GraphError::UnknownNode("ghost".to_string()));
    }

    #[test]
    fn test_back_edge_must_point_backwards() {
        let result = Graph::builder()
            .node(stub("a", &[]))
            .node(stub("b", &[]))
            .entry("a")
            .back_edge("a", "b", "retry")
            .build();
        assert!(matches!(result, Err(GraphError::ForwardBackEdge { .. })));
    }

    #[test]
    fn test_join_rejects_overlapping_ownership() {
        let result = Graph::builder()
            .node(stub("left", &[Field::VideoPath, Field::Error]))
            .node(stub("right", &[Field::AudioPath, Field::Error]))
            .node(stub("merge", &[Field::FinalPath]))
            .entry("left")
            .join(&["left", "right"], "merge")
            .build();

        assert_eq!(
            result.unwrap_err(),
            GraphError::OwnershipOverlap {
                first: "left".to_string(),
                second: "right".to_string(),
                field: Field::Error,
            }
        );
    }

    #[test]
    fn test_convergence() {
        let graph = Graph::builder()
            .node(stub("check", &[]))
            .node(stub("left", &[Field::VideoPath]))
            .node(stub("right", &[Field::AudioPath]))
            .node(stub("merge", &[Field::FinalPath]))
            .entry("check")
            .route("check", |_: &PipelineState| Next::Parallel(vec!["left", "right"]))
            .join(&["left", "right"], "merge")
            .build()
            .unwrap();

        assert_eq!(graph.convergence(&["left", "right"]), Ok("merge"));
        assert!(matches!(
            graph.convergence(&["left", "check"]),
            Err(GraphError::DivergentBranches { .. })
        ));
    }

    #[test]
    fn test_duplicate_edge() {
        let result = Graph::builder()
            .node(stub("a", &[]))
            .node(stub("b", &[]))
            .entry("a")
            .edge("a", "b")
            .edge("a", "a")
            .build();
        assert_eq!(result.unwrap_err(), GraphError::DuplicateEdge("a".to_string()));
    }
}

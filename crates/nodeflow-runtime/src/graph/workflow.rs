//! Petgraph representation of a workflow.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::LOOP_BODY_HANDLES;
use crate::definition::{Node, NodeId, NodeKind, TriggerConfig, TriggerType, Workflow};

/// Role of an edge during scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeRole {
    Forward,
    LoopBody,
    LoopExit,
    LoopBack,
}

/// Edge weight of the compiled graph.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeInfo {
    /// Edge id from the definition.
    pub id: String,
    /// Source handle, with empty strings normalized to `None`.
    pub handle: Option<String>,
    /// Scheduling role.
    pub role: EdgeRole,
    /// Whether the edge returns into a loop from that loop's body.
    ///
    /// Every [`EdgeRole::LoopBack`] edge closes a loop, and so does the exit
    /// of a nested loop leading back into its enclosing loop.
    pub closes_loop: bool,
}

/// Compiled, immutable workflow graph.
///
/// Construction is lenient: duplicate node ids keep the first declaration and
/// edges with a missing endpoint are dropped. Use the validator to report
/// such problems.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<NodeId, EdgeInfo>,
    node_indices: HashMap<NodeId, NodeIndex>,
    nodes: HashMap<NodeId, Arc<Node>>,
    order: Vec<NodeId>,
    loop_bodies: HashMap<NodeId, HashSet<NodeId>>,
}

impl WorkflowGraph {
    /// Compiles a workflow definition.
    pub fn new(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        let mut nodes = HashMap::new();
        let mut order = Vec::new();

        for node in &workflow.nodes {
            if node_indices.contains_key(&node.id) {
                continue;
            }
            let index = graph.add_node(node.id.clone());
            node_indices.insert(node.id.clone(), index);
            nodes.insert(node.id.clone(), Arc::new(node.clone()));
            order.push(node.id.clone());
        }

        for edge in &workflow.edges {
            let (Some(&source), Some(&target)) = (
                node_indices.get(&edge.source),
                node_indices.get(&edge.target),
            ) else {
                continue;
            };
            graph.add_edge(
                source,
                target,
                EdgeInfo {
                    id: edge.id.clone(),
                    handle: edge.handle().map(str::to_owned),
                    role: EdgeRole::Forward,
                    closes_loop: false,
                },
            );
        }

        let mut compiled = Self {
            graph,
            node_indices,
            nodes,
            order,
            loop_bodies: HashMap::new(),
        };
        compiled.classify_edges();
        compiled
    }

    fn classify_edges(&mut self) {
        let loops: Vec<NodeId> = self
            .order
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| n.is_loop()))
            .cloned()
            .collect();

        for loop_id in loops {
            let body = self.compute_loop_body(&loop_id);
            self.loop_bodies.insert(loop_id, body);
        }

        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for edge in edges {
            let Some((source, target)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let source_id = self.graph[source].clone();
            let target_id = self.graph[target].clone();

            let closes_loop = self
                .loop_bodies
                .get(&target_id)
                .is_some_and(|body| source_id == target_id || body.contains(&source_id));

            // A loop's own handles decide first, so the exit of a nested loop
            // stays an exit even when it leads back into the outer loop.
            let role = if source_id != target_id && self.loop_bodies.contains_key(&source_id) {
                if is_body_handle(self.graph[edge].handle.as_deref()) {
                    EdgeRole::LoopBody
                } else {
                    EdgeRole::LoopExit
                }
            } else if closes_loop {
                EdgeRole::LoopBack
            } else {
                EdgeRole::Forward
            };
            self.graph[edge].role = role;
            self.graph[edge].closes_loop = closes_loop;
        }
    }

    /// Nodes reachable from the loop's body edges that can also reach the
    /// loop again, both without passing through the loop node.
    fn compute_loop_body(&self, loop_id: &NodeId) -> HashSet<NodeId> {
        let Some(&loop_index) = self.node_indices.get(loop_id) else {
            return HashSet::new();
        };

        let starts: Vec<NodeIndex> = self
            .graph
            .edges_directed(loop_index, Direction::Outgoing)
            .filter(|e| is_body_handle(e.weight().handle.as_deref()))
            .map(|e| e.target())
            .filter(|&target| target != loop_index)
            .collect();
        let forward = self.walk(starts, loop_index, Direction::Outgoing);

        let ends: Vec<NodeIndex> = self
            .graph
            .edges_directed(loop_index, Direction::Incoming)
            .map(|e| e.source())
            .filter(|&source| source != loop_index)
            .collect();
        let backward = self.walk(ends, loop_index, Direction::Incoming);

        forward
            .intersection(&backward)
            .map(|&index| self.graph[index].clone())
            .collect()
    }

    fn walk(
        &self,
        starts: Vec<NodeIndex>,
        barrier: NodeIndex,
        direction: Direction,
    ) -> HashSet<NodeIndex> {
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = starts.into();

        while let Some(index) = queue.pop_front() {
            if index == barrier || !seen.insert(index) {
                continue;
            }
            queue.extend(self.graph.neighbors_directed(index, direction));
        }

        seen
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: &NodeId) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    /// Returns node ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    /// Returns the weight of an edge.
    pub fn edge(&self, edge: EdgeIndex) -> Option<&EdgeInfo> {
        self.graph.edge_weight(edge)
    }

    /// Returns the source and target node ids of an edge.
    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(&NodeId, &NodeId)> {
        let (source, target) = self.graph.edge_endpoints(edge)?;
        Some((&self.graph[source], &self.graph[target]))
    }

    /// Returns the edges leaving a node.
    pub fn outgoing(&self, id: &NodeId) -> Vec<EdgeIndex> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Returns the edges entering a node.
    pub fn incoming(&self, id: &NodeId) -> Vec<EdgeIndex> {
        self.edges_directed(id, Direction::Incoming)
    }

    fn edges_directed(&self, id: &NodeId, direction: Direction) -> Vec<EdgeIndex> {
        let Some(&index) = self.node_indices.get(id) else {
            return Vec::new();
        };
        // Petgraph walks adjacency lists newest first.
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(index, direction)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Returns the edges leaving a node with the given role.
    pub fn outgoing_with_role(&self, id: &NodeId, role: EdgeRole) -> Vec<EdgeIndex> {
        self.outgoing(id)
            .into_iter()
            .filter(|&e| self.edge(e).is_some_and(|info| info.role == role))
            .collect()
    }

    /// Returns the edges entering a node that close a loop on it.
    pub fn back_edges(&self, id: &NodeId) -> Vec<EdgeIndex> {
        self.incoming(id)
            .into_iter()
            .filter(|&e| self.edge(e).is_some_and(|info| info.closes_loop))
            .collect()
    }

    /// Returns the edges entering a node other than its back-edges.
    pub fn forward_incoming(&self, id: &NodeId) -> Vec<EdgeIndex> {
        self.incoming(id)
            .into_iter()
            .filter(|&e| self.edge(e).is_some_and(|info| !info.closes_loop))
            .collect()
    }

    /// Returns the body of a loop node.
    pub fn loop_body(&self, id: &NodeId) -> Option<&HashSet<NodeId>> {
        self.loop_bodies.get(id)
    }

    /// Returns nodes without incoming edges, ignoring back-edges.
    pub fn roots(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| {
                self.incoming(id)
                    .into_iter()
                    .all(|e| self.edge(e).is_some_and(|info| info.closes_loop))
            })
            .cloned()
            .collect()
    }

    /// Returns whether a node has no downstream nodes outside its own loop body.
    pub fn is_sink(&self, id: &NodeId) -> bool {
        self.outgoing(id)
            .into_iter()
            .all(|e| self.edge(e).is_some_and(|info| info.role == EdgeRole::LoopBody))
    }

    /// Resolves the entry nodes of runs started by the trigger.
    ///
    /// Pinned `config.nodeId(s)` win; otherwise webhook triggers enter at
    /// webhook nodes and every other trigger at the root nodes.
    pub fn entry_nodes(&self, trigger: &TriggerConfig) -> Vec<NodeId> {
        if let Some(pinned) = trigger.entry_nodes() {
            return pinned
                .into_iter()
                .filter(|id| self.nodes.contains_key(id))
                .collect();
        }

        if trigger.trigger_type == TriggerType::Webhook {
            let webhooks: Vec<NodeId> = self
                .order
                .iter()
                .filter(|id| {
                    self.nodes
                        .get(*id)
                        .is_some_and(|n| matches!(n.kind, NodeKind::Webhook(_)))
                })
                .cloned()
                .collect();
            if !webhooks.is_empty() {
                return webhooks;
            }
        }

        self.roots()
    }

    /// Returns every node reachable from the given starts, starts included.
    pub fn reachable_from<'a>(
        &self,
        starts: impl IntoIterator<Item = &'a NodeId>,
    ) -> HashSet<NodeId> {
        let starts: Vec<NodeIndex> = starts
            .into_iter()
            .filter_map(|id| self.node_indices.get(id).copied())
            .collect();

        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = starts.into();
        while let Some(index) = queue.pop_front() {
            if !seen.insert(index) {
                continue;
            }
            queue.extend(self.graph.neighbors_directed(index, Direction::Outgoing));
        }

        seen.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// Detects cycles formed by edges other than loop back-edges.
    ///
    /// Returns the node closing each detected cycle, in discovery order.
    pub fn find_cycles(&self) -> Vec<NodeId> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        fn dfs(
            graph: &WorkflowGraph,
            node: NodeIndex,
            states: &mut HashMap<NodeIndex, State>,
            found: &mut Vec<NodeId>,
        ) {
            states.insert(node, State::Visiting);

            let mut edges: Vec<_> = graph
                .graph
                .edges_directed(node, Direction::Outgoing)
                .filter(|e| !e.weight().closes_loop)
                .map(|e| (e.id(), e.target()))
                .collect();
            edges.sort();

            for (_, target) in edges {
                match states.get(&target).copied().unwrap_or(State::Unvisited) {
                    State::Visiting => {
                        let id = graph.graph[target].clone();
                        if !found.contains(&id) {
                            found.push(id);
                        }
                    }
                    State::Unvisited => dfs(graph, target, states, found),
                    State::Visited => {}
                }
            }

            states.insert(node, State::Visited);
        }

        let mut states = HashMap::new();
        let mut found = Vec::new();
        for id in &self.order {
            let Some(&index) = self.node_indices.get(id) else {
                continue;
            };
            if states.get(&index).copied().unwrap_or(State::Unvisited) == State::Unvisited {
                dfs(self, index, &mut states, &mut found);
            }
        }

        found
    }
}

fn is_body_handle(handle: Option<&str>) -> bool {
    handle.is_some_and(|h| LOOP_BODY_HANDLES.contains(&h))
}

//! Node and edge bookkeeping of one run.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::EdgeIndex;

use crate::definition::NodeId;
use crate::graph::{EdgeRole, WorkflowGraph};
use crate::registry::Route;

/// Scheduling state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Waiting,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Resolution of an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum EdgeState {
    #[default]
    Pending,
    /// Taken by its source.
    Active,
    /// Not taken, or its source was skipped.
    Dead,
    /// Its source failed.
    Failed,
}

/// Outcome of the join rule over a set of edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Join {
    Pending,
    Taken,
    Dead,
    Failed,
}

/// Tracks which nodes may run next.
///
/// A node becomes ready once every incoming edge other than a loop
/// back-edge is resolved and at least one of them was taken. If any of them
/// carries an upstream failure, or none was taken, the node is skipped and
/// the resolution flows on through its outgoing edges.
///
/// A loop that continues resets its body and waits for its back-edges: a
/// taken back-edge runs the loop node again, while a body that never returns
/// ends the loop as if it had exited.
#[derive(Debug)]
pub(crate) struct Frontier<'g> {
    graph: &'g WorkflowGraph,
    nodes: HashMap<NodeId, NodeState>,
    edges: HashMap<EdgeIndex, EdgeState>,
    ready: VecDeque<NodeId>,
    iterating: HashSet<NodeId>,
    skipped: Vec<NodeId>,
    finished_loops: Vec<NodeId>,
}

impl<'g> Frontier<'g> {
    /// Seeds the frontier with the entry nodes. Nodes no entry reaches are
    /// skipped up front.
    pub fn new(graph: &'g WorkflowGraph, entries: &[NodeId]) -> Self {
        let mut frontier = Self {
            graph,
            nodes: graph
                .node_ids()
                .map(|id| (id.clone(), NodeState::Waiting))
                .collect(),
            edges: HashMap::new(),
            ready: VecDeque::new(),
            iterating: HashSet::new(),
            skipped: Vec::new(),
            finished_loops: Vec::new(),
        };

        let reachable = graph.reachable_from(entries);
        for id in graph.node_ids() {
            if reachable.contains(id) {
                continue;
            }
            frontier.nodes.insert(id.clone(), NodeState::Skipped);
            frontier.skipped.push(id.clone());
            for edge in graph.outgoing(id) {
                frontier.edges.insert(edge, EdgeState::Dead);
            }
        }

        for id in entries {
            if frontier.state(id) == Some(NodeState::Waiting) {
                frontier.mark_ready(id);
            }
        }

        frontier
    }

    /// Returns the state of a node.
    pub fn state(&self, id: &NodeId) -> Option<NodeState> {
        self.nodes.get(id).copied()
    }

    /// Takes the next ready node and marks it running.
    pub fn pop_ready(&mut self) -> Option<NodeId> {
        while let Some(id) = self.ready.pop_front() {
            if self.state(&id) == Some(NodeState::Ready) {
                self.nodes.insert(id.clone(), NodeState::Running);
                return Some(id);
            }
        }
        None
    }

    /// Returns the sources of the taken edges feeding a node, in edge order.
    pub fn active_sources(&self, id: &NodeId) -> Vec<NodeId> {
        let mut sources: Vec<NodeId> = Vec::new();
        for edge in self.forward_incoming(id) {
            if self.edge_state(edge) != EdgeState::Active {
                continue;
            }
            if let Some((source, _)) = self.graph.endpoints(edge)
                && !sources.contains(source)
            {
                sources.push(source.clone());
            }
        }
        sources
    }

    /// Records a completed node and resolves its outgoing edges by route.
    pub fn succeed(&mut self, id: &NodeId, route: &Route) {
        self.nodes.insert(id.clone(), NodeState::Succeeded);

        match route {
            Route::Default => {
                for edge in self.graph.outgoing(id) {
                    self.resolve(edge, EdgeState::Active);
                }
            }
            Route::Branch { handles, matched } => {
                for edge in self.graph.outgoing(id) {
                    let taken = match self.graph.edge(edge).and_then(|e| e.handle.as_deref()) {
                        Some(handle) => handles.iter().any(|h| h == handle),
                        None => *matched,
                    };
                    let state = if taken { EdgeState::Active } else { EdgeState::Dead };
                    self.resolve(edge, state);
                }
            }
            Route::LoopContinue => self.enter_body(id),
            Route::LoopExit => self.exit_loop(id),
        }
    }

    /// Records a terminal failure; everything downstream is skipped.
    pub fn fail(&mut self, id: &NodeId) {
        self.iterating.remove(id);
        self.nodes.insert(id.clone(), NodeState::Failed);
        self.propagate(id, EdgeState::Failed);
    }

    /// Drains the nodes skipped since the last call.
    pub fn take_skipped(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.skipped)
    }

    /// Drains the loops that ended without their node running again.
    pub fn take_finished_loops(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.finished_loops)
    }

    fn edge_state(&self, edge: EdgeIndex) -> EdgeState {
        self.edges.get(&edge).copied().unwrap_or_default()
    }

    fn forward_incoming(&self, id: &NodeId) -> Vec<EdgeIndex> {
        self.graph.forward_incoming(id)
    }

    fn join(&self, edges: &[EdgeIndex]) -> Join {
        let states: Vec<EdgeState> = edges.iter().map(|&e| self.edge_state(e)).collect();
        if states.contains(&EdgeState::Pending) {
            Join::Pending
        } else if states.contains(&EdgeState::Failed) {
            Join::Failed
        } else if states.contains(&EdgeState::Active) {
            Join::Taken
        } else {
            Join::Dead
        }
    }

    fn mark_ready(&mut self, id: &NodeId) {
        self.nodes.insert(id.clone(), NodeState::Ready);
        self.ready.push_back(id.clone());
    }

    fn resolve(&mut self, edge: EdgeIndex, state: EdgeState) {
        self.edges.insert(edge, state);
        if let Some((_, target)) = self.graph.endpoints(edge) {
            let target = target.clone();
            self.evaluate(&target);
        }
    }

    fn propagate(&mut self, id: &NodeId, state: EdgeState) {
        for edge in self.graph.outgoing(id) {
            self.resolve(edge, state);
        }
    }

    fn skip(&mut self, id: &NodeId, state: EdgeState) {
        self.nodes.insert(id.clone(), NodeState::Skipped);
        self.skipped.push(id.clone());
        self.propagate(id, state);
    }

    fn evaluate(&mut self, id: &NodeId) {
        if self.iterating.contains(id) {
            let back_edges = self.graph.back_edges(id);
            match self.join(&back_edges) {
                Join::Pending => {}
                Join::Taken => self.mark_ready(id),
                Join::Dead => {
                    self.iterating.remove(id);
                    self.finished_loops.push(id.clone());
                    self.resolve_exits(id, EdgeState::Active);
                }
                Join::Failed => {
                    self.iterating.remove(id);
                    self.finished_loops.push(id.clone());
                    self.nodes.insert(id.clone(), NodeState::Failed);
                    self.resolve_exits(id, EdgeState::Failed);
                }
            }
            return;
        }

        if self.state(id) != Some(NodeState::Waiting) {
            return;
        }

        let incoming = self.forward_incoming(id);
        match self.join(&incoming) {
            Join::Pending => {}
            Join::Taken => self.mark_ready(id),
            Join::Dead => self.skip(id, EdgeState::Dead),
            Join::Failed => self.skip(id, EdgeState::Failed),
        }
    }

    fn enter_body(&mut self, id: &NodeId) {
        self.iterating.insert(id.clone());

        if let Some(body) = self.graph.loop_body(id) {
            for node in body {
                self.nodes.insert(node.clone(), NodeState::Waiting);
                self.iterating.remove(node);
            }
            for node in body {
                for edge in self.graph.outgoing(node) {
                    let inside = self
                        .graph
                        .endpoints(edge)
                        .is_some_and(|(_, target)| target == id || body.contains(target));
                    if inside {
                        self.edges.insert(edge, EdgeState::Pending);
                    }
                }
            }
        }

        for edge in self.graph.outgoing_with_role(id, EdgeRole::LoopBody) {
            self.resolve(edge, EdgeState::Active);
        }
    }

    fn exit_loop(&mut self, id: &NodeId) {
        self.iterating.remove(id);
        for edge in self.graph.outgoing_with_role(id, EdgeRole::LoopBody) {
            if self.edge_state(edge) == EdgeState::Pending {
                self.resolve(edge, EdgeState::Dead);
            }
        }
        self.resolve_exits(id, EdgeState::Active);
    }

    fn resolve_exits(&mut self, id: &NodeId, state: EdgeState) {
        for edge in self.graph.outgoing_with_role(id, EdgeRole::LoopExit) {
            self.resolve(edge, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        ComparisonOperator, Condition, ConditionData, Edge, LoopData, Node, TransformData,
        Workflow,
    };

    fn step(id: &str) -> Node {
        Node::new(id, TransformData::new())
    }

    fn ids(values: &[&str]) -> Vec<NodeId> {
        values.iter().map(|v| NodeId::from(*v)).collect()
    }

    fn drain(frontier: &mut Frontier<'_>) -> Vec<NodeId> {
        std::iter::from_fn(|| frontier.pop_ready()).collect()
    }

    #[test]
    fn test_join_waits_for_every_branch() {
        let workflow = Workflow::new("wf", "join")
            .with_node(step("a"))
            .with_node(step("b"))
            .with_node(step("c"))
            .with_node(step("d"))
            .with_edge(Edge::new("e1", "a", "b"))
            .with_edge(Edge::new("e2", "a", "c"))
            .with_edge(Edge::new("e3", "b", "d"))
            .with_edge(Edge::new("e4", "c", "d"));
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["a"]));

        assert_eq!(drain(&mut frontier), ids(&["a"]));
        frontier.succeed(&"a".into(), &Route::Default);
        assert_eq!(drain(&mut frontier), ids(&["b", "c"]));

        frontier.succeed(&"b".into(), &Route::Default);
        assert!(drain(&mut frontier).is_empty());
        frontier.succeed(&"c".into(), &Route::Default);
        assert_eq!(drain(&mut frontier), ids(&["d"]));
        assert_eq!(frontier.active_sources(&"d".into()), ids(&["b", "c"]));
    }

    #[test]
    fn test_untaken_branch_is_skipped() {
        let condition = ConditionData::if_else(vec![Condition::new(
            "big",
            "input.n",
            ComparisonOperator::GreaterThan,
            5,
        )]);
        let workflow = Workflow::new("wf", "branch")
            .with_node(Node::new("check", condition))
            .with_node(step("yes"))
            .with_node(step("no"))
            .with_node(step("after"))
            .with_edge(Edge::new("e1", "check", "yes").with_source_handle("true"))
            .with_edge(Edge::new("e2", "check", "no").with_source_handle("false"))
            .with_edge(Edge::new("e3", "no", "after"));
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["check"]));

        drain(&mut frontier);
        let route = Route::Branch {
            handles: vec!["big".into(), "true".into()],
            matched: true,
        };
        frontier.succeed(&"check".into(), &route);

        assert_eq!(drain(&mut frontier), ids(&["yes"]));
        assert_eq!(frontier.take_skipped(), ids(&["no", "after"]));
    }

    #[test]
    fn test_unlabelled_edge_follows_only_a_match() {
        let workflow = Workflow::new("wf", "unlabelled")
            .with_node(step("check"))
            .with_node(step("next"))
            .with_edge(Edge::new("e1", "check", "next"));
        let graph = WorkflowGraph::new(&workflow);

        let mut frontier = Frontier::new(&graph, &ids(&["check"]));
        drain(&mut frontier);
        let route = Route::Branch {
            handles: vec!["false".into()],
            matched: false,
        };
        frontier.succeed(&"check".into(), &route);
        assert_eq!(frontier.take_skipped(), ids(&["next"]));

        let mut frontier = Frontier::new(&graph, &ids(&["check"]));
        drain(&mut frontier);
        let route = Route::Branch {
            handles: vec!["true".into()],
            matched: true,
        };
        frontier.succeed(&"check".into(), &route);
        assert_eq!(drain(&mut frontier), ids(&["next"]));
    }

    #[test]
    fn test_failure_skips_downstream_only() {
        let workflow = Workflow::new("wf", "failure")
            .with_node(step("a"))
            .with_node(step("b"))
            .with_node(step("c"))
            .with_node(step("d"))
            .with_edge(Edge::new("e1", "a", "b"))
            .with_edge(Edge::new("e2", "b", "d"))
            .with_edge(Edge::new("e3", "c", "d"));
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["a", "c"]));

        assert_eq!(drain(&mut frontier), ids(&["a", "c"]));
        frontier.fail(&"a".into());
        assert_eq!(frontier.take_skipped(), ids(&["b"]));

        frontier.succeed(&"c".into(), &Route::Default);
        assert_eq!(frontier.take_skipped(), ids(&["d"]));
        assert_eq!(frontier.state(&"d".into()), Some(NodeState::Skipped));
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let workflow = Workflow::new("wf", "islands")
            .with_node(step("a"))
            .with_node(step("island"))
            .with_node(step("b"))
            .with_edge(Edge::new("e1", "a", "b"))
            .with_edge(Edge::new("e2", "island", "b"));
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["a"]));

        assert_eq!(frontier.take_skipped(), ids(&["island"]));
        drain(&mut frontier);
        frontier.succeed(&"a".into(), &Route::Default);
        assert_eq!(drain(&mut frontier), ids(&["b"]));
    }

    fn loop_workflow() -> Workflow {
        Workflow::new("wf", "loop")
            .with_node(Node::new("each", LoopData::counted(2)))
            .with_node(step("body"))
            .with_node(step("after"))
            .with_edge(Edge::new("e1", "each", "body").with_source_handle("body"))
            .with_edge(Edge::new("e2", "body", "each"))
            .with_edge(Edge::new("e3", "each", "after").with_source_handle("exit"))
    }

    #[test]
    fn test_loop_reenters_body_until_exit() {
        let workflow = loop_workflow();
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["each"]));

        for _ in 0..2 {
            assert_eq!(drain(&mut frontier), ids(&["each"]));
            frontier.succeed(&"each".into(), &Route::LoopContinue);
            assert_eq!(drain(&mut frontier), ids(&["body"]));
            frontier.succeed(&"body".into(), &Route::Default);
        }

        assert_eq!(drain(&mut frontier), ids(&["each"]));
        frontier.succeed(&"each".into(), &Route::LoopExit);
        assert_eq!(drain(&mut frontier), ids(&["after"]));
        assert!(frontier.take_skipped().is_empty());
    }

    #[test]
    fn test_empty_loop_skips_body() {
        let workflow = loop_workflow();
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["each"]));

        drain(&mut frontier);
        frontier.succeed(&"each".into(), &Route::LoopExit);

        assert_eq!(frontier.take_skipped(), ids(&["body"]));
        assert_eq!(drain(&mut frontier), ids(&["after"]));
    }

    #[test]
    fn test_nested_loop_exit_runs_outer_loop_again() {
        let workflow = Workflow::new("wf", "nested")
            .with_node(Node::new("outer", LoopData::counted(2)))
            .with_node(Node::new("inner", LoopData::counted(1)))
            .with_node(step("body"))
            .with_node(step("after"))
            .with_edge(Edge::new("e1", "outer", "inner").with_source_handle("body"))
            .with_edge(Edge::new("e2", "inner", "body").with_source_handle("body"))
            .with_edge(Edge::new("e3", "body", "inner"))
            .with_edge(Edge::new("e4", "inner", "outer").with_source_handle("exit"))
            .with_edge(Edge::new("e5", "outer", "after").with_source_handle("exit"));
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["outer"]));

        for _ in 0..2 {
            assert_eq!(drain(&mut frontier), ids(&["outer"]));
            frontier.succeed(&"outer".into(), &Route::LoopContinue);
            assert_eq!(drain(&mut frontier), ids(&["inner"]));
            frontier.succeed(&"inner".into(), &Route::LoopContinue);
            assert_eq!(drain(&mut frontier), ids(&["body"]));
            frontier.succeed(&"body".into(), &Route::Default);
            assert_eq!(drain(&mut frontier), ids(&["inner"]));
            frontier.succeed(&"inner".into(), &Route::LoopExit);
        }

        assert_eq!(drain(&mut frontier), ids(&["outer"]));
        frontier.succeed(&"outer".into(), &Route::LoopExit);
        assert_eq!(drain(&mut frontier), ids(&["after"]));
        assert!(frontier.take_skipped().is_empty());
    }

    #[test]
    fn test_failed_body_fails_loop_exits() {
        let workflow = loop_workflow();
        let graph = WorkflowGraph::new(&workflow);
        let mut frontier = Frontier::new(&graph, &ids(&["each"]));

        drain(&mut frontier);
        frontier.succeed(&"each".into(), &Route::LoopContinue);
        drain(&mut frontier);
        frontier.fail(&"body".into());

        assert_eq!(frontier.state(&"each".into()), Some(NodeState::Failed));
        assert_eq!(frontier.take_skipped(), ids(&["after"]));
        assert_eq!(frontier.take_finished_loops(), ids(&["each"]));
    }
}

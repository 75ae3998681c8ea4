//! The mark-to-fixed-point driver.
//!
//! A work queue drains newly marked nodes; conditional edges are indexed by
//! trigger from both directions; dynamic producers are re-run against the
//! monotone marked view until everything quiesces in a full pass with no
//! additions.

use std::collections::{HashMap, VecDeque};

use log::debug;
use petgraph::dot::Dot;

use crate::graph::node::{Edge, NodeId};
use crate::nodes::NodeFactory;

/// How much edge provenance to retain for diagnostics.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DependencyTrackingLevel {
    #[default]
    None,
    FirstEdge,
    All,
}

pub struct DependencyGraph<'f> {
    factory: &'f NodeFactory,
    tracking: DependencyTrackingLevel,
    marked: Vec<NodeId>,
    marked_flags: Vec<bool>,
    queue: VecDeque<NodeId>,
    /// Registered conditional edges waiting for their trigger, keyed by it.
    pending_conditional: HashMap<NodeId, Vec<(NodeId, &'static str, NodeId)>>,
    dynamic_nodes: Vec<(NodeId, usize)>,
    provenance: HashMap<NodeId, Vec<(NodeId, &'static str)>>,
    roots: Vec<(NodeId, String)>,
}

impl<'f> DependencyGraph<'f> {
    pub fn new(factory: &'f NodeFactory, tracking: DependencyTrackingLevel) -> Self {
        DependencyGraph {
            factory,
            tracking,
            marked: Vec::new(),
            marked_flags: Vec::new(),
            queue: VecDeque::new(),
            pending_conditional: HashMap::new(),
            dynamic_nodes: Vec::new(),
            provenance: HashMap::new(),
            roots: Vec::new(),
        }
    }

    pub fn factory(&self) -> &NodeFactory {
        self.factory
    }

    pub fn add_root(&mut self, node: NodeId, reason: &str) {
        self.roots.push((node, reason.to_string()));
        self.mark(node, None);
    }

    pub fn roots(&self) -> &[(NodeId, String)] {
        &self.roots
    }

    pub fn is_marked(&self, node: NodeId) -> bool {
        self.marked_flags
            .get(node.0 as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Ordered, append-only view of the marked set.
    pub fn marked_nodes(&self) -> &[NodeId] {
        &self.marked
    }

    fn record_provenance(&mut self, node: NodeId, parent: NodeId, reason: &'static str) {
        match self.tracking {
            DependencyTrackingLevel::None => {}
            DependencyTrackingLevel::FirstEdge => {
                self.provenance.entry(node).or_insert_with(|| vec![(parent, reason)]);
            }
            DependencyTrackingLevel::All => {
                self.provenance.entry(node).or_default().push((parent, reason));
            }
        }
    }

    /// Marks a node; membership is monotone and the node is queued for
    /// dependency expansion exactly once.
    fn mark(&mut self, node: NodeId, parent: Option<(NodeId, &'static str)>) -> bool {
        if let Some((p, reason)) = parent {
            self.record_provenance(node, p, reason);
        }
        if self.is_marked(node) {
            return false;
        }
        let index = node.0 as usize;
        if index >= self.marked_flags.len() {
            self.marked_flags.resize(index + 1, false);
        }
        self.marked_flags[index] = true;
        self.marked.push(node);
        self.queue.push_back(node);
        self.factory.node(node).on_marked(self.factory);
        // Conditional edges parked on this trigger fire now.
        if let Some(fired) = self.pending_conditional.remove(&node) {
            for (target, reason, origin) in fired {
                self.mark(target, Some((origin, reason)));
            }
        }
        true
    }

    fn process(&mut self, node: NodeId) {
        let n = self.factory.node(node);
        for edge in n.static_dependencies(self.factory) {
            self.mark(edge.target, Some((node, edge.reason)));
        }
        if n.has_conditional_static_dependencies() {
            for ce in n.conditional_static_dependencies(self.factory) {
                if self.is_marked(ce.trigger) {
                    self.mark(ce.target, Some((node, ce.reason)));
                } else {
                    self.pending_conditional
                        .entry(ce.trigger)
                        .or_default()
                        .push((ce.target, ce.reason, node));
                }
            }
        }
        if n.has_dynamic_dependencies() {
            self.dynamic_nodes.push((node, 0));
        }
    }

    /// Runs marking to fixed point.
    pub fn compute_marked_nodes(&mut self) {
        loop {
            while let Some(node) = self.queue.pop_front() {
                self.process(node);
            }
            let mut added = false;
            let snapshot_len = self.marked.len();
            for i in 0..self.dynamic_nodes.len() {
                let (node, cursor) = self.dynamic_nodes[i];
                let n = self.factory.node(node);
                let marked_view = self.marked[..snapshot_len].to_vec();
                let edges: Vec<Edge> =
                    n.search_dynamic_dependencies(&marked_view, cursor, self.factory);
                self.dynamic_nodes[i].1 = snapshot_len;
                for edge in edges {
                    if self.mark(edge.target, Some((node, edge.reason))) {
                        added = true;
                    }
                }
            }
            if self.queue.is_empty() && !added {
                break;
            }
        }
        debug!(
            "dependency graph quiesced with {} marked nodes",
            self.marked.len()
        );
    }

    /// First-parent chain from a node back to a root, most recent first.
    /// Empty when tracking was off.
    pub fn predecessor_chain(&self, node: NodeId) -> Vec<(NodeId, &'static str)> {
        let mut chain = Vec::new();
        let mut cur = node;
        while let Some(parents) = self.provenance.get(&cur) {
            let (parent, reason) = parents[0];
            chain.push((parent, reason));
            if chain.len() > self.marked.len() {
                break;
            }
            cur = parent;
        }
        chain
    }

    /// Human-readable predecessor chain for diagnostics.
    pub fn describe_chain(&self, node: NodeId) -> String {
        let mut out = self.factory.node_name(node);
        for (parent, reason) in self.predecessor_chain(node) {
            out.push_str(&format!(
                "\n  <- {} ({})",
                self.factory.node_name(parent),
                reason
            ));
        }
        out
    }

    /// Graphviz DOT rendering of the recorded edges.
    pub fn to_dot(&self) -> String {
        let mut g = petgraph::Graph::<String, &'static str>::new();
        let mut indices = HashMap::new();
        for &n in &self.marked {
            let idx = g.add_node(self.factory.node_name(n));
            indices.insert(n, idx);
        }
        for (&child, parents) in &self.provenance {
            for &(parent, reason) in parents {
                if let (Some(&p), Some(&c)) = (indices.get(&parent), indices.get(&child)) {
                    g.add_edge(p, c, reason);
                }
            }
        }
        format!("{}", Dot::with_config(&g, &[]))
    }
}

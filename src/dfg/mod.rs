//! The dataflow graph extracted from a tile-level configuration.
//!
//! A `Dfg` is a directed graph of named operation nodes over a petgraph
//! `StableDiGraph`, with a name index, an ordered list of recurrence
//! edges (loop-carried back-edges the topological sort ignores), and a
//! deterministic Kahn sort that breaks undeclared cycles instead of
//! failing.

pub mod reader;
pub mod toys;

use std::collections::BTreeMap;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::diagnostic::{Diagnostic, Span};
use crate::params::{DvfsMode, OpClass};

/// A single tile operation.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub op: OpClass,
    pub voltage: f64,
    pub period: f64,
}

impl Node {
    pub fn new(name: impl Into<String>, op: OpClass, mode: DvfsMode) -> Self {
        Self {
            name: name.into(),
            op,
            voltage: mode.voltage(),
            period: mode.period(),
        }
    }

    pub fn set_mode(&mut self, mode: DvfsMode) {
        self.voltage = mode.voltage();
        self.period = mode.period();
    }

    /// Set the operating point from a voltage. The period follows from the
    /// mode table; a voltage outside the table is a configuration error.
    pub fn set_voltage(&mut self, v: f64) -> Result<(), Diagnostic> {
        match DvfsMode::from_voltage(v) {
            Some(mode) => {
                self.set_mode(mode);
                Ok(())
            }
            None => Err(Diagnostic::error(
                format!("voltage {} is not a DVFS mode voltage", v),
                Span::dummy(),
            )
            .with_note(format!("node '{}'", self.name))
            .with_help("expected one of 0.61, 0.90, 1.23".to_string())),
        }
    }
}

/// Whether an edge carries ordinary dataflow or a loop-carried dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Data,
    Recurrence,
}

/// Directed multi-graph of named nodes. Duplicate edges collapse to one;
/// adjacency is kept symmetric by construction.
#[derive(Clone, Debug, Default)]
pub struct Dfg {
    graph: StableDiGraph<Node, EdgeKind>,
    index: BTreeMap<String, NodeIndex>,
    recurrences: Vec<(String, String)>,
}

impl Dfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeIndex, Diagnostic> {
        if self.index.contains_key(&node.name) {
            return Err(Diagnostic::error(
                format!("duplicate node name '{}'", node.name),
                Span::dummy(),
            ));
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        Ok(idx)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get_node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.graph[i])
    }

    pub fn get_node_mut(&mut self, name: &str) -> Option<&mut Node> {
        let idx = *self.index.get(name)?;
        Some(&mut self.graph[idx])
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn delete_node(&mut self, name: &str) -> Result<(), Diagnostic> {
        let idx = self.resolve(name)?;
        self.graph.remove_node(idx);
        self.index.remove(name);
        self.recurrences
            .retain(|(u, v)| u != name && v != name);
        Ok(())
    }

    /// Node indices in creation order.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Node names in creation order.
    pub fn node_names(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .map(|i| self.graph[i].name.clone())
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<NodeIndex, Diagnostic> {
        self.index.get(name).copied().ok_or_else(|| {
            Diagnostic::error(format!("unknown node '{}'", name), Span::dummy())
        })
    }

    /// Add an edge u → v. Duplicate edges collapse to the existing entry.
    pub fn connect(&mut self, u: &str, v: &str, recurrence: bool) -> Result<(), Diagnostic> {
        let ui = self.resolve(u)?;
        let vi = self.resolve(v)?;
        if self.graph.find_edge(ui, vi).is_none() {
            let kind = if recurrence {
                EdgeKind::Recurrence
            } else {
                EdgeKind::Data
            };
            self.graph.add_edge(ui, vi, kind);
            if recurrence {
                self.recurrences.push((u.to_string(), v.to_string()));
            }
        }
        Ok(())
    }

    pub fn disconnect(&mut self, u: &str, v: &str) -> Result<(), Diagnostic> {
        let ui = self.resolve(u)?;
        let vi = self.resolve(v)?;
        if let Some(e) = self.graph.find_edge(ui, vi) {
            self.graph.remove_edge(e);
        }
        self.recurrences
            .retain(|(a, b)| !(a == u && b == v));
        Ok(())
    }

    /// Predecessor names of `name`, in a fixed (reverse edge-insertion)
    /// order.
    pub fn get_srcs(&self, name: &str) -> Vec<String> {
        match self.index.get(name) {
            Some(&i) => self
                .graph
                .neighbors_directed(i, Direction::Incoming)
                .map(|p| self.graph[p].name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Successor names of `name`, in a fixed order.
    pub fn get_dsts(&self, name: &str) -> Vec<String> {
        match self.index.get(name) {
            Some(&i) => self
                .graph
                .neighbors_directed(i, Direction::Outgoing)
                .map(|s| self.graph[s].name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn edge_kind(&self, e: EdgeIndex) -> EdgeKind {
        self.graph[e]
    }

    pub fn edge_endpoints(&self, e: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(e)
    }

    pub fn all_edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    /// Incoming (src, edge) pairs of a node, sorted by source index.
    pub fn fanin(&self, idx: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut v: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.id()))
            .collect();
        v.sort();
        v
    }

    /// Outgoing (dst, edge) pairs of a node, sorted by destination index.
    pub fn fanout(&self, idx: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut v: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.id()))
            .collect();
        v.sort();
        v
    }

    /// The declared recurrence edges, in declaration order.
    pub fn recurrence_edges(&self) -> &[(String, String)] {
        &self.recurrences
    }

    /// Nodes with no non-recurrence predecessors, in creation order. A loop
    /// header fed only by its back-edge counts as a live-in; it is the
    /// graph's token source.
    pub fn get_liveins(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&i| {
                self.graph
                    .edges_directed(i, Direction::Incoming)
                    .all(|e| *e.weight() == EdgeKind::Recurrence)
            })
            .collect()
    }

    /// Nodes with no non-recurrence successors, in creation order.
    pub fn get_liveouts(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&i| {
                self.graph
                    .edges_directed(i, Direction::Outgoing)
                    .all(|e| *e.weight() == EdgeKind::Recurrence)
            })
            .collect()
    }

    /// Kahn topological sort with recurrence edges pre-removed.
    ///
    /// If the ready set runs dry while nodes remain (an undeclared cycle),
    /// the last incoming edge of the first remaining node is severed on
    /// the working copy and a warning is printed; the sort then continues.
    /// Breaking is bounded by the edge count, so pathological inputs fail
    /// with an error instead of spinning.
    pub fn topological_sort(&self) -> Result<Vec<NodeIndex>, Diagnostic> {
        let mut preds: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();
        for i in self.graph.node_indices() {
            let mut ps: Vec<NodeIndex> = self
                .graph
                .edges_directed(i, Direction::Incoming)
                .filter(|e| *e.weight() == EdgeKind::Data)
                .map(|e| e.source())
                .collect();
            ps.sort();
            preds.insert(i, ps);
        }

        let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut breaks_left = self.graph.edge_count() + 1;

        while !remaining.is_empty() {
            let ready: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|i| preds[i].is_empty())
                .collect();

            if ready.is_empty() {
                if breaks_left == 0 {
                    return Err(Diagnostic::error(
                        "topological sort failed to converge".to_string(),
                        Span::dummy(),
                    )
                    .with_note(format!("{} nodes still cyclic", remaining.len())));
                }
                breaks_left -= 1;
                let victim = remaining[0];
                let broken = preds
                    .get_mut(&victim)
                    .and_then(|ps| ps.pop())
                    .expect("frontier node with empty ready set has a predecessor");
                Diagnostic::warning(
                    format!(
                        "undeclared cycle: breaking edge {} -> {}",
                        self.graph[broken].name, self.graph[victim].name
                    ),
                    Span::dummy(),
                )
                .with_help("declare the loop-carried edge as a recurrence".to_string())
                .emit();
                continue;
            }

            for &i in &ready {
                order.push(i);
            }
            remaining.retain(|i| !ready.contains(i));
            for ps in preds.values_mut() {
                ps.retain(|p| !ready.contains(p));
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(name: &str) -> Node {
        Node::new(name, OpClass::Mul, DvfsMode::Nominal)
    }

    fn chain4() -> Dfg {
        let mut g = Dfg::new();
        for name in ["s", "a", "b", "t"] {
            g.add_node(n(name)).unwrap();
        }
        g.connect("s", "a", false).unwrap();
        g.connect("a", "b", false).unwrap();
        g.connect("b", "t", false).unwrap();
        g
    }

    #[test]
    fn test_adjacency_symmetry() {
        let g = chain4();
        for name in g.node_names() {
            for src in g.get_srcs(&name) {
                assert!(g.get_dsts(&src).contains(&name));
            }
            for dst in g.get_dsts(&name) {
                assert!(g.get_srcs(&dst).contains(&name));
            }
        }
    }

    #[test]
    fn test_duplicate_edge_collapses() {
        let mut g = chain4();
        g.connect("s", "a", false).unwrap();
        g.connect("s", "a", false).unwrap();
        assert_eq!(g.get_srcs("a").len(), 1);
        assert_eq!(g.get_dsts("s").len(), 1);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut g = chain4();
        assert!(g.add_node(n("s")).is_err());
    }

    #[test]
    fn test_disconnect_removes_both_directions() {
        let mut g = chain4();
        g.disconnect("a", "b").unwrap();
        assert!(g.get_dsts("a").is_empty());
        assert!(g.get_srcs("b").is_empty());
    }

    #[test]
    fn test_delete_node_prunes_edges() {
        let mut g = chain4();
        g.delete_node("b").unwrap();
        assert!(g.get_node("b").is_none());
        assert!(g.get_dsts("a").is_empty());
        assert!(g.get_srcs("t").is_empty());
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_liveins_liveouts() {
        let g = chain4();
        let ins: Vec<_> = g.get_liveins().iter().map(|&i| g.node(i).name.clone()).collect();
        let outs: Vec<_> = g.get_liveouts().iter().map(|&i| g.node(i).name.clone()).collect();
        assert_eq!(ins, ["s"]);
        assert_eq!(outs, ["t"]);
    }

    #[test]
    fn test_recurrence_ignored_for_liveness() {
        let mut g = chain4();
        g.connect("t", "s", true).unwrap();
        let ins: Vec<_> = g.get_liveins().iter().map(|&i| g.node(i).name.clone()).collect();
        let outs: Vec<_> = g.get_liveouts().iter().map(|&i| g.node(i).name.clone()).collect();
        assert_eq!(ins, ["s"]);
        assert_eq!(outs, ["t"]);
        assert_eq!(
            g.recurrence_edges().to_vec(),
            vec![("t".to_string(), "s".to_string())]
        );
    }

    #[test]
    fn test_topological_sort_chain() {
        let g = chain4();
        let order = g.topological_sort().unwrap();
        let names: Vec<_> = order.iter().map(|&i| g.node(i).name.clone()).collect();
        assert_eq!(names, ["s", "a", "b", "t"]);
    }

    #[test]
    fn test_topological_sort_ignores_recurrence() {
        let mut g = chain4();
        g.connect("t", "s", true).unwrap();
        let order = g.topological_sort().unwrap();
        let names: Vec<_> = order.iter().map(|&i| g.node(i).name.clone()).collect();
        assert_eq!(names, ["s", "a", "b", "t"]);
    }

    #[test]
    fn test_topological_sort_completeness() {
        let mut g = chain4();
        g.connect("s", "b", false).unwrap();
        let order = g.topological_sort().unwrap();
        assert_eq!(order.len(), g.len());
        let pos =
            |name: &str| order.iter().position(|&i| g.node(i).name == name).unwrap();
        assert!(pos("s") < pos("a"));
        assert!(pos("a") < pos("b"));
        assert!(pos("s") < pos("b"));
        assert!(pos("b") < pos("t"));
    }

    #[test]
    fn test_undeclared_cycle_broken() {
        let mut g = chain4();
        // b -> a closes a cycle nobody declared
        g.connect("b", "a", false).unwrap();
        let order = g.topological_sort().unwrap();
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_set_voltage_table_only() {
        let mut node = n("x");
        node.set_voltage(0.61).unwrap();
        assert_eq!(node.period, 3.00);
        node.set_voltage(1.23).unwrap();
        assert_eq!(node.period, 0.66);
        assert!(node.set_voltage(0.75).is_err());
    }
}

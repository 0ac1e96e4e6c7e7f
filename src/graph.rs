//! Directed dependency graph over JSON pointer strings.
//!
//! An edge `from -> to` reads "`from` depends on `to`": the value at `from` is copied from `to`
//! once `to` is settled. Cycles are legal. Every query terminates on cyclic input and
//! [`PointerGraph::topological_order`] degrades to discovery order for nodes on a cycle instead of
//! failing.
//!
//! Nodes are also indexed by their decoded path, so the nodes inside a sub-tree are found with one
//! range scan.

use petgraph::{
    algo::has_path_connecting,
    graph::{DiGraph, NodeIndex},
    visit::{depth_first_search, Control, DfsEvent, Reversed},
};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
};

use crate::pointer::{pointer_to_path, starts_with};

#[derive(Debug, Clone)]
struct PointerNode {
    pointer: String,
    /// `None` when the pointer does not parse.
    path: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PointerGraph {
    graph: DiGraph<PointerNode, ()>,
    index: HashMap<String, NodeIndex>,
    paths: BTreeMap<Vec<String>, NodeIndex>,
}

impl PointerGraph {
    pub fn new() -> Self {
        PointerGraph::default()
    }

    /// Idempotent.
    pub fn add_node(&mut self, node: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(node) {
            return *idx;
        }
        let path = pointer_to_path(node).ok();
        let idx = self.graph.add_node(PointerNode {
            pointer: node.to_string(),
            path: path.clone(),
        });
        self.index.insert(node.to_string(), idx);
        if let Some(path) = path {
            self.paths.entry(path).or_insert(idx);
        }
        idx
    }

    pub fn has_node(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    /// Record that `from` depends on `to`, creating either node if needed. Duplicate edges are
    /// ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].pointer.as_str())
    }

    /// The decoded path of `node`.
    pub fn path_of(&self, node: &str) -> Option<&[String]> {
        let idx = self.index.get(node)?;
        self.graph[*idx].path.as_deref()
    }

    /// Nodes at or below `prefix`, in path order.
    pub fn nodes_within<'a>(&'a self, prefix: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        self.indices_within(prefix)
            .map(|idx| self.graph[idx].pointer.as_str())
    }

    fn indices_within<'a>(&'a self, prefix: &'a [String]) -> impl Iterator<Item = NodeIndex> + 'a {
        self.paths
            .range::<[String], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(path, _)| starts_with(path, prefix))
            .map(|(_, idx)| *idx)
    }

    /// The closest node strictly above `path`.
    pub fn nearest_enclosing(&self, path: &[String]) -> Option<&str> {
        (0..path.len())
            .rev()
            .find_map(|len| self.paths.get(&path[..len]))
            .map(|idx| self.graph[*idx].pointer.as_str())
    }

    /// True when a node reachable from the nodes at or below `within` (those included) has a
    /// path accepted by `accept`.
    pub fn reaches_from_within<F>(&self, within: &[String], mut accept: F) -> bool
    where
        F: FnMut(&[String]) -> bool,
    {
        let starts: Vec<NodeIndex> = self.indices_within(within).collect();
        if starts.is_empty() {
            return false;
        }
        let control = depth_first_search(&self.graph, starts, |event| {
            if let DfsEvent::Discover(idx, _) = event {
                if self.graph[idx].path.as_deref().map_or(false, &mut accept) {
                    return Control::Break(idx);
                }
            }
            Control::Continue
        });
        control.break_value().is_some()
    }

    /// Everything `node` depends on, directly or transitively. Never includes `node` itself.
    pub fn dependencies_of(&self, node: &str) -> Vec<String> {
        let Some(start) = self.index.get(node).copied() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        depth_first_search(&self.graph, Some(start), |event| {
            if let DfsEvent::Discover(idx, _) = event {
                if idx != start {
                    found.push(self.graph[idx].pointer.clone());
                }
            }
        });
        found
    }

    /// Everything depending on `node`, directly or transitively. Never includes `node` itself.
    pub fn dependants_of(&self, node: &str) -> Vec<String> {
        let Some(start) = self.index.get(node).copied() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        depth_first_search(Reversed(&self.graph), Some(start), |event| {
            if let DfsEvent::Discover(idx, _) = event {
                if idx != start {
                    found.push(self.graph[idx].pointer.clone());
                }
            }
        });
        found
    }

    /// True when a chain of edges leads from `from` to `to`.
    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(from_idx), Some(to_idx)) if from_idx != to_idx => {
                has_path_connecting(&self.graph, *from_idx, *to_idx, None)
            }
            _ => false,
        }
    }

    /// Dependencies before dependants.
    ///
    /// Post-order of a depth-first walk seeded with every node in insertion order. Back edges
    /// closing a cycle are skipped, so each node appears exactly once and the order is stable for
    /// a given insertion sequence.
    pub fn topological_order(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        depth_first_search(&self.graph, self.graph.node_indices(), |event| {
            if let DfsEvent::Finish(idx, _) = event {
                order.push(self.graph[idx].pointer.clone());
            }
        });
        order
    }
}

//! Resource-Allocation Graph
//!
//! This module implements the directed graph that records who holds and who
//! waits for which resource. Nodes are processes and resources; an edge
//! `resource -> process` is an *assignment* (the process holds at least one
//! unit) and an edge `process -> resource` is a *request* (the process waits
//! for a unit it has not been granted).
//!
//! # How it works
//!
//! Each edge kind is stored twice so that every mutation, including removing
//! a process with all of its edges, is proportional to the neighbours touched:
//! 1. *Forward maps* (`holders`, `wants`): follow edges in graph direction.
//!    Used by cycle enumeration.
//! 2. *Reverse maps* (`holdings`, `waiters`): follow edges backwards. Used to
//!    clean up a process without iterating the entire graph.
//!
//! The graph holds no counts. Keeping it in lockstep with what each process
//! holds and requests is the engine's job.

use crate::core::graph::cycles::elementary_cycles;
use crate::core::types::{Cycle, Edge, EdgeKind, Node, ProcessId, ResourceId};
use fxhash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Directed graph of assignment and request edges
#[derive(Debug, Clone, Default)]
pub struct AllocationGraph {
    /// Resource -> processes holding it (assignment edges)
    holders: FxHashMap<ResourceId, FxHashSet<ProcessId>>,
    /// Process -> resources it holds (reverse of `holders`)
    holdings: FxHashMap<ProcessId, FxHashSet<ResourceId>>,
    /// Process -> resources it waits for (request edges)
    wants: FxHashMap<ProcessId, FxHashSet<ResourceId>>,
    /// Resource -> processes waiting for it (reverse of `wants`)
    waiters: FxHashMap<ResourceId, FxHashSet<ProcessId>>,
}

impl AllocationGraph {
    /// Create a new empty allocation graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the assignment edge `resource -> process`
    ///
    /// # Returns
    /// `true` if the edge was not present before
    pub fn add_assignment(&mut self, resource: &str, process: &str) -> bool {
        link(&mut self.holders, &mut self.holdings, resource, process)
    }

    /// Remove the assignment edge `resource -> process`
    ///
    /// # Returns
    /// `true` if the edge existed
    pub fn remove_assignment(&mut self, resource: &str, process: &str) -> bool {
        unlink(&mut self.holders, &mut self.holdings, resource, process)
    }

    /// Add the request edge `process -> resource`
    ///
    /// # Returns
    /// `true` if the edge was not present before
    pub fn add_request(&mut self, process: &str, resource: &str) -> bool {
        link(&mut self.wants, &mut self.waiters, process, resource)
    }

    /// Remove the request edge `process -> resource`
    ///
    /// # Returns
    /// `true` if the edge existed
    pub fn remove_request(&mut self, process: &str, resource: &str) -> bool {
        unlink(&mut self.wants, &mut self.waiters, process, resource)
    }

    pub fn has_assignment(&self, resource: &str, process: &str) -> bool {
        self.holders
            .get(resource)
            .is_some_and(|set| set.contains(process))
    }

    pub fn has_request(&self, process: &str, resource: &str) -> bool {
        self.wants
            .get(process)
            .is_some_and(|set| set.contains(resource))
    }

    /// True if the graph contains exactly this edge
    pub fn contains(&self, edge: &Edge) -> bool {
        match edge.kind {
            EdgeKind::Assignment => {
                self.has_assignment(&edge.resource, &edge.process)
            }
            EdgeKind::Request => {
                self.has_request(&edge.process, &edge.resource)
            }
        }
    }

    /// Processes holding `resource`, sorted by name
    pub fn holders_of(&self, resource: &str) -> Vec<&str> {
        sorted(self.holders.get(resource))
    }

    /// Processes waiting for `resource`, sorted by name
    pub fn requesters_of(&self, resource: &str) -> Vec<&str> {
        sorted(self.waiters.get(resource))
    }

    /// Remove all edges for the specified process (both incoming and outgoing)
    ///
    /// # Returns
    /// The removed edges, sorted
    pub fn remove_process(&mut self, process: &str) -> Vec<Edge> {
        let mut removed = Vec::new();

        if let Some(resources) = self.holdings.remove(process) {
            for resource in resources {
                if let Some(set) = self.holders.get_mut(&resource) {
                    set.remove(process);
                    if set.is_empty() {
                        self.holders.remove(&resource);
                    }
                }
                removed.push(Edge::assignment(resource, process));
            }
        }

        if let Some(resources) = self.wants.remove(process) {
            for resource in resources {
                if let Some(set) = self.waiters.get_mut(&resource) {
                    set.remove(process);
                    if set.is_empty() {
                        self.waiters.remove(&resource);
                    }
                }
                removed.push(Edge::request(process, resource));
            }
        }

        removed.sort();
        removed
    }

    /// Every edge of the graph, sorted by kind then endpoints
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .holders
            .iter()
            .flat_map(|(r, ps)| ps.iter().map(move |p| Edge::assignment(r.clone(), p.clone())))
            .chain(
                self.wants.iter().flat_map(|(p, rs)| {
                    rs.iter().map(move |r| Edge::request(p.clone(), r.clone()))
                }),
            )
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.holders.values().map(FxHashSet::len).sum::<usize>()
            + self.wants.values().map(FxHashSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty() && self.wants.is_empty()
    }

    /// Every node touched by at least one edge, sorted
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = BTreeSet::new();
        for (r, ps) in &self.holders {
            nodes.insert(Node::Resource(r.clone()));
            nodes.extend(ps.iter().cloned().map(Node::Process));
        }
        for (p, rs) in &self.wants {
            nodes.insert(Node::Process(p.clone()));
            nodes.extend(rs.iter().cloned().map(Node::Resource));
        }
        nodes.into_iter().collect()
    }

    /// Enumerate all elementary cycles of the current graph
    ///
    /// Each cycle starts at its smallest node, which is always a process since
    /// process nodes order before resource nodes. Cycles are reported in a
    /// deterministic order for a given edge set.
    ///
    /// # Returns
    /// An empty vector when the graph is acyclic
    pub fn find_cycles(&self) -> Vec<Cycle> {
        let nodes = self.nodes();
        let index: FxHashMap<&Node, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n, i)).collect();

        let mut adjacency = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let targets: Vec<Node> = match node {
                Node::Resource(r) => self
                    .holders
                    .get(r)
                    .map(|ps| ps.iter().cloned().map(Node::Process).collect())
                    .unwrap_or_default(),
                Node::Process(p) => self
                    .wants
                    .get(p)
                    .map(|rs| rs.iter().cloned().map(Node::Resource).collect())
                    .unwrap_or_default(),
            };
            let mut out: Vec<usize> = targets
                .iter()
                .filter_map(|t| index.get(t).copied())
                .collect();
            out.sort_unstable();
            adjacency[i] = out;
        }

        elementary_cycles(&adjacency)
            .into_iter()
            .map(|path| Cycle::new(path.into_iter().map(|i| nodes[i].clone()).collect()))
            .collect()
    }
}

fn link(
    forward: &mut FxHashMap<String, FxHashSet<String>>,
    reverse: &mut FxHashMap<String, FxHashSet<String>>,
    from: &str,
    to: &str,
) -> bool {
    let inserted = forward
        .entry(from.to_string())
        .or_default()
        .insert(to.to_string());
    if inserted {
        reverse
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }
    inserted
}

fn unlink(
    forward: &mut FxHashMap<String, FxHashSet<String>>,
    reverse: &mut FxHashMap<String, FxHashSet<String>>,
    from: &str,
    to: &str,
) -> bool {
    let Some(targets) = forward.get_mut(from) else {
        return false;
    };
    if !targets.remove(to) {
        return false;
    }
    if targets.is_empty() {
        forward.remove(from);
    }
    if let Some(sources) = reverse.get_mut(to) {
        sources.remove(from);
        if sources.is_empty() {
            reverse.remove(to);
        }
    }
    true
}

fn sorted(set: Option<&FxHashSet<String>>) -> Vec<&str> {
    let mut out: Vec<&str> = set
        .map(|s| s.iter().map(String::as_str).collect())
        .unwrap_or_default();
    out.sort_unstable();
    out
}

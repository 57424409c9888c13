use serde::{Deserialize, Serialize};
use std::fmt;

/// Process identifier type
///
/// Uniquely identifies a simulated process (for example `"P1"`).
pub type ProcessId = String;

/// Resource identifier type
///
/// Names a resource type in the pool (for example `"Printer"`).
pub type ResourceId = String;

/// A resource type with its fixed total capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: ResourceId,
    pub capacity: u32,
}

impl Resource {
    pub fn new(name: impl Into<ResourceId>, capacity: u32) -> Self {
        Resource {
            name: name.into(),
            capacity,
        }
    }
}

/// Resources of the default system: one printer, one disk, one tape drive
pub fn default_resources() -> Vec<Resource> {
    vec![
        Resource::new("Printer", 1),
        Resource::new("Disk", 1),
        Resource::new("Tape", 1),
    ]
}

/// How an actor behaves when it asks for a new resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keep held resources while requesting more (hold-and-wait allowed)
    #[default]
    Normal,
    /// Release everything held before each request
    Prevention,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Strategy::Normal),
            "prevention" => Ok(Strategy::Prevention),
            other => Err(format!("unknown strategy `{other}`")),
        }
    }
}

/// A node of the resource-allocation graph
///
/// Process and resource names live in disjoint namespaces, so `P1` the
/// process and `P1` the resource are different nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Node {
    Process(ProcessId),
    Resource(ResourceId),
}

impl Node {
    pub fn process(id: impl Into<ProcessId>) -> Self {
        Node::Process(id.into())
    }

    pub fn resource(id: impl Into<ResourceId>) -> Self {
        Node::Resource(id.into())
    }

    pub fn as_process(&self) -> Option<&str> {
        match self {
            Node::Process(p) => Some(p),
            Node::Resource(_) => None,
        }
    }

    pub fn as_resource(&self) -> Option<&str> {
        match self {
            Node::Resource(r) => Some(r),
            Node::Process(_) => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Process(p) => write!(f, "{p}"),
            Node::Resource(r) => write!(f, "{r}"),
        }
    }
}

/// Kind tag carried by every RAG edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `resource -> process`: the process holds at least one unit
    Assignment,
    /// `process -> resource`: the process waits for an ungranted unit
    Request,
}

/// A directed, kind-tagged edge of the resource-allocation graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub process: ProcessId,
    pub resource: ResourceId,
}

impl Edge {
    pub fn assignment(resource: impl Into<ResourceId>, process: impl Into<ProcessId>) -> Self {
        Edge {
            kind: EdgeKind::Assignment,
            process: process.into(),
            resource: resource.into(),
        }
    }

    pub fn request(process: impl Into<ProcessId>, resource: impl Into<ResourceId>) -> Self {
        Edge {
            kind: EdgeKind::Request,
            process: process.into(),
            resource: resource.into(),
        }
    }

    /// Source node of the edge in graph direction
    pub fn from(&self) -> Node {
        match self.kind {
            EdgeKind::Assignment => Node::Resource(self.resource.clone()),
            EdgeKind::Request => Node::Process(self.process.clone()),
        }
    }

    /// Target node of the edge in graph direction
    pub fn to(&self) -> Node {
        match self.kind {
            EdgeKind::Assignment => Node::Process(self.process.clone()),
            EdgeKind::Request => Node::Resource(self.resource.clone()),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from(), self.to())
    }
}

/// Represents the type of process/resource event that occurred
///
/// These events form the append-only stream that presentation layers render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Process asked for a resource
    Requesting,
    /// Process was granted a resource unit
    Acquired,
    /// Request could not be granted; process waits
    Waiting,
    /// Process gave a resource unit back to the pool
    Released,
    /// Process was removed by a resolution action
    Terminated,
}

/// A single entry of the event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the stream, strictly increasing from 0
    pub seq: u64,
    pub process: ProcessId,
    /// Seconds since Unix Epoch with microsecond precision
    pub timestamp: f64,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            EventKind::Requesting => "requesting",
            EventKind::Acquired => "acquired",
            EventKind::Waiting => "waiting for",
            EventKind::Released => "released",
            EventKind::Terminated => "terminated",
        };
        match &self.resource {
            Some(r) => write!(f, "[Event] Process {} {} {}", self.process, verb, r),
            None => write!(f, "[Event] Process {} {}", self.process, verb),
        }
    }
}

/// An elementary cycle of the resource-allocation graph
///
/// Nodes are listed in edge order: each node has an edge to the next one and the
/// last node has an edge back to the first. The closing node is not repeated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cycle {
    pub nodes: Vec<Node>,
}

impl Cycle {
    pub fn new(nodes: Vec<Node>) -> Self {
        Cycle { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Process nodes of the cycle, in cycle order
    pub fn processes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(Node::as_process)
    }

    /// Resource nodes of the cycle, in cycle order
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(Node::as_resource)
    }

    pub fn contains_process(&self, process: &str) -> bool {
        self.processes().any(|p| p == process)
    }

    /// Edges walked by the cycle, including the closing edge
    ///
    /// Returns `None` when two consecutive nodes are of the same kind, which
    /// no RAG edge can connect.
    pub fn edges(&self) -> Option<Vec<Edge>> {
        let n = self.nodes.len();
        let mut edges = Vec::with_capacity(n);
        for i in 0..n {
            let edge = match (&self.nodes[i], &self.nodes[(i + 1) % n]) {
                (Node::Process(p), Node::Resource(r)) => Edge::request(p.clone(), r.clone()),
                (Node::Resource(r), Node::Process(p)) => Edge::assignment(r.clone(), p.clone()),
                _ => return None,
            };
            edges.push(edge);
        }
        Some(edges)
    }

    /// True when both cycles visit the same nodes in the same rotation-free order
    pub fn same_as(&self, other: &Cycle) -> bool {
        let n = self.nodes.len();
        if n != other.nodes.len() {
            return false;
        }
        if n == 0 {
            return true;
        }
        (0..n).any(|shift| (0..n).all(|i| self.nodes[i] == other.nodes[(i + shift) % n]))
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.nodes.iter().map(Node::to_string).collect();
        match self.nodes.first() {
            Some(first) => write!(f, "{} -> {}", names.join(" -> "), first),
            None => write!(f, "<empty>"),
        }
    }
}

/// Represents the result of a deadlock detection pass
///
/// Passed to the monitor callback whenever a pass finds at least one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockReport {
    /// Every elementary cycle found in the snapshot
    pub cycles: Vec<Cycle>,

    /// ISO-8601 formatted timestamp indicating when the deadlock was detected.
    pub timestamp: String,
}

/// Current seconds since Unix Epoch with microsecond precision
pub(crate) fn now_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_process_cycle() -> Cycle {
        Cycle::new(vec![
            Node::process("P1"),
            Node::resource("Disk"),
            Node::process("P2"),
            Node::resource("Printer"),
        ])
    }

    #[test]
    fn test_node_namespaces_are_disjoint() {
        assert_ne!(Node::process("X"), Node::resource("X"));
        assert!(Node::process("X") < Node::resource("A"));
    }

    #[test]
    fn test_cycle_edges_alternate() {
        let edges = two_process_cycle().edges().unwrap();
        assert_eq!(
            edges,
            vec![
                Edge::request("P1", "Disk"),
                Edge::assignment("Disk", "P2"),
                Edge::request("P2", "Printer"),
                Edge::assignment("Printer", "P1"),
            ]
        );
    }

    #[test]
    fn test_cycle_edges_reject_same_kind_neighbours() {
        let cycle = Cycle::new(vec![Node::process("P1"), Node::process("P2")]);
        assert!(cycle.edges().is_none());
    }

    #[test]
    fn test_cycle_rotation_equality() {
        let a = two_process_cycle();
        let mut rotated = a.nodes.clone();
        rotated.rotate_left(2);
        assert!(a.same_as(&Cycle::new(rotated)));

        let mut reversed = a.nodes.clone();
        reversed.reverse();
        assert!(!a.same_as(&Cycle::new(reversed)));
    }

    #[test]
    fn test_cycle_display_closes_walk() {
        assert_eq!(
            two_process_cycle().to_string(),
            "P1 -> Disk -> P2 -> Printer -> P1"
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Prevention".parse::<Strategy>(), Ok(Strategy::Prevention));
        assert_eq!(" normal ".parse::<Strategy>(), Ok(Strategy::Normal));
        assert!("avoidance".parse::<Strategy>().is_err());
    }
}

//! Shared simulation state and the mutations that keep it consistent
//!
//! Pool, graph, process table and event log are only ever touched together,
//! through one lock held by the engine. Every method here therefore runs as
//! a single atomic unit from the point of view of a detector snapshot: there
//! is no observable state where an assignment edge exists but the pool count
//! has not moved yet.
//!
//! Methods check their preconditions before the first mutation, so a failed
//! call leaves the state as it found it.

use crate::core::error::{Result, SimError};
use crate::core::graph::AllocationGraph;
use crate::core::logger::EventLog;
use crate::core::pool::{ResourcePool, ResourceSnapshot};
use crate::core::process::ProcessState;
use crate::core::types::{Edge, EdgeKind, EventKind, ResourceId, Strategy};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Counters accumulated over the lifetime of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub turns: u64,
    pub acquisitions: u64,
    pub waits: u64,
    pub releases: u64,
    /// Deadlocks broken by preemption or termination
    pub deadlocks_resolved: u64,
    pub preemptions: u64,
    pub terminations: u64,
    /// Avoidance resolutions, which defer instead of mutating
    pub deferrals: u64,
}

/// What one actor turn did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A unit of the resource was granted
    Acquired(ResourceId),
    /// The request was refused and is now outstanding
    Waiting(ResourceId),
    /// The outstanding request was retried and refused again
    StillWaiting(ResourceId),
    /// No eligible target this turn
    Idle,
    /// The process no longer exists (terminated or stopped)
    Gone,
}

/// Consistent copy of everything a presentation layer can query
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub resources: Vec<ResourceSnapshot>,
    pub processes: Vec<ProcessState>,
    pub edges: Vec<Edge>,
    pub stats: Stats,
}

impl SystemSnapshot {
    /// Re-derive the graph from held/requested counts and compare
    ///
    /// # Errors
    /// Returns `InvariantViolation` naming the first mismatch: an edge without
    /// a backing fact, a fact without its edge, or pool counts that disagree
    /// with what processes hold.
    pub fn verify(&self) -> Result<()> {
        let mut expected = BTreeSet::new();
        let mut held_totals: BTreeMap<&str, u64> = BTreeMap::new();
        for p in &self.processes {
            for (r, &count) in p.held() {
                expected.insert(Edge::assignment(r.clone(), p.id.clone()));
                *held_totals.entry(r.as_str()).or_default() += u64::from(count);
            }
            for r in p.requested().keys() {
                expected.insert(Edge::request(p.id.clone(), r.clone()));
            }
        }

        let actual: BTreeSet<Edge> = self.edges.iter().cloned().collect();
        if let Some(edge) = actual.difference(&expected).next() {
            return Err(SimError::InvariantViolation(format!(
                "edge {edge} has no backing allocation or request"
            )));
        }
        if let Some(edge) = expected.difference(&actual).next() {
            return Err(SimError::InvariantViolation(format!(
                "edge {edge} is missing from the allocation graph"
            )));
        }

        for r in &self.resources {
            if r.available > r.capacity {
                return Err(SimError::InvariantViolation(format!(
                    "`{}` has {} available above capacity {}",
                    r.name, r.available, r.capacity
                )));
            }
            let held = held_totals.get(r.name.as_str()).copied().unwrap_or(0);
            if held + u64::from(r.available) != u64::from(r.capacity) {
                return Err(SimError::InvariantViolation(format!(
                    "`{}` has {held} held + {} available != capacity {}",
                    r.name, r.available, r.capacity
                )));
            }
        }
        Ok(())
    }
}

/// Pool, graph, processes and events owned by one engine
#[derive(Debug)]
pub(crate) struct SystemState {
    pub(crate) pool: ResourcePool,
    pub(crate) graph: AllocationGraph,
    /// Live processes in declaration order
    pub(crate) processes: Vec<ProcessState>,
    pub(crate) events: EventLog,
    pub(crate) stats: Stats,
}

impl SystemState {
    pub(crate) fn new(pool: ResourcePool, events: EventLog) -> Self {
        SystemState {
            pool,
            graph: AllocationGraph::new(),
            processes: Vec::new(),
            events,
            stats: Stats::default(),
        }
    }

    fn index_of(&self, process: &str) -> Option<usize> {
        self.processes.iter().position(|p| p.id == process)
    }

    fn require(&self, process: &str) -> Result<usize> {
        self.index_of(process)
            .ok_or_else(|| SimError::UnknownProcess(process.to_string()))
    }

    pub(crate) fn process(&self, process: &str) -> Option<&ProcessState> {
        self.processes.iter().find(|p| p.id == process)
    }

    pub(crate) fn contains(&self, process: &str) -> bool {
        self.index_of(process).is_some()
    }

    /// Register a process that holds and requests nothing yet
    pub(crate) fn add_process(&mut self, state: ProcessState) -> Result<()> {
        if self.contains(&state.id) {
            return Err(SimError::DuplicateProcess(state.id));
        }
        if !state.held().is_empty() || state.is_waiting() {
            return Err(SimError::invariant(format!(
                "process `{}` registered with allocations",
                state.id
            )));
        }
        self.processes.push(state);
        Ok(())
    }

    /// Take `count` units for `process` if available, recording the assignment
    ///
    /// Clears any outstanding request for the same resource on success.
    ///
    /// # Returns
    /// `false`, with nothing changed, if the pool cannot supply the units
    pub(crate) fn acquire(&mut self, process: &str, resource: &str, count: u32) -> Result<bool> {
        let idx = self.require(process)?;
        if !self.pool.try_acquire(resource, count)? {
            return Ok(false);
        }
        if let Err(e) = self.processes[idx].grant(resource, count) {
            self.pool.release(resource, count)?;
            return Err(e);
        }
        if self.processes[idx].clear_request(resource) > 0 {
            self.graph.remove_request(process, resource);
        }
        self.graph.add_assignment(resource, process);
        self.stats.acquisitions += 1;
        self.events
            .record(process, EventKind::Acquired, Some(resource.to_string()));
        Ok(true)
    }

    /// Record that `process` waits for `count` units of `resource`
    ///
    /// # Errors
    /// Returns `InvalidState` if granting the outstanding request would take
    /// the process above its declared maximum demand.
    pub(crate) fn wait(&mut self, process: &str, resource: &str, count: u32) -> Result<()> {
        let idx = self.require(process)?;
        if !self.pool.contains(resource) {
            return Err(SimError::UnknownResource(resource.to_string()));
        }
        let p = &self.processes[idx];
        if !p.within_max(resource, p.requests(resource).saturating_add(count)) {
            return Err(SimError::InvalidState(format!(
                "process `{process}` requests {count} of `{resource}` beyond its declared maximum"
            )));
        }
        self.processes[idx].add_request(resource, count);
        self.graph.add_request(process, resource);
        self.stats.waits += 1;
        self.events
            .record(process, EventKind::Waiting, Some(resource.to_string()));
        Ok(())
    }

    /// Give `count` held units of `resource` back to the pool
    pub(crate) fn release(&mut self, process: &str, resource: &str, count: u32) -> Result<()> {
        let idx = self.require(process)?;
        let held = self.processes[idx].holds(resource);
        if held < count {
            return Err(SimError::invariant(format!(
                "process `{process}` releases {count} of `{resource}` but holds {held}"
            )));
        }
        self.pool.release(resource, count)?;
        if self.processes[idx].revoke(resource, count)? == 0
            && !self.graph.remove_assignment(resource, process)
        {
            return Err(SimError::invariant(format!(
                "assignment edge {resource} -> {process} was missing"
            )));
        }
        self.stats.releases += 1;
        self.events
            .record(process, EventKind::Released, Some(resource.to_string()));
        Ok(())
    }

    /// Release everything `process` holds
    ///
    /// # Returns
    /// What was released, by resource
    pub(crate) fn release_all(&mut self, process: &str) -> Result<Vec<(ResourceId, u32)>> {
        let idx = self.require(process)?;
        let held: Vec<(ResourceId, u32)> = self.processes[idx]
            .held()
            .iter()
            .map(|(r, &c)| (r.clone(), c))
            .collect();
        for (resource, count) in &held {
            self.release(process, resource, *count)?;
        }
        Ok(held)
    }

    /// Remove a process after releasing what it holds and dropping its requests
    ///
    /// # Arguments
    /// * `terminated` - emit a `terminated` event (resolution) rather than a
    ///   silent retirement (actor stop)
    ///
    /// # Returns
    /// What was released back to the pool
    pub(crate) fn remove_process(
        &mut self,
        process: &str,
        terminated: bool,
    ) -> Result<Vec<(ResourceId, u32)>> {
        let released = self.release_all(process)?;
        let idx = self.require(process)?;
        self.processes[idx].clear_requests();
        let leftovers = self.graph.remove_process(process);
        if leftovers.iter().any(|e| e.kind == EdgeKind::Assignment) {
            return Err(SimError::invariant(format!(
                "process `{process}` still had assignment edges after releasing everything"
            )));
        }
        self.processes.remove(idx);
        if terminated {
            self.stats.terminations += 1;
            self.events.record(process, EventKind::Terminated, None);
        }
        Ok(released)
    }

    /// Move one unit of `resource` from `from` to the waiting `to`
    pub(crate) fn preempt(&mut self, resource: &str, from: &str, to: &str) -> Result<()> {
        let to_idx = self.require(to)?;
        if self.processes[to_idx].requests(resource) == 0 {
            return Err(SimError::invariant(format!(
                "preemption target `{to}` is not waiting for `{resource}`"
            )));
        }
        self.release(from, resource, 1)?;
        if !self.acquire(to, resource, 1)? {
            return Err(SimError::invariant(format!(
                "`{resource}` released by `{from}` was not available to `{to}`"
            )));
        }
        self.stats.preemptions += 1;
        Ok(())
    }

    /// One actor turn
    ///
    /// 1. A process with an outstanding wait re-tries that resource and does
    ///    nothing else.
    /// 2. Otherwise it picks a random resource it neither holds nor waits for
    ///    and may still take under a declared maximum demand. It emits
    ///    `requesting`, releases everything first under the prevention
    ///    strategy, then either acquires the resource or starts waiting for it.
    /// 3. After a turn that did not end in a wait, it releases everything it
    ///    holds with probability `release_chance` (its unit of work is done).
    pub(crate) fn turn<R: Rng>(
        &mut self,
        process: &str,
        rng: &mut R,
        release_chance: f64,
    ) -> Result<TurnOutcome> {
        let Some(idx) = self.index_of(process) else {
            return Ok(TurnOutcome::Gone);
        };
        self.stats.turns += 1;

        if let Some(waiting) = self.processes[idx].waiting_on().map(str::to_string) {
            return if self.acquire(process, &waiting, 1)? {
                Ok(TurnOutcome::Acquired(waiting))
            } else {
                Ok(TurnOutcome::StillWaiting(waiting))
            };
        }

        let candidates: Vec<ResourceId> = self
            .pool
            .names()
            .iter()
            .filter(|r| {
                let p = &self.processes[idx];
                p.holds(r) == 0 && p.within_max(r, 1)
            })
            .cloned()
            .collect();

        let outcome = if candidates.is_empty() {
            TurnOutcome::Idle
        } else {
            let target = candidates[rng.random_range(0..candidates.len())].clone();
            self.events
                .record(process, EventKind::Requesting, Some(target.clone()));

            if self.processes[idx].strategy == Strategy::Prevention {
                self.release_all(process)?;
            }

            if self.acquire(process, &target, 1)? {
                TurnOutcome::Acquired(target)
            } else {
                self.wait(process, &target, 1)?;
                TurnOutcome::Waiting(target)
            }
        };

        if !matches!(outcome, TurnOutcome::Waiting(_))
            && release_chance > 0.0
            && rng.random_bool(release_chance.min(1.0))
        {
            self.release_all(process)?;
        }

        Ok(outcome)
    }

    pub(crate) fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            resources: self.pool.snapshot(),
            processes: self.processes.clone(),
            edges: self.graph.edges(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Resource;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn state(capacity: u32) -> SystemState {
        let pool = ResourcePool::new(&[
            Resource::new("Printer", capacity),
            Resource::new("Disk", capacity),
        ])
        .unwrap();
        let mut state = SystemState::new(pool, EventLog::new());
        state
            .add_process(ProcessState::new("P1", Strategy::Normal))
            .unwrap();
        state
            .add_process(ProcessState::new("P2", Strategy::Normal))
            .unwrap();
        state
    }

    #[test]
    fn test_acquire_and_release_keep_graph_in_lockstep() {
        let mut s = state(1);
        assert!(s.acquire("P1", "Printer", 1).unwrap());
        assert!(s.graph.has_assignment("Printer", "P1"));
        assert_eq!(s.pool.available("Printer"), Some(0));
        s.snapshot().verify().unwrap();

        s.release("P1", "Printer", 1).unwrap();
        assert!(s.graph.is_empty());
        assert_eq!(s.pool.available("Printer"), Some(1));
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_acquire_clears_matching_request() {
        let mut s = state(1);
        assert!(s.acquire("P1", "Disk", 1).unwrap());
        assert!(!s.acquire("P2", "Disk", 1).unwrap());
        s.wait("P2", "Disk", 1).unwrap();
        assert!(s.graph.has_request("P2", "Disk"));

        s.release("P1", "Disk", 1).unwrap();
        assert!(s.acquire("P2", "Disk", 1).unwrap());
        assert!(!s.graph.has_request("P2", "Disk"));
        assert!(!s.process("P2").unwrap().is_waiting());
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_release_without_holding_is_invariant_violation() {
        let mut s = state(1);
        let before = s.snapshot();
        assert!(matches!(
            s.release("P1", "Disk", 1),
            Err(SimError::InvariantViolation(_))
        ));
        assert_eq!(s.snapshot().resources, before.resources);
    }

    #[test]
    fn test_remove_process_returns_units() {
        let mut s = state(2);
        s.acquire("P1", "Disk", 1).unwrap();
        s.acquire("P1", "Printer", 2).unwrap();
        s.wait("P1", "Disk", 1).unwrap();

        let released = s.remove_process("P1", true).unwrap();
        assert_eq!(released, vec![("Disk".into(), 1), ("Printer".into(), 2)]);
        assert!(!s.contains("P1"));
        assert!(s.graph.is_empty());
        assert_eq!(s.stats.terminations, 1);
        assert_eq!(s.events.all().last().unwrap().kind, EventKind::Terminated);
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_preempt_moves_unit() {
        let mut s = state(1);
        s.acquire("P1", "Disk", 1).unwrap();
        s.wait("P2", "Disk", 1).unwrap();
        s.preempt("Disk", "P1", "P2").unwrap();

        assert!(s.graph.has_assignment("Disk", "P2"));
        assert!(!s.graph.has_assignment("Disk", "P1"));
        assert!(!s.graph.has_request("P2", "Disk"));
        assert_eq!(s.pool.available("Disk"), Some(0));
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_turn_for_missing_process_is_gone() {
        let mut s = state(1);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(s.turn("P9", &mut rng, 0.0).unwrap(), TurnOutcome::Gone);
    }

    #[test]
    fn test_waiting_turn_only_retries() {
        let mut s = state(1);
        let mut rng = StdRng::seed_from_u64(7);
        s.acquire("P1", "Disk", 1).unwrap();
        s.wait("P2", "Disk", 1).unwrap();

        let outcome = s.turn("P2", &mut rng, 0.0).unwrap();
        assert_eq!(outcome, TurnOutcome::StillWaiting("Disk".into()));
        assert!(s.process("P2").unwrap().held().is_empty());

        s.release("P1", "Disk", 1).unwrap();
        let outcome = s.turn("P2", &mut rng, 0.0).unwrap();
        assert_eq!(outcome, TurnOutcome::Acquired("Disk".into()));
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_holding_everything_is_idle() {
        let mut s = state(1);
        let mut rng = StdRng::seed_from_u64(3);
        s.acquire("P1", "Disk", 1).unwrap();
        s.acquire("P1", "Printer", 1).unwrap();
        assert_eq!(s.turn("P1", &mut rng, 0.0).unwrap(), TurnOutcome::Idle);
        assert_eq!(s.turn("P1", &mut rng, 1.0).unwrap(), TurnOutcome::Idle);
        assert!(s.process("P1").unwrap().held().is_empty());
    }

    #[test]
    fn test_wait_beyond_declared_max_is_rejected() {
        let mut s = state(2);
        let max = BTreeMap::from([("Printer".to_string(), 1)]);
        s.add_process(
            ProcessState::new("P3", Strategy::Normal)
                .with_max_demand(max)
                .unwrap(),
        )
        .unwrap();
        s.acquire("P3", "Printer", 1).unwrap();
        let before = s.snapshot();

        assert!(matches!(
            s.wait("P3", "Printer", 1),
            Err(SimError::InvalidState(_))
        ));
        assert!(matches!(
            s.wait("P3", "Disk", 1),
            Err(SimError::InvalidState(_))
        ));
        assert_eq!(s.snapshot().edges, before.edges);
        assert_eq!(s.stats.waits, 0);

        // Only Disk is free of holdings and it is not declared
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(s.turn("P3", &mut rng, 0.0).unwrap(), TurnOutcome::Idle);
    }

    #[test]
    fn test_verify_detects_dangling_edge() {
        let mut s = state(1);
        s.graph.add_request("P1", "Disk");
        assert!(matches!(
            s.snapshot().verify(),
            Err(SimError::InvariantViolation(_))
        ));
    }
}

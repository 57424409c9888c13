//! Deadlock resolution
//!
//! [`Resolver::plan`] is a pure function of a cycle and the live graph and
//! process table: it decides which action to take and why. [`apply`] performs
//! the decision on the engine state. The engine runs both under one lock
//! acquisition, so a plan is never applied to a state it was not made for.
//!
//! # Policy
//!
//! 1. **Preemption** when the cycle spans at most two resources and two
//!    processes, and some resource in it has exactly one holder and exactly one
//!    other waiter among the cycle's processes. One unit moves from the holder
//!    to the waiter.
//! 2. **Termination** of the victim chosen by the [`VictimPolicy`] otherwise.
//! 3. **Avoidance** when the cycle is malformed or no longer present in the
//!    graph. Nothing is mutated; the first request of the cycle is reported as
//!    the one that should have been deferred.

use crate::core::engine::SimulationEngine;
use crate::core::engine::state::SystemState;
use crate::core::error::{Result, SimError};
use crate::core::graph::AllocationGraph;
use crate::core::process::ProcessState;
use crate::core::types::{Cycle, Edge, EdgeKind, ProcessId, ResourceId};
use serde::Serialize;

/// What a resolution does to the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ResolutionAction {
    /// Move one unit of `resource` from `from` to the waiting `to`
    Preempt {
        resource: ResourceId,
        from: ProcessId,
        to: ProcessId,
    },
    /// Remove `process`, returning `released` to the pool
    Terminate {
        process: ProcessId,
        released: Vec<(ResourceId, u32)>,
    },
    /// Leave the allocation untouched and defer the named request
    Avoid { deferred: Option<Edge> },
}

/// A resolution decision with its human-readable explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub action: ResolutionAction,
    pub rationale: String,
    /// The cycle this resolution was made for
    pub cycle: Cycle,
}

impl Resolution {
    /// True for preemption and termination, which break the cycle
    pub fn mutates(&self) -> bool {
        !matches!(self.action, ResolutionAction::Avoid { .. })
    }
}

/// Chooses which process a termination removes
pub trait VictimPolicy: Send + Sync {
    /// Pick a process of `cycle`, or `None` if no candidate is acceptable
    fn select(&self, cycle: &Cycle, processes: &[ProcessState]) -> Option<ProcessId>;
}

/// The first process of the cycle as reported by the detector
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstInCycle;

impl VictimPolicy for FirstInCycle {
    fn select(&self, cycle: &Cycle, processes: &[ProcessState]) -> Option<ProcessId> {
        cycle
            .processes()
            .find(|p| processes.iter().any(|s| s.id == *p))
            .map(str::to_string)
    }
}

pub struct Resolver {
    victim: Box<dyn VictimPolicy>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}

impl Resolver {
    /// Resolver terminating the first process of a cycle
    pub fn new() -> Self {
        Resolver::with_policy(FirstInCycle)
    }

    pub fn with_policy<P: VictimPolicy + 'static>(policy: P) -> Self {
        Resolver {
            victim: Box::new(policy),
        }
    }

    /// Decide how to break `cycle`
    ///
    /// # Arguments
    /// * `cycle` - A cycle as returned by the detector
    /// * `graph` - The live allocation graph
    /// * `processes` - The live process table
    pub fn plan(
        &self,
        cycle: &Cycle,
        graph: &AllocationGraph,
        processes: &[ProcessState],
    ) -> Resolution {
        let Some(edges) = cycle.edges().filter(|_| cycle.len() >= 2) else {
            return avoid(cycle, None, format!("Cycle {cycle} is malformed"));
        };
        let deferred = edges.iter().find(|e| e.kind == EdgeKind::Request).cloned();

        let known = |p: &str| processes.iter().any(|s| s.id == p);
        if cycle.processes().next().is_none() || !cycle.processes().all(known) {
            return avoid(cycle, deferred, format!("Cycle {cycle} names no live process"));
        }
        if let Some(missing) = edges.iter().find(|e| !graph.contains(e)) {
            return avoid(
                cycle,
                deferred,
                format!("Cycle {cycle} is no longer present, edge {missing} is gone"),
            );
        }

        if let Some((resource, from, to)) = preemption_pair(cycle, graph, processes) {
            let rationale = format!(
                "Preempted {resource} from {from} and granted it to {to}, which was waiting for it. \
                 This breaks the circular wait {cycle}"
            );
            return Resolution {
                action: ResolutionAction::Preempt { resource, from, to },
                rationale,
                cycle: cycle.clone(),
            };
        }

        let Some(victim) = self.victim.select(cycle, processes) else {
            return avoid(cycle, deferred, format!("No process of {cycle} may be terminated"));
        };
        let released: Vec<(ResourceId, u32)> = processes
            .iter()
            .find(|p| p.id == victim)
            .map(|p| p.held().iter().map(|(r, &c)| (r.clone(), c)).collect())
            .unwrap_or_default();

        let distinct = distinct_processes(cycle);
        let freed = if released.is_empty() {
            "nothing".to_string()
        } else {
            released
                .iter()
                .map(|(r, c)| format!("{c} x {r}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let rationale = if distinct.len() > 2 {
            format!(
                "Terminated {victim}: {} processes ({}) wait on each other, so no single \
                 preemption breaks {cycle}. Released {freed}",
                distinct.len(),
                distinct.join(", ")
            )
        } else {
            format!(
                "Terminated {victim}: no resource of {cycle} has a single holder and a single \
                 waiter to preempt between. Released {freed}"
            )
        };
        Resolution {
            action: ResolutionAction::Terminate {
                process: victim,
                released,
            },
            rationale,
            cycle: cycle.clone(),
        }
    }

    /// Plan and apply a resolution for `cycle` on `engine`
    ///
    /// # Errors
    /// Returns `InvariantViolation` if applying the plan found broken bookkeeping.
    pub fn resolve(&self, engine: &SimulationEngine, cycle: &Cycle) -> Result<Resolution> {
        engine.shared().resolve(self, cycle)
    }
}

fn avoid(cycle: &Cycle, deferred: Option<Edge>, reason: String) -> Resolution {
    let rationale = match &deferred {
        Some(edge) => format!(
            "{reason}. Allocation is left untouched; the request {edge} should have been denied \
             and waits until the system is safe again"
        ),
        None => format!("{reason}. Allocation is left untouched"),
    };
    Resolution {
        action: ResolutionAction::Avoid { deferred },
        rationale,
        cycle: cycle.clone(),
    }
}

fn distinct_processes(cycle: &Cycle) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for p in cycle.processes() {
        if !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen
}

/// First resource, in cycle order, with one holder and one other waiter in the cycle
fn preemption_pair(
    cycle: &Cycle,
    graph: &AllocationGraph,
    processes: &[ProcessState],
) -> Option<(ResourceId, ProcessId, ProcessId)> {
    let mut resources: Vec<&str> = Vec::new();
    for r in cycle.resources() {
        if !resources.contains(&r) {
            resources.push(r);
        }
    }
    if resources.is_empty() || resources.len() > 2 || distinct_processes(cycle).len() > 2 {
        return None;
    }

    resources.into_iter().find_map(|resource| {
        let holders: Vec<&str> = graph
            .holders_of(resource)
            .into_iter()
            .filter(|p| cycle.contains_process(p))
            .collect();
        let waiters: Vec<&str> = graph
            .requesters_of(resource)
            .into_iter()
            .filter(|p| cycle.contains_process(p))
            .collect();
        let ([from], [to]) = (holders.as_slice(), waiters.as_slice()) else {
            return None;
        };
        if from == to {
            return None;
        }
        let target = processes.iter().find(|p| p.id == *to)?;
        target
            .within_max(resource, 1)
            .then(|| (resource.to_string(), from.to_string(), to.to_string()))
    })
}

/// Carry out `resolution` on `state`
///
/// # Errors
/// Returns `InvariantViolation` if the state no longer matches the plan.
pub(crate) fn apply(state: &mut SystemState, resolution: &Resolution) -> Result<()> {
    match &resolution.action {
        ResolutionAction::Preempt { resource, from, to } => {
            state.preempt(resource, from, to)?;
            state.stats.deadlocks_resolved += 1;
        }
        ResolutionAction::Terminate { process, released } => {
            let actual = state.remove_process(process, true)?;
            if actual != *released {
                return Err(SimError::invariant(format!(
                    "termination of `{process}` released {actual:?}, planned {released:?}"
                )));
            }
            state.stats.deadlocks_resolved += 1;
        }
        ResolutionAction::Avoid { .. } => {
            state.stats.deferrals += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logger::EventLog;
    use crate::core::pool::ResourcePool;
    use crate::core::types::{Node, Resource, Strategy};

    fn state(resources: &[(&str, u32)], processes: &[&str]) -> SystemState {
        let resources: Vec<Resource> =
            resources.iter().map(|&(n, c)| Resource::new(n, c)).collect();
        let mut state = SystemState::new(ResourcePool::new(&resources).unwrap(), EventLog::new());
        for p in processes {
            state
                .add_process(ProcessState::new(*p, Strategy::Normal))
                .unwrap();
        }
        state
    }

    /// P1 holds Printer and waits for Disk, P2 holds Disk and waits for Printer
    fn two_way() -> SystemState {
        let mut s = state(&[("Printer", 1), ("Disk", 1)], &["P1", "P2"]);
        s.acquire("P1", "Printer", 1).unwrap();
        s.acquire("P2", "Disk", 1).unwrap();
        s.wait("P1", "Disk", 1).unwrap();
        s.wait("P2", "Printer", 1).unwrap();
        s
    }

    fn plan(s: &SystemState, cycle: &Cycle) -> Resolution {
        Resolver::new().plan(cycle, &s.graph, &s.processes)
    }

    #[test]
    fn test_two_process_cycle_is_preempted() {
        let mut s = two_way();
        let cycle = s.graph.find_cycles().remove(0);
        let resolution = plan(&s, &cycle);

        assert_eq!(
            resolution.action,
            ResolutionAction::Preempt {
                resource: "Disk".into(),
                from: "P2".into(),
                to: "P1".into(),
            }
        );
        assert!(resolution.rationale.contains("Preempted Disk from P2"));

        apply(&mut s, &resolution).unwrap();
        assert!(s.graph.find_cycles().is_empty());
        assert_eq!(s.process("P1").unwrap().holds("Disk"), 1);
        assert_eq!(s.stats.deadlocks_resolved, 1);
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_three_process_cycle_terminates_first_process() {
        let mut s = state(&[("Printer", 1), ("Disk", 1), ("Tape", 1)], &["P1", "P2", "P3"]);
        s.acquire("P1", "Printer", 1).unwrap();
        s.acquire("P2", "Disk", 1).unwrap();
        s.acquire("P3", "Tape", 1).unwrap();
        s.wait("P1", "Disk", 1).unwrap();
        s.wait("P2", "Tape", 1).unwrap();
        s.wait("P3", "Printer", 1).unwrap();

        let cycle = s.graph.find_cycles().remove(0);
        let resolution = plan(&s, &cycle);
        assert_eq!(
            resolution.action,
            ResolutionAction::Terminate {
                process: "P1".into(),
                released: vec![("Printer".into(), 1)],
            }
        );
        assert!(resolution.rationale.contains("3 processes"));

        apply(&mut s, &resolution).unwrap();
        assert!(!s.contains("P1"));
        assert!(s.graph.find_cycles().iter().all(|c| !c.same_as(&cycle)));
        assert_eq!(s.stats.terminations, 1);
        s.snapshot().verify().unwrap();
    }

    #[test]
    fn test_full_target_falls_back_to_termination() {
        let mut s = two_way();
        let no_room = std::collections::BTreeMap::from([("Printer".to_string(), 1)]);
        let idx = s.processes.iter().position(|p| p.id == "P1").unwrap();
        s.processes[idx] = s.processes[idx].clone().with_max_demand(no_room).unwrap();
        let no_room = std::collections::BTreeMap::from([("Disk".to_string(), 1)]);
        let idx = s.processes.iter().position(|p| p.id == "P2").unwrap();
        s.processes[idx] = s.processes[idx].clone().with_max_demand(no_room).unwrap();

        let cycle = s.graph.find_cycles().remove(0);
        let resolution = plan(&s, &cycle);
        assert!(matches!(
            resolution.action,
            ResolutionAction::Terminate { ref process, .. } if process == "P1"
        ));
    }

    #[test]
    fn test_stale_cycle_is_avoided_without_mutation() {
        let mut s = two_way();
        let cycle = s.graph.find_cycles().remove(0);
        let first = plan(&s, &cycle);
        apply(&mut s, &first).unwrap();
        let before = s.snapshot();

        let resolution = plan(&s, &cycle);
        assert_eq!(
            resolution.action,
            ResolutionAction::Avoid {
                deferred: Some(Edge::request("P1", "Disk")),
            }
        );
        assert!(!resolution.mutates());

        apply(&mut s, &resolution).unwrap();
        let after = s.snapshot();
        assert_eq!(after.edges, before.edges);
        assert_eq!(after.resources, before.resources);
        assert_eq!(after.stats.deferrals, 1);
        assert_eq!(after.stats.deadlocks_resolved, 1);
    }

    #[test]
    fn test_malformed_cycle_is_avoided() {
        let s = two_way();
        let single = Cycle::new(vec![Node::process("P1")]);
        assert!(matches!(plan(&s, &single).action, ResolutionAction::Avoid { deferred: None }));

        let same_kind = Cycle::new(vec![Node::process("P1"), Node::process("P2")]);
        assert!(matches!(plan(&s, &same_kind).action, ResolutionAction::Avoid { .. }));
    }

    struct LastInCycle;

    impl VictimPolicy for LastInCycle {
        fn select(&self, cycle: &Cycle, _: &[ProcessState]) -> Option<ProcessId> {
            cycle.processes().last().map(str::to_string)
        }
    }

    #[test]
    fn test_victim_policy_is_replaceable() {
        let mut s = state(&[("Printer", 1), ("Disk", 1), ("Tape", 1)], &["P1", "P2", "P3"]);
        s.acquire("P1", "Printer", 1).unwrap();
        s.acquire("P2", "Disk", 1).unwrap();
        s.acquire("P3", "Tape", 1).unwrap();
        s.wait("P1", "Disk", 1).unwrap();
        s.wait("P2", "Tape", 1).unwrap();
        s.wait("P3", "Printer", 1).unwrap();

        let cycle = s.graph.find_cycles().remove(0);
        let resolution = Resolver::with_policy(LastInCycle).plan(&cycle, &s.graph, &s.processes);
        assert!(matches!(
            resolution.action,
            ResolutionAction::Terminate { ref process, .. } if process == "P3"
        ));
    }
}

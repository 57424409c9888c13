//! Banker's algorithm safety check
//!
//! Works on a declared snapshot: available units per resource and, per process,
//! its declared maximum demand and its current allocation. Vectors are indexed
//! by the position of the resource in [`BankerInput::resources`].

use crate::core::error::{Result, SimError};
use crate::core::types::{ProcessId, ResourceId};
use serde::Serialize;

/// Declared maximum and current allocation of one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankerProcess {
    pub id: ProcessId,
    pub max: Vec<u32>,
    pub allocated: Vec<u32>,
}

/// Input of the safety check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankerInput {
    pub resources: Vec<ResourceId>,
    pub available: Vec<u32>,
    /// Processes in declaration order, which is also the tie-break order
    pub processes: Vec<BankerProcess>,
}

impl BankerInput {
    pub fn new(resources: Vec<ResourceId>, available: Vec<u32>) -> Self {
        BankerInput {
            resources,
            available,
            processes: Vec::new(),
        }
    }

    /// Append a process, builder style
    pub fn process(mut self, id: impl Into<ProcessId>, max: Vec<u32>, allocated: Vec<u32>) -> Self {
        self.processes.push(BankerProcess {
            id: id.into(),
            max,
            allocated,
        });
        self
    }

    /// Compute `need = max - allocated` for every process
    ///
    /// # Errors
    /// Returns `InvalidState` if a vector has the wrong length or any
    /// allocation exceeds its declared maximum.
    pub fn need(&self) -> Result<Vec<Vec<u32>>> {
        let width = self.resources.len();
        if self.available.len() != width {
            return Err(SimError::InvalidState(format!(
                "available has {} entries for {width} resources",
                self.available.len()
            )));
        }

        self.processes
            .iter()
            .map(|p| {
                if p.max.len() != width || p.allocated.len() != width {
                    return Err(SimError::InvalidState(format!(
                        "process `{}` declares {} max and {} allocated entries for {width} resources",
                        p.id,
                        p.max.len(),
                        p.allocated.len()
                    )));
                }
                p.max
                    .iter()
                    .zip(&p.allocated)
                    .zip(&self.resources)
                    .map(|((&max, &alloc), resource)| {
                        max.checked_sub(alloc).ok_or_else(|| {
                            SimError::InvalidState(format!(
                                "process `{}` has negative need for `{resource}` (allocated {alloc} > max {max})",
                                p.id
                            ))
                        })
                    })
                    .collect::<Result<Vec<u32>>>()
            })
            .collect()
    }
}

/// Outcome of a safety check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SafetyReport {
    /// Every process can finish in `sequence` order
    Safe { sequence: Vec<ProcessId> },
    /// No order exists; `finished` could complete, `blocked` never can
    Unsafe {
        finished: Vec<ProcessId>,
        blocked: Vec<ProcessId>,
    },
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        matches!(self, SafetyReport::Safe { .. })
    }

    /// The safe sequence, if the state is safe
    pub fn sequence(&self) -> Option<&[ProcessId]> {
        match self {
            SafetyReport::Safe { sequence } => Some(sequence),
            SafetyReport::Unsafe { .. } => None,
        }
    }

    /// One-line human-readable summary
    pub fn describe(&self) -> String {
        match self {
            SafetyReport::Safe { sequence } => {
                format!("System is in a safe state. Safe sequence: {}", sequence.join(" -> "))
            }
            SafetyReport::Unsafe { blocked, .. } => format!(
                "System is in an unsafe state. No safe sequence exists; {} cannot finish",
                blocked.join(", ")
            ),
        }
    }
}

/// Why a request has to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitReason {
    /// Not enough units are free right now
    Unavailable,
    /// Granting it would leave the system without a safe sequence
    Unsafe,
}

/// Decision on a single resource request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum RequestDecision {
    /// The state after granting is safe, with this sequence
    Grant { sequence: Vec<ProcessId> },
    Wait { reason: WaitReason },
}

/// Stateless Banker's algorithm
pub struct SafetyChecker;

impl SafetyChecker {
    /// Decide whether a safe execution order exists
    ///
    /// Repeatedly picks the first unfinished process, in declaration order,
    /// whose need is covered by the current work vector, returns its allocation
    /// to work and starts scanning again from the beginning.
    ///
    /// # Errors
    /// Returns `InvalidState` if any need is negative or the input is malformed.
    pub fn check(input: &BankerInput) -> Result<SafetyReport> {
        let need = input.need()?;
        let mut work = input.available.clone();
        let mut finished = vec![false; input.processes.len()];
        let mut sequence = Vec::with_capacity(input.processes.len());

        'scan: loop {
            for (i, process) in input.processes.iter().enumerate() {
                if finished[i] || !covers(&work, &need[i]) {
                    continue;
                }
                for (w, &a) in work.iter_mut().zip(&process.allocated) {
                    *w = w.saturating_add(a);
                }
                finished[i] = true;
                sequence.push(process.id.clone());
                continue 'scan;
            }
            break;
        }

        if sequence.len() == input.processes.len() {
            Ok(SafetyReport::Safe { sequence })
        } else {
            let blocked = input
                .processes
                .iter()
                .zip(&finished)
                .filter(|&(_, &done)| !done)
                .map(|(p, _)| p.id.clone())
                .collect();
            Ok(SafetyReport::Unsafe {
                finished: sequence,
                blocked,
            })
        }
    }

    /// Decide whether `request` by `process` may be granted right away
    ///
    /// # Errors
    /// Returns `InvalidState` if the request exceeds the process's remaining
    /// need, `UnknownProcess` if the process is not declared, or any error of
    /// [`SafetyChecker::check`].
    pub fn evaluate_request(
        input: &BankerInput,
        process: &str,
        request: &[u32],
    ) -> Result<RequestDecision> {
        let need = input.need()?;
        let index = input
            .processes
            .iter()
            .position(|p| p.id == process)
            .ok_or_else(|| SimError::UnknownProcess(process.to_string()))?;

        if request.len() != input.resources.len() {
            return Err(SimError::InvalidState(format!(
                "request has {} entries for {} resources",
                request.len(),
                input.resources.len()
            )));
        }
        if let Some(r) = (0..request.len()).find(|&r| request[r] > need[index][r]) {
            return Err(SimError::InvalidState(format!(
                "process `{process}` requests {} of `{}` but its remaining need is {}",
                request[r], input.resources[r], need[index][r]
            )));
        }
        if !covers(&input.available, request) {
            return Ok(RequestDecision::Wait {
                reason: WaitReason::Unavailable,
            });
        }

        let mut pretend = input.clone();
        for r in 0..request.len() {
            pretend.available[r] -= request[r];
            pretend.processes[index].allocated[r] += request[r];
        }

        Ok(match Self::check(&pretend)? {
            SafetyReport::Safe { sequence } => RequestDecision::Grant { sequence },
            SafetyReport::Unsafe { .. } => RequestDecision::Wait {
                reason: WaitReason::Unsafe,
            },
        })
    }
}

fn covers(work: &[u32], need: &[u32]) -> bool {
    need.iter().zip(work).all(|(n, w)| n <= w)
}

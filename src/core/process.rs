//! Per-process bookkeeping: what a process holds, what it waits for and,
//! in manual mode, the maximum it declared it may ever need.

use crate::core::error::{Result, SimError};
use crate::core::types::{ProcessId, ResourceId, Strategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Allocation record of one process
///
/// Counts of zero are never stored, so `held` and `requested` list exactly the
/// resources that have a backing edge in the allocation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessState {
    pub id: ProcessId,
    pub strategy: Strategy,
    held: BTreeMap<ResourceId, u32>,
    requested: BTreeMap<ResourceId, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_demand: Option<BTreeMap<ResourceId, u32>>,
}

impl ProcessState {
    pub fn new(id: impl Into<ProcessId>, strategy: Strategy) -> Self {
        ProcessState {
            id: id.into(),
            strategy,
            held: BTreeMap::new(),
            requested: BTreeMap::new(),
            max_demand: None,
        }
    }

    /// Declare the maximum demand used by the avoidance checks
    ///
    /// # Errors
    /// Returns `InvalidState` if something already held exceeds the declared maximum.
    pub fn with_max_demand(mut self, max_demand: BTreeMap<ResourceId, u32>) -> Result<Self> {
        for (resource, &count) in &self.held {
            let max = max_demand.get(resource).copied().unwrap_or(0);
            if count > max {
                return Err(SimError::InvalidState(format!(
                    "process `{}` holds {count} of `{resource}` but declared max {max}",
                    self.id
                )));
            }
        }
        self.max_demand = Some(max_demand.into_iter().filter(|&(_, c)| c > 0).collect());
        Ok(self)
    }

    pub fn held(&self) -> &BTreeMap<ResourceId, u32> {
        &self.held
    }

    pub fn requested(&self) -> &BTreeMap<ResourceId, u32> {
        &self.requested
    }

    pub fn max_demand(&self) -> Option<&BTreeMap<ResourceId, u32>> {
        self.max_demand.as_ref()
    }

    pub fn holds(&self, resource: &str) -> u32 {
        self.held.get(resource).copied().unwrap_or(0)
    }

    pub fn requests(&self, resource: &str) -> u32 {
        self.requested.get(resource).copied().unwrap_or(0)
    }

    /// Whether holding `units` more of `resource` stays within the declared maximum
    ///
    /// Always true for a process without a maximum demand.
    pub fn within_max(&self, resource: &str, units: u32) -> bool {
        match &self.max_demand {
            Some(max) => {
                let limit = max.get(resource).copied().unwrap_or(0);
                u64::from(self.holds(resource)) + u64::from(units) <= u64::from(limit)
            }
            None => true,
        }
    }

    /// The resource this process currently waits for, if any
    pub fn waiting_on(&self) -> Option<&str> {
        self.requested.keys().next().map(String::as_str)
    }

    pub fn is_waiting(&self) -> bool {
        !self.requested.is_empty()
    }

    /// Record `count` more held units of `resource`
    ///
    /// # Errors
    /// Returns `InvariantViolation` if this would exceed a declared maximum demand.
    pub fn grant(&mut self, resource: &str, count: u32) -> Result<()> {
        let next = self.holds(resource) + count;
        if let Some(max) = &self.max_demand {
            let limit = max.get(resource).copied().unwrap_or(0);
            if next > limit {
                return Err(SimError::invariant(format!(
                    "process `{}` would hold {next} of `{resource}`, above its max {limit}",
                    self.id
                )));
            }
        }
        if next > 0 {
            self.held.insert(resource.to_string(), next);
        }
        Ok(())
    }

    /// Drop `count` held units of `resource`
    ///
    /// # Returns
    /// Units still held afterwards
    ///
    /// # Errors
    /// Returns `InvariantViolation` if fewer than `count` units are held.
    pub fn revoke(&mut self, resource: &str, count: u32) -> Result<u32> {
        let held = self.holds(resource);
        if held < count {
            return Err(SimError::invariant(format!(
                "process `{}` releases {count} of `{resource}` but holds {held}",
                self.id
            )));
        }
        let left = held - count;
        if left == 0 {
            self.held.remove(resource);
        } else {
            self.held.insert(resource.to_string(), left);
        }
        Ok(left)
    }

    /// Drop everything held, returning what was dropped
    pub fn revoke_all(&mut self) -> BTreeMap<ResourceId, u32> {
        std::mem::take(&mut self.held)
    }

    /// Record an outstanding request for `count` units of `resource`
    pub fn add_request(&mut self, resource: &str, count: u32) {
        if count > 0 {
            *self.requested.entry(resource.to_string()).or_insert(0) += count;
        }
    }

    /// Forget the outstanding request for `resource`
    ///
    /// # Returns
    /// The number of units that were requested
    pub fn clear_request(&mut self, resource: &str) -> u32 {
        self.requested.remove(resource).unwrap_or(0)
    }

    pub fn clear_requests(&mut self) -> BTreeMap<ResourceId, u32> {
        std::mem::take(&mut self.requested)
    }
}

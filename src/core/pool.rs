//! Fixed pool of exclusive resources
//!
//! The pool keeps, per resource type, the total capacity and the number of
//! units currently available. `0 <= available <= capacity` holds after every
//! operation; an operation that would break it has no effect.
//!
//! The pool itself is not synchronized. The engine owns it behind the same
//! lock as the allocation graph, which makes every pool operation atomic with
//! respect to every other one.

use crate::core::error::{Result, SimError};
use crate::core::types::{Resource, ResourceId};
use fxhash::FxHashMap;
use serde::Serialize;

/// Capacity and availability of one resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub name: ResourceId,
    pub capacity: u32,
    pub available: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    capacity: u32,
    available: u32,
}

/// Resource types in declaration order with their available counts
#[derive(Debug, Clone)]
pub struct ResourcePool {
    order: Vec<ResourceId>,
    slots: FxHashMap<ResourceId, Slot>,
}

impl ResourcePool {
    /// Create a pool where every resource starts fully available
    ///
    /// # Errors
    /// Returns `InvariantViolation` if a resource name appears twice.
    pub fn new(resources: &[Resource]) -> Result<Self> {
        let mut pool = ResourcePool {
            order: Vec::with_capacity(resources.len()),
            slots: FxHashMap::default(),
        };
        for resource in resources {
            let slot = Slot {
                capacity: resource.capacity,
                available: resource.capacity,
            };
            if pool.slots.insert(resource.name.clone(), slot).is_some() {
                return Err(SimError::invariant(format!(
                    "resource `{}` declared twice",
                    resource.name
                )));
            }
            pool.order.push(resource.name.clone());
        }
        Ok(pool)
    }

    /// Try to take `count` units without waiting
    ///
    /// # Returns
    /// `true` if the units were taken; `false`, with nothing changed, if fewer
    /// than `count` units are available.
    ///
    /// # Errors
    /// Returns `UnknownResource` if the resource is not part of the pool.
    pub fn try_acquire(&mut self, resource: &str, count: u32) -> Result<bool> {
        let slot = self.slot_mut(resource)?;
        if slot.available >= count {
            slot.available -= count;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Give `count` units back to the pool
    ///
    /// # Errors
    /// Returns `InvariantViolation`, leaving the pool untouched, if the
    /// release would push `available` above `capacity`. That can only happen
    /// when the caller released something it never held.
    pub fn release(&mut self, resource: &str, count: u32) -> Result<()> {
        let slot = self.slot_mut(resource)?;
        match slot.available.checked_add(count) {
            Some(next) if next <= slot.capacity => {
                slot.available = next;
                Ok(())
            }
            _ => Err(SimError::invariant(format!(
                "releasing {count} unit(s) of `{resource}` exceeds capacity {} (available {})",
                slot.capacity, slot.available
            ))),
        }
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.slots.contains_key(resource)
    }

    pub fn available(&self, resource: &str) -> Option<u32> {
        self.slots.get(resource).map(|s| s.available)
    }

    pub fn capacity(&self, resource: &str) -> Option<u32> {
        self.slots.get(resource).map(|s| s.capacity)
    }

    /// Resource names in declaration order
    pub fn names(&self) -> &[ResourceId] {
        &self.order
    }

    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        self.order
            .iter()
            .filter_map(|name| {
                self.slots.get(name).map(|slot| ResourceSnapshot {
                    name: name.clone(),
                    capacity: slot.capacity,
                    available: slot.available,
                })
            })
            .collect()
    }

    fn slot_mut(&mut self, resource: &str) -> Result<&mut Slot> {
        self.slots
            .get_mut(resource)
            .ok_or_else(|| SimError::UnknownResource(resource.to_string()))
    }
}

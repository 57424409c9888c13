//! Graph module for deadlock detection
//!
//! This module contains the resource-allocation graph and the cycle
//! enumeration it relies on:
//! - Allocation graph: assignment (`resource -> process`) and request
//!   (`process -> resource`) edges
//! - Cycles: Johnson's elementary cycle enumeration over an index graph

mod allocation_graph;
mod cycles;

pub use allocation_graph::AllocationGraph;

//! # Ragwatch
//!
//! A deadlock simulator built around a resource-allocation graph.
//!
//! Ragwatch runs concurrent process actors that compete for a fixed pool of
//! exclusive resources, records every hold and wait as an edge of the
//! resource-allocation graph, and lets callers detect, explain and break the
//! circular waits that form.
//!
//! ## Features
//!
//! - Threaded actors with `normal` and `prevention` strategies, or
//!   deterministic single-step simulation with an injected random source
//! - Enumeration of every elementary cycle of the allocation graph
//! - Banker's algorithm safety checks over manual-mode scenarios
//! - Resolution by preemption, termination or deferred avoidance, each with a
//!   plain-language rationale
//! - An append-only event stream with an optional JSON-lines log file
//!
//! ## Example
//!
//! ```no_run
//! use ragwatch::{Ragwatch, SimTiming, default_actors};
//! use std::time::Duration;
//!
//! let mut engine = Ragwatch::new()
//!     .seed(7)
//!     .timing(SimTiming::quick())
//!     .callback(|report| println!("{} circular wait(s)", report.cycles.len()))
//!     .monitor(Duration::from_millis(50))
//!     .auto_resolve(true)
//!     .build()?;
//!
//! engine.start(default_actors())?;
//! std::thread::sleep(Duration::from_millis(500));
//! engine.stop()?;
//! println!("{:?}", engine.stats());
//! # Ok::<(), anyhow::Error>(())
//! ```

mod core;
pub use crate::core::{
    ActorSpec, BankerInput, Cycle, DEFAULT_MONITOR_INTERVAL, DeadlockCallback, DeadlockDetector,
    DeadlockReport, Edge, EdgeKind, Event, EventKind, FirstInCycle, MonitorConfig, Node,
    ProcessId, Ragwatch, RequestDecision, Resolution, ResolutionAction, Resolver, Resource,
    ResourceId, Result, SafetyChecker, SafetyReport, Scenario, SimError, SimTiming,
    SimulationConfig, SimulationEngine, Strategy, ValidationError, VictimPolicy, WaitReason,
    default_actors, default_resources,
};
pub use crate::core::{banker, engine, graph, logger, pool, process, scenario};
pub use crate::core::engine::{Stats, SystemSnapshot, TurnOutcome};
pub use crate::core::graph::AllocationGraph;
pub use crate::core::pool::ResourceSnapshot;
pub use crate::core::process::ProcessState;

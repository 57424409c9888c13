//! Simulation engine
//!
//! The engine is the single owner of the resource pool, the allocation graph,
//! the process table and the event log. Nothing outside this module touches
//! them directly: threaded actors, the deadlock monitor and callers all go
//! through the synchronized operations below, each of which takes the one
//! state lock for a short, bounded critical section.
//!
//! # Actor lifecycle
//!
//! 1. `start` registers every actor's process, then spawns one thread per actor
//! 2. Each actor repeatedly runs a turn (see [`TurnOutcome`]) and sleeps
//! 3. `stop` disconnects the stop channel, joins every thread and retires
//!    whatever a crashed actor left behind
//! 4. The engine reports stopped only once no process of the run holds anything

mod actor;
pub(crate) mod state;

pub use state::{Stats, SystemSnapshot, TurnOutcome};

use crate::core::banker::{BankerInput, SafetyChecker, SafetyReport};
use crate::core::config::SimulationConfig;
use crate::core::detector::{self, DeadlockDetector};
use crate::core::error::{Result, SimError};
use crate::core::graph::AllocationGraph;
use crate::core::logger::{EventLog, EventSink, SinkRecord};
use crate::core::pool::{ResourcePool, ResourceSnapshot};
use crate::core::process::ProcessState;
use crate::core::resolver::{self, Resolution, Resolver};
use crate::core::scenario::Scenario;
use crate::core::types::{Cycle, DeadlockReport, Edge, Event, ProcessId, Resource, Strategy};
use actor::Actor;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use state::SystemState;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Callback invoked by the monitor for every positive detection pass
pub type DeadlockCallback = Arc<dyn Fn(DeadlockReport) + Send + Sync>;

/// A process to run as a threaded actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSpec {
    pub id: ProcessId,
    pub strategy: Strategy,
}

impl ActorSpec {
    pub fn new(id: impl Into<ProcessId>, strategy: Strategy) -> Self {
        ActorSpec {
            id: id.into(),
            strategy,
        }
    }
}

/// `P1` normal, `P2` prevention, `P3` normal
pub fn default_actors() -> Vec<ActorSpec> {
    vec![
        ActorSpec::new("P1", Strategy::Normal),
        ActorSpec::new("P2", Strategy::Prevention),
        ActorSpec::new("P3", Strategy::Normal),
    ]
}

/// State shared between the engine, its actors and its monitor
pub(crate) struct Shared {
    pub(crate) state: Mutex<SystemState>,
}

impl Shared {
    /// Release everything `process` holds and remove it, if it still exists
    pub(crate) fn retire(&self, process: &str) {
        let mut state = self.state.lock();
        if state.contains(process)
            && let Err(e) = state.remove_process(process, false)
        {
            tracing::error!(%process, "failed to retire process: {e}");
        }
    }

    /// Plan and apply a resolution under a single lock acquisition
    pub(crate) fn resolve(&self, resolver: &Resolver, cycle: &Cycle) -> Result<Resolution> {
        let mut state = self.state.lock();
        let resolution = resolver.plan(cycle, &state.graph, &state.processes);
        resolver::apply(&mut state, &resolution)?;
        if let Some(sink) = state.events.sink() {
            sink.write(SinkRecord::Resolution(resolution.clone()));
        }
        tracing::info!(cycle = %cycle, "{}", resolution.rationale);
        Ok(resolution)
    }

    pub(crate) fn graph_snapshot(&self) -> AllocationGraph {
        self.state.lock().graph.clone()
    }

    pub(crate) fn record_deadlock(&self, report: &DeadlockReport) {
        let state = self.state.lock();
        if let Some(sink) = state.events.sink() {
            sink.write(SinkRecord::Deadlock(report.clone()));
        }
    }
}

/// Threads of one running simulation
struct Run {
    /// Dropped to signal every actor and the monitor
    stop: Sender<()>,
    actors: Vec<(ProcessId, JoinHandle<()>)>,
    monitor: Option<JoinHandle<()>>,
}

/// Owner of the simulated system
pub struct SimulationEngine {
    shared: Arc<Shared>,
    config: SimulationConfig,
    resolver: Arc<Resolver>,
    callback: Option<DeadlockCallback>,
    run: Option<Run>,
}

impl SimulationEngine {
    /// Create an engine over `config.resources` with no processes and no log file
    ///
    /// # Errors
    /// Returns `InvariantViolation` if a resource name is declared twice.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_parts(config, None, Resolver::default(), None)
    }

    pub(crate) fn with_parts(
        config: SimulationConfig,
        sink: Option<EventSink>,
        resolver: Resolver,
        callback: Option<DeadlockCallback>,
    ) -> Result<Self> {
        let pool = ResourcePool::new(&config.resources)?;
        let events = match sink {
            Some(sink) => EventLog::with_sink(sink),
            None => EventLog::new(),
        };
        Ok(SimulationEngine {
            shared: Arc::new(Shared {
                state: Mutex::new(SystemState::new(pool, events)),
            }),
            config,
            resolver: Arc::new(resolver),
            callback,
            run: None,
        })
    }

    /// Create an engine holding a validated manual-mode scenario
    ///
    /// Each declared process gets its maximum demand, its allocation (taken
    /// from the pool) and a request edge for every non-zero requested count.
    /// `config.resources` is replaced by the scenario's resources.
    ///
    /// # Errors
    /// Returns an error if the scenario cannot be installed; no engine is
    /// created in that case.
    pub fn from_scenario(scenario: &Scenario, config: SimulationConfig) -> Result<Self> {
        Self::with_scenario(scenario, config, None, Resolver::default(), None)
    }

    pub(crate) fn with_scenario(
        scenario: &Scenario,
        mut config: SimulationConfig,
        sink: Option<EventSink>,
        resolver: Resolver,
        callback: Option<DeadlockCallback>,
    ) -> Result<Self> {
        config.resources = scenario.resources.clone();
        let engine = Self::with_parts(config, sink, resolver, callback)?;
        {
            let mut state = engine.shared.state.lock();
            for process in &scenario.processes {
                let max: BTreeMap<String, u32> = scenario
                    .resources
                    .iter()
                    .zip(&process.max)
                    .map(|(r, &m)| (r.name.clone(), m))
                    .collect();
                state.add_process(
                    ProcessState::new(process.id.clone(), Strategy::Normal).with_max_demand(max)?,
                )?;

                for (resource, &count) in scenario.resources.iter().zip(&process.allocated) {
                    if count > 0 && !state.acquire(&process.id, &resource.name, count)? {
                        return Err(SimError::invariant(format!(
                            "scenario allocates more `{}` than its capacity",
                            resource.name
                        )));
                    }
                }
                for (resource, &count) in scenario.resources.iter().zip(&process.requested) {
                    if count > 0 {
                        state.wait(&process.id, &resource.name, count)?;
                    }
                }
            }
        }
        Ok(engine)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Register a process that is driven through [`SimulationEngine::step`]
    pub fn add_process(&self, id: impl Into<ProcessId>, strategy: Strategy) -> Result<()> {
        self.shared
            .state
            .lock()
            .add_process(ProcessState::new(id, strategy))
    }

    /// Run one actor turn for `process` synchronously
    ///
    /// Threaded actors run exactly this turn; calling it directly with a
    /// seeded random source makes a simulation fully deterministic.
    pub fn step<R: Rng>(&self, process: &str, rng: &mut R) -> Result<TurnOutcome> {
        self.shared
            .state
            .lock()
            .turn(process, rng, self.config.release_chance)
    }

    /// Release everything `process` holds and remove it
    ///
    /// # Errors
    /// Returns `UnknownProcess` if there is no such process.
    pub fn remove_process(&self, process: &str) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.remove_process(process, false).map(|_| ())
    }

    /// Start one thread per actor
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if a run is in progress, `DuplicateProcess` if
    /// an actor name is taken, or `Spawn` if a thread could not be created.
    /// Nothing is left registered on error.
    pub fn start(&mut self, actors: Vec<ActorSpec>) -> Result<()> {
        if self.run.is_some() {
            return Err(SimError::AlreadyRunning);
        }

        {
            let mut state = self.shared.state.lock();
            for (i, spec) in actors.iter().enumerate() {
                if state.contains(&spec.id) || actors[..i].iter().any(|a| a.id == spec.id) {
                    return Err(SimError::DuplicateProcess(spec.id.clone()));
                }
            }
            for spec in &actors {
                state.add_process(ProcessState::new(spec.id.clone(), spec.strategy))?;
            }
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let mut run = Run {
            stop: stop_tx,
            actors: Vec::with_capacity(actors.len()),
            monitor: None,
        };

        for (i, spec) in actors.iter().enumerate() {
            let rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                None => StdRng::seed_from_u64(rand::random()),
            };
            let actor = Actor {
                shared: Arc::clone(&self.shared),
                id: spec.id.clone(),
                rng,
                timing: self.config.timing,
                release_chance: self.config.release_chance,
                stop: stop_rx.clone(),
            };
            match thread::Builder::new()
                .name(format!("actor-{}", spec.id))
                .spawn(move || actor.run())
            {
                Ok(handle) => run.actors.push((spec.id.clone(), handle)),
                Err(e) => {
                    self.shutdown(run);
                    for spec in &actors[i..] {
                        self.shared.retire(&spec.id);
                    }
                    return Err(SimError::Spawn(e.to_string()));
                }
            }
        }

        if let Some(monitor) = self.config.monitor {
            let handle = detector::spawn_monitor(
                Arc::clone(&self.shared),
                Arc::clone(&self.resolver),
                monitor,
                self.callback.clone(),
                stop_rx,
            );
            match handle {
                Ok(handle) => run.monitor = Some(handle),
                Err(e) => {
                    self.shutdown(run);
                    return Err(SimError::Spawn(e.to_string()));
                }
            }
        }

        let names: Vec<&str> = actors.iter().map(|a| a.id.as_str()).collect();
        tracing::info!("simulation started with {}", names.join(", "));
        self.run = Some(run);
        Ok(())
    }

    /// Signal every actor, wait for all of them and verify the final state
    ///
    /// Does nothing if no run is in progress.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the state left behind is inconsistent.
    pub fn stop(&mut self) -> Result<()> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };
        self.shutdown(run);
        self.verify()?;
        tracing::info!("simulation stopped");
        Ok(())
    }

    fn shutdown(&self, run: Run) {
        drop(run.stop);
        if let Some(monitor) = run.monitor
            && monitor.join().is_err()
        {
            tracing::warn!("deadlock monitor panicked");
        }
        for (id, handle) in run.actors {
            if handle.join().is_err() {
                tracing::warn!(process = %id, "actor panicked");
            }
            self.shared.retire(&id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Current RAG edge list
    pub fn edges(&self) -> Vec<Edge> {
        self.shared.state.lock().graph.edges()
    }

    /// Current per-resource capacity and availability
    pub fn resources(&self) -> Vec<ResourceSnapshot> {
        self.shared.state.lock().pool.snapshot()
    }

    /// Current per-process held/requested/max records
    pub fn processes(&self) -> Vec<ProcessState> {
        self.shared.state.lock().processes.clone()
    }

    pub fn process(&self, id: &str) -> Option<ProcessState> {
        self.shared.state.lock().process(id).cloned()
    }

    /// Full event stream, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.shared.state.lock().events.all().to_vec()
    }

    /// The last `n` events, oldest first
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.shared.state.lock().events.recent(n).to_vec()
    }

    /// Events with a sequence number of at least `seq`
    pub fn events_since(&self, seq: u64) -> Vec<Event> {
        self.shared.state.lock().events.since(seq).to_vec()
    }

    pub fn stats(&self) -> Stats {
        self.shared.state.lock().stats
    }

    /// Everything above, taken under one lock acquisition
    pub fn snapshot(&self) -> SystemSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Copy of the allocation graph, consistent with the pool at this instant
    pub fn graph_snapshot(&self) -> AllocationGraph {
        self.shared.graph_snapshot()
    }

    /// Check the bidirectional edge invariant and the pool bound
    pub fn verify(&self) -> Result<()> {
        let result = self.snapshot().verify();
        if let Err(e) = &result {
            tracing::error!("{e}");
        }
        result
    }

    /// Run deadlock detection on the current graph
    pub fn detect(&self) -> Vec<Cycle> {
        DeadlockDetector::detect(self)
    }

    /// Resolve `cycle` with the configured resolver
    pub fn resolve(&self, cycle: &Cycle) -> Result<Resolution> {
        self.shared.resolve(&self.resolver, cycle)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Banker's input built from the live pool and process table
    ///
    /// # Errors
    /// Returns `InvalidState` if a process has no declared maximum demand.
    pub fn banker_input(&self) -> Result<BankerInput> {
        let state = self.shared.state.lock();
        let names = state.pool.names().to_vec();
        let available = names
            .iter()
            .map(|r| state.pool.available(r).unwrap_or(0))
            .collect();

        let mut input = BankerInput::new(names.clone(), available);
        for p in &state.processes {
            let max = p.max_demand().ok_or_else(|| {
                SimError::InvalidState(format!(
                    "process `{}` has no declared maximum demand",
                    p.id
                ))
            })?;
            input = input.process(
                p.id.clone(),
                names.iter().map(|r| max.get(r).copied().unwrap_or(0)).collect(),
                names.iter().map(|r| p.holds(r)).collect(),
            );
        }
        Ok(input)
    }

    /// Banker's safety check over the live process table
    pub fn safety_check(&self) -> Result<SafetyReport> {
        SafetyChecker::check(&self.banker_input()?)
    }

    /// Block until every queued log record has reached the log file
    ///
    /// The state lock is released before waiting on the writer thread, so
    /// actors and the monitor keep running during the flush.
    pub fn flush_log(&self) -> anyhow::Result<()> {
        let sink = self.shared.state.lock().events.sink_handle();
        match sink {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Resource declarations this engine was built with
    pub fn declared_resources(&self) -> &[Resource] {
        &self.config.resources
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("simulation did not stop cleanly: {e}");
        }
    }
}

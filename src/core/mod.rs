// Core types
pub mod types;
pub use types::*;

pub mod error;
pub use error::{Result, SimError, ValidationError};

pub mod config;
pub use config::{MonitorConfig, SimTiming, SimulationConfig};

// Event stream and log file
pub mod logger;

pub mod pool;
pub mod process;

// Resource-allocation graph
pub mod graph;

pub mod banker;
pub mod detector;
pub mod engine;
pub mod resolver;
pub mod scenario;

pub use banker::{BankerInput, RequestDecision, SafetyChecker, SafetyReport, WaitReason};
pub use detector::DeadlockDetector;
pub use engine::{ActorSpec, DeadlockCallback, SimulationEngine, default_actors};
pub use resolver::{FirstInCycle, Resolution, ResolutionAction, Resolver, VictimPolicy};
pub use scenario::Scenario;

use anyhow::Context;
use logger::EventSink;
use std::sync::Arc;
use std::time::Duration;

/// Detection interval used when auto-resolution is requested without one
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Ragwatch configuration struct
pub struct Ragwatch {
    config: SimulationConfig,
    log_path: Option<String>,
    monitor_interval: Option<Duration>,
    auto_resolve: bool,
    callback: Option<DeadlockCallback>,
    resolver: Resolver,
}

impl Default for Ragwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Ragwatch {
    /// Create a new Ragwatch with default settings
    ///
    /// By default:
    /// - Resources are `Printer`, `Disk` and `Tape`, one unit each
    /// - Logging to a file is disabled
    /// - No monitor runs; detection happens only on demand
    /// - Deadlocks are resolved by terminating the first process of the cycle
    pub fn new() -> Self {
        Ragwatch {
            config: SimulationConfig::default(),
            log_path: None,
            monitor_interval: None,
            auto_resolve: false,
            callback: None,
            resolver: Resolver::default(),
        }
    }

    /// Replace the simulated resources
    pub fn resources(mut self, resources: Vec<Resource>) -> Self {
        self.config.resources = resources;
        self
    }

    /// Activate the log file and set its path
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the path contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    ///
    /// # Returns
    /// The builder for method chaining
    pub fn with_log<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Seed the actor random sources for a reproducible run
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn timing(mut self, timing: SimTiming) -> Self {
        self.config.timing = timing;
        self
    }

    /// Set the per-turn chance that an actor finishes its work
    ///
    /// Values are clamped to `0.0..=1.0`.
    pub fn release_chance(mut self, chance: f64) -> Self {
        self.config.release_chance = chance.clamp(0.0, 1.0);
        self
    }

    /// Run a detection pass every `interval` while the simulation runs
    pub fn monitor(mut self, interval: Duration) -> Self {
        self.monitor_interval = Some(interval);
        self
    }

    /// Resolve the first cycle of every positive monitor pass
    ///
    /// Starts the monitor at [`DEFAULT_MONITOR_INTERVAL`] if no interval was set.
    pub fn auto_resolve(mut self, enabled: bool) -> Self {
        self.auto_resolve = enabled;
        self
    }

    /// Set a custom callback to be invoked when the monitor detects a deadlock
    ///
    /// # Arguments
    /// * `callback` - Function to call with every positive detection report
    ///
    /// # Returns
    /// The builder for method chaining
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeadlockReport) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Choose which process a termination removes
    pub fn victim_policy<P: VictimPolicy + 'static>(mut self, policy: P) -> Self {
        self.resolver = Resolver::with_policy(policy);
        self
    }

    /// Create the simulation engine with the configured settings
    ///
    /// # Errors
    /// Returns an error if the log file cannot be created or the resource
    /// list is invalid
    pub fn build(self) -> anyhow::Result<SimulationEngine> {
        let (config, sink, resolver, callback) = self.into_parts()?;
        SimulationEngine::with_parts(config, sink, resolver, callback)
            .context("Failed to create simulation engine")
    }

    /// Create a simulation engine holding a manual-mode scenario
    ///
    /// The scenario's resources replace any set with [`Ragwatch::resources`].
    ///
    /// # Errors
    /// Returns an error if the log file cannot be created or the scenario
    /// cannot be installed
    pub fn build_scenario(self, scenario: &Scenario) -> anyhow::Result<SimulationEngine> {
        let (config, sink, resolver, callback) = self.into_parts()?;
        SimulationEngine::with_scenario(scenario, config, sink, resolver, callback)
            .context("Failed to load scenario")
    }

    #[allow(clippy::type_complexity)]
    fn into_parts(
        self,
    ) -> anyhow::Result<(SimulationConfig, Option<EventSink>, Resolver, Option<DeadlockCallback>)> {
        let mut config = self.config;
        let interval = match (self.monitor_interval, self.auto_resolve) {
            (Some(interval), _) => Some(interval),
            (None, true) => Some(DEFAULT_MONITOR_INTERVAL),
            (None, false) => None,
        };
        config.monitor = interval.map(|interval| MonitorConfig {
            interval,
            auto_resolve: self.auto_resolve,
        });

        let sink = match self.log_path {
            Some(path) => {
                Some(EventSink::with_file(path).context("Failed to initialize event log")?)
            }
            None => None,
        };
        Ok((config, sink, self.resolver, self.callback))
    }
}

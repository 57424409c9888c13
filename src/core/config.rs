use crate::core::types::{Resource, default_resources};
use std::time::Duration;

/// Bounded waits of a threaded actor
///
/// None of these may be infinite: an actor has to come back to its loop to
/// notice a stop signal or a resolution applied from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    /// Pause after a refused request before the next turn
    pub retry_wait: Duration,
    /// Lower bound of the randomized pause between turns
    pub jitter_min: Duration,
    /// Upper bound of the randomized pause between turns
    pub jitter_max: Duration,
}

impl Default for SimTiming {
    fn default() -> Self {
        SimTiming {
            retry_wait: Duration::from_millis(100),
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(500),
        }
    }
}

impl SimTiming {
    /// Millisecond-scale timing for tests and quick demos
    pub fn quick() -> Self {
        SimTiming {
            retry_wait: Duration::from_millis(2),
            jitter_min: Duration::from_millis(1),
            jitter_max: Duration::from_millis(5),
        }
    }
}

/// Periodic detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Resolve the first detected cycle after every positive pass
    pub auto_resolve: bool,
}

/// Configuration of a simulation engine
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub resources: Vec<Resource>,
    pub timing: SimTiming,
    /// Seed of the actor random sources; actor `i` uses `seed + i`
    pub seed: Option<u64>,
    /// Chance, per turn that does not end in a wait, that an actor finishes
    /// its work and releases everything it holds
    pub release_chance: f64,
    pub monitor: Option<MonitorConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            resources: default_resources(),
            timing: SimTiming::default(),
            seed: None,
            release_chance: 0.2,
            monitor: None,
        }
    }
}

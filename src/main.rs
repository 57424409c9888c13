use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragwatch::{
    ActorSpec, Ragwatch, SafetyChecker, Scenario, SimTiming, SimulationConfig, SimulationEngine,
    Strategy, default_actors,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Ragwatch - Resource-Allocation Graph Deadlock Simulator"
)]
struct Cli {
    /// Increase diagnostic output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run threaded actors and print the event stream
    Run {
        /// Actor as NAME or NAME:STRATEGY (normal, prevention); repeatable
        #[arg(short, long = "actor", value_parser = parse_actor)]
        actors: Vec<ActorSpec>,

        /// How long to run, in milliseconds
        #[arg(short, long, default_value_t = 3000)]
        duration: u64,

        /// Seed for reproducible actor choices
        #[arg(long)]
        seed: Option<u64>,

        /// Chance per turn that an actor finishes and releases everything
        #[arg(long, default_value_t = 0.2)]
        release_chance: f64,

        /// Run detection every N milliseconds
        #[arg(long)]
        monitor: Option<u64>,

        /// Resolve detected deadlocks automatically
        #[arg(long)]
        auto_resolve: bool,

        /// Millisecond-scale pauses instead of the default 100-500 ms
        #[arg(long)]
        quick: bool,

        /// Write the event stream as JSON lines; "{timestamp}" is expanded
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Validate a manual-mode scenario, check its safety and look for deadlocks
    Check {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Resolve every detected deadlock and show the result
        #[arg(long)]
        resolve: bool,
    },
}

fn parse_actor(s: &str) -> std::result::Result<ActorSpec, String> {
    let (name, strategy) = match s.split_once(':') {
        Some((name, strategy)) => (name.trim(), strategy.parse::<Strategy>()?),
        None => (s.trim(), Strategy::Normal),
    };
    if name.is_empty() {
        return Err("actor name must not be empty".into());
    }
    Ok(ActorSpec::new(name, strategy))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ragwatch=info".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Command::Run {
            actors,
            duration,
            seed,
            release_chance,
            monitor,
            auto_resolve,
            quick,
            log,
        } => {
            let mut builder = Ragwatch::new()
                .release_chance(release_chance)
                .auto_resolve(auto_resolve)
                .callback(|report| {
                    for cycle in &report.cycles {
                        println!("[Deadlock] {cycle}");
                    }
                });
            if let Some(seed) = seed {
                builder = builder.seed(seed);
            }
            if let Some(ms) = monitor {
                builder = builder.monitor(Duration::from_millis(ms));
            }
            if quick {
                builder = builder.timing(SimTiming::quick());
            }
            if let Some(path) = log {
                builder = builder.with_log(path);
            }
            let actors = if actors.is_empty() { default_actors() } else { actors };
            run(builder.build()?, actors, Duration::from_millis(duration))
        }
        Command::Check { scenario, resolve } => check(&scenario, resolve),
    }
}

fn run(mut engine: SimulationEngine, actors: Vec<ActorSpec>, duration: Duration) -> Result<()> {
    engine.start(actors).context("Failed to start simulation")?;

    let deadline = Instant::now() + duration;
    let mut next = 0;
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
        for event in engine.events_since(next) {
            println!("{event}");
            next = event.seq + 1;
        }
    }

    let cycles = engine.detect();
    engine.stop().context("Simulation did not stop cleanly")?;
    for event in engine.events_since(next) {
        println!("{event}");
    }

    if cycles.is_empty() {
        println!("No deadlock at the end of the run.");
    }
    for cycle in &cycles {
        println!("[Deadlock at stop] {cycle}");
    }
    let stats = engine.stats();
    println!(
        "turns: {}, acquisitions: {}, waits: {}, releases: {}, deadlocks resolved: {}",
        stats.turns, stats.acquisitions, stats.waits, stats.releases, stats.deadlocks_resolved
    );
    engine.flush_log()
}

fn check(path: &Path, resolve: bool) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario = Scenario::from_json(&json)?;

    let report = SafetyChecker::check(&scenario.banker_input())?;
    println!("{}", report.describe());

    let engine = SimulationEngine::from_scenario(&scenario, SimulationConfig::default())?;
    let cycles = engine.detect();
    if cycles.is_empty() {
        println!("No deadlock detected.");
        return Ok(());
    }
    for cycle in &cycles {
        println!("[Deadlock] {cycle}");
    }

    if resolve {
        for cycle in &cycles {
            let resolution = engine.resolve(cycle)?;
            println!("[Resolution] {}", resolution.rationale);
        }
        let left = engine.detect();
        println!("{} deadlock(s) remain after resolution.", left.len());
    }
    Ok(())
}

use ragwatch::{DeadlockReport, Ragwatch, Scenario, SimTiming, SimulationEngine};
use std::sync::{Arc, Mutex as StdMutex, mpsc};
use std::time::Duration;

#[allow(dead_code)]
pub const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(3);
#[allow(dead_code)]
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(20);

/// P1 holds Printer and waits for Disk, P2 holds Disk and waits for Printer
#[allow(dead_code)]
pub const TWO_WAY: &str = r#"{
    "process_count": 2,
    "resources": [
        { "name": "Printer", "capacity": 1 },
        { "name": "Disk", "capacity": 1 }
    ],
    "processes": [
        { "max": "1,1", "allocated": "1,0", "requested": "0,1" },
        { "max": "1,1", "allocated": "0,1", "requested": "1,0" }
    ]
}"#;

/// P1 -> Disk -> P2 -> Tape -> P3 -> Printer -> P1
#[allow(dead_code)]
pub const THREE_WAY: &str = r#"{
    "process_count": 3,
    "resources": [
        { "name": "Printer", "capacity": 1 },
        { "name": "Disk", "capacity": 1 },
        { "name": "Tape", "capacity": 1 }
    ],
    "processes": [
        { "max": "1,1,0", "allocated": "1,0,0", "requested": "0,1,0" },
        { "max": "0,1,1", "allocated": "0,1,0", "requested": "0,0,1" },
        { "max": "1,0,1", "allocated": "0,0,1", "requested": "1,0,0" }
    ]
}"#;

#[allow(dead_code)]
pub fn load(json: &str) -> SimulationEngine {
    let scenario = Scenario::from_json(json).expect("scenario should be valid");
    SimulationEngine::from_scenario(&scenario, Default::default()).expect("scenario should load")
}

#[allow(dead_code)]
pub struct MonitorHarness {
    pub engine: SimulationEngine,
    pub rx: mpsc::Receiver<DeadlockReport>,
    pub detected: Arc<StdMutex<bool>>,
}

/// Engine loaded with `json` whose monitor reports into a channel
#[allow(dead_code)]
pub fn start_monitor(json: &str, auto_resolve: bool) -> MonitorHarness {
    let (tx, rx) = mpsc::channel::<DeadlockReport>();
    let detected = Arc::new(StdMutex::new(false));
    let flag = Arc::clone(&detected);
    let tx = StdMutex::new(tx);

    let scenario = Scenario::from_json(json).expect("scenario should be valid");
    let mut engine = Ragwatch::new()
        .timing(SimTiming::quick())
        .monitor(MONITOR_INTERVAL)
        .auto_resolve(auto_resolve)
        .callback(move |report| {
            *flag.lock().unwrap() = true;
            let _ = tx.lock().unwrap().send(report);
        })
        .build_scenario(&scenario)
        .expect("Failed to initialize engine");
    engine.start(Vec::new()).expect("Failed to start monitor");

    MonitorHarness {
        engine,
        rx,
        detected,
    }
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &MonitorHarness, timeout: Duration) -> DeadlockReport {
    match h.rx.recv_timeout(timeout) {
        Ok(report) => {
            assert!(*h.detected.lock().unwrap(), "Deadlock flag should be set");
            report
        }
        Err(_) => panic!("No deadlock detected within {timeout:?}"),
    }
}

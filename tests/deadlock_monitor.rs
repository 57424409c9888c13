use std::thread;
use std::time::Duration;
mod common;
use common::{DEADLOCK_TIMEOUT, THREE_WAY, TWO_WAY, expect_deadlock, start_monitor};

#[test]
fn test_monitor_reports_loaded_deadlock() {
    let mut harness = start_monitor(TWO_WAY, false);

    let report = expect_deadlock(&harness, DEADLOCK_TIMEOUT);
    assert_eq!(report.cycles.len(), 1);
    assert!(report.cycles[0].contains_process("P1"));
    assert!(report.cycles[0].contains_process("P2"));
    assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());

    // Without auto-resolution the deadlock stays
    harness.engine.stop().unwrap();
    assert_eq!(harness.engine.detect().len(), 1);
    assert_eq!(harness.engine.stats().deadlocks_resolved, 0);
}

#[test]
fn test_monitor_auto_resolves() {
    let mut harness = start_monitor(THREE_WAY, true);

    let report = expect_deadlock(&harness, DEADLOCK_TIMEOUT);
    assert_eq!(report.cycles.len(), 1);

    // Give the monitor time to apply the resolution after the callback ran
    let mut waited = Duration::ZERO;
    while harness.engine.stats().deadlocks_resolved == 0 && waited < DEADLOCK_TIMEOUT {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    harness.engine.stop().unwrap();
    let stats = harness.engine.stats();
    assert!(stats.deadlocks_resolved >= 1);
    assert_eq!(stats.terminations, 1);
    assert!(harness.engine.detect().is_empty());
    assert!(harness.engine.process("P1").is_none());
    harness.engine.verify().unwrap();
}

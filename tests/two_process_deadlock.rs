use ragwatch::{Edge, ResolutionAction};
mod common;
use common::{TWO_WAY, load};

#[test]
fn test_two_process_cycle_is_detected_once() {
    let engine = load(TWO_WAY);

    let cycles = engine.detect();
    assert_eq!(cycles.len(), 1);
    let cycle = &cycles[0];
    assert!(cycle.contains_process("P1"));
    assert!(cycle.contains_process("P2"));
    assert_eq!(cycle.to_string(), "P1 -> Disk -> P2 -> Printer -> P1");

    let edges = cycle.edges().unwrap();
    assert_eq!(
        edges,
        vec![
            Edge::request("P1", "Disk"),
            Edge::assignment("Disk", "P2"),
            Edge::request("P2", "Printer"),
            Edge::assignment("Printer", "P1"),
        ]
    );
}

#[test]
fn test_preemption_breaks_two_process_cycle() {
    let engine = load(TWO_WAY);
    let cycle = engine.detect().remove(0);

    let resolution = engine.resolve(&cycle).unwrap();
    assert_eq!(
        resolution.action,
        ResolutionAction::Preempt {
            resource: "Disk".into(),
            from: "P2".into(),
            to: "P1".into(),
        }
    );

    assert!(engine.detect().is_empty());
    let p1 = engine.process("P1").unwrap();
    assert_eq!(p1.holds("Disk"), 1);
    assert_eq!(p1.holds("Printer"), 1);
    assert!(!p1.is_waiting());
    assert!(engine.process("P2").unwrap().held().is_empty());
    engine.verify().unwrap();

    let stats = engine.stats();
    assert_eq!(stats.preemptions, 1);
    assert_eq!(stats.deadlocks_resolved, 1);
}

#[test]
fn test_resolving_a_stale_cycle_changes_nothing() {
    let engine = load(TWO_WAY);
    let cycle = engine.detect().remove(0);
    engine.resolve(&cycle).unwrap();
    let before = engine.snapshot();

    let again = engine.resolve(&cycle).unwrap();
    assert!(matches!(again.action, ResolutionAction::Avoid { .. }));
    assert!(!again.rationale.is_empty());

    let after = engine.snapshot();
    assert_eq!(after.edges, before.edges);
    assert_eq!(after.resources, before.resources);
    assert_eq!(after.stats.deferrals, 1);
}

#[test]
fn test_dag_has_no_cycle() {
    let engine = load(
        r#"{
            "process_count": 1,
            "resources": [
                { "name": "Printer", "capacity": 1 },
                { "name": "Disk", "capacity": 1 }
            ],
            "processes": [
                { "max": "1,1", "allocated": "1,0", "requested": "0,1" }
            ]
        }"#,
    );
    assert_eq!(
        engine.edges(),
        vec![Edge::assignment("Printer", "P1"), Edge::request("P1", "Disk")]
    );
    assert!(engine.detect().is_empty());
}

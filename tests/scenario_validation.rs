use ragwatch::{Resource, Scenario, SimError, SimulationEngine, scenario::ScenarioProcess};
mod common;
use common::{TWO_WAY, load};

#[test]
fn test_allocated_above_max_is_rejected_by_field() {
    let json = r#"{
        "process_count": 1,
        "resources": [
            { "name": "Printer", "capacity": 3 },
            { "name": "Disk", "capacity": 3 },
            { "name": "Tape", "capacity": 3 }
        ],
        "processes": [
            { "max": "1,0,0", "allocated": "2,0,0" }
        ]
    }"#;

    match Scenario::from_json(json) {
        Err(SimError::Validation(e)) => {
            assert_eq!(e.field, "processes[0].allocated[0]");
            assert!(e.message.contains("exceeds max"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_rejected_scenario_leaves_running_engine_untouched() {
    let engine = load(TWO_WAY);
    let before = engine.snapshot();
    let events = engine.events().len();

    let bad = TWO_WAY.replace(r#""allocated": "1,0""#, r#""allocated": "x,0""#);
    assert!(matches!(Scenario::from_json(&bad), Err(SimError::Validation(_))));

    let after = engine.snapshot();
    assert_eq!(after.edges, before.edges);
    assert_eq!(after.resources, before.resources);
    assert_eq!(engine.events().len(), events);
}

#[test]
fn test_unchecked_overcommitted_scenario_creates_no_engine() {
    let scenario = Scenario {
        resources: vec![Resource::new("Printer", 1), Resource::new("Disk", 1)],
        processes: vec![
            ScenarioProcess {
                id: "P1".into(),
                max: vec![1, 0],
                allocated: vec![1, 0],
                requested: vec![0, 0],
            },
            ScenarioProcess {
                id: "P2".into(),
                max: vec![1, 0],
                allocated: vec![1, 0],
                requested: vec![0, 0],
            },
        ],
    };
    assert!(matches!(
        SimulationEngine::from_scenario(&scenario, Default::default()),
        Err(SimError::InvariantViolation(_))
    ));
}

#[test]
fn test_loaded_scenario_matches_declaration() {
    let engine = load(TWO_WAY);
    let p2 = engine.process("P2").unwrap();
    assert_eq!(p2.holds("Disk"), 1);
    assert_eq!(p2.requests("Printer"), 1);
    assert_eq!(p2.max_demand().unwrap().get("Printer"), Some(&1));
    assert!(engine.resources().iter().all(|r| r.available == 0));
    engine.verify().unwrap();
}

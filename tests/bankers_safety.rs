use ragwatch::{
    BankerInput, RequestDecision, SafetyChecker, SafetyReport, Scenario, SimError, Strategy,
    WaitReason,
};
mod common;
use common::{TWO_WAY, load};

fn resources() -> Vec<String> {
    vec!["Printer".into(), "Disk".into(), "Tape".into()]
}

fn textbook(available: Vec<u32>) -> BankerInput {
    BankerInput::new(resources(), available)
        .process("P1", vec![2, 1, 1], vec![1, 0, 1])
        .process("P2", vec![1, 2, 1], vec![0, 1, 0])
        .process("P3", vec![1, 1, 2], vec![0, 0, 1])
}

/// Walk `sequence` and check every process can finish in that order
fn replay(input: &BankerInput, sequence: &[String]) {
    let mut work = input.available.clone();
    for id in sequence {
        let p = input.processes.iter().find(|p| &p.id == id).unwrap();
        for r in 0..work.len() {
            let need = p.max[r] - p.allocated[r];
            assert!(need <= work[r], "{id} needs {need} of resource {r}, only {} left", work[r]);
            work[r] += p.allocated[r];
        }
    }
    assert_eq!(sequence.len(), input.processes.len());
}

#[test]
fn test_safe_state_has_replayable_sequence() {
    let input = textbook(vec![1, 1, 0]);
    let report = SafetyChecker::check(&input).unwrap();
    assert!(report.is_safe());
    let sequence = report.sequence().unwrap();
    assert!(!sequence.is_empty());
    replay(&input, sequence);
    assert!(report.describe().starts_with("System is in a safe state"));
}

#[test]
fn test_exhausted_state_is_unsafe() {
    let report = SafetyChecker::check(&textbook(vec![0, 0, 0])).unwrap();
    assert!(!report.is_safe());
    assert!(report.sequence().is_none());
    match report {
        SafetyReport::Unsafe { finished, blocked } => {
            assert!(finished.is_empty());
            assert_eq!(blocked, ["P1", "P2", "P3"]);
        }
        SafetyReport::Safe { .. } => unreachable!(),
    }
}

#[test]
fn test_negative_need_is_invalid_state() {
    let input =
        BankerInput::new(resources(), vec![1, 1, 1]).process("P1", vec![1, 0, 0], vec![2, 0, 0]);
    assert!(matches!(SafetyChecker::check(&input), Err(SimError::InvalidState(_))));
}

#[test]
fn test_request_evaluation() {
    let input = textbook(vec![1, 1, 0]);

    let decision = SafetyChecker::evaluate_request(&input, "P1", &[1, 0, 0]).unwrap();
    assert!(matches!(decision, RequestDecision::Grant { .. }));

    let decision = SafetyChecker::evaluate_request(&input, "P3", &[0, 0, 1]).unwrap();
    assert_eq!(
        decision,
        RequestDecision::Wait {
            reason: WaitReason::Unavailable
        }
    );

    assert!(matches!(
        SafetyChecker::evaluate_request(&input, "P1", &[2, 0, 0]),
        Err(SimError::InvalidState(_))
    ));
}

#[test]
fn test_scenario_and_engine_agree() {
    let scenario = Scenario::from_json(TWO_WAY).unwrap();
    let offline = SafetyChecker::check(&scenario.banker_input()).unwrap();
    let engine = load(TWO_WAY);
    let live = engine.safety_check().unwrap();
    assert_eq!(offline, live);
    assert!(!live.is_safe());
}

#[test]
fn test_safety_check_needs_declared_maximums() {
    let engine = ragwatch::Ragwatch::new().build().unwrap();
    engine.add_process("P1", Strategy::Normal).unwrap();
    assert!(matches!(engine.safety_check(), Err(SimError::InvalidState(_))));
}

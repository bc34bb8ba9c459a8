//! FSM unit tests

use runway::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentState::Pending);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Pending -> Building
    fsm.process(DeploymentEvent::StartBuild).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Building);

    // Building -> Deploying
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Deploying);

    // Deploying -> Success
    fsm.process(DeploymentEvent::Deployed).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Success);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_build_failure() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::StartBuild).unwrap();
    fsm.process(DeploymentEvent::Fail("npm ci failed".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("npm ci failed"));
}

#[test]
fn test_fsm_run_failure() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::StartBuild).unwrap();
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    fsm.process(DeploymentEvent::Fail("port already allocated".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("port already allocated"));
}

#[test]
fn test_fsm_cancel_from_any_active_state() {
    let mut pending = DeploymentFsm::new();
    assert_eq!(
        pending.process(DeploymentEvent::Cancel),
        Ok(DeploymentState::Canceled)
    );

    let mut building = DeploymentFsm::new();
    building.process(DeploymentEvent::StartBuild).unwrap();
    assert_eq!(
        building.process(DeploymentEvent::Cancel),
        Ok(DeploymentState::Canceled)
    );

    let mut deploying = DeploymentFsm::new();
    deploying.process(DeploymentEvent::StartBuild).unwrap();
    deploying.process(DeploymentEvent::BuildSucceeded).unwrap();
    assert_eq!(
        deploying.process(DeploymentEvent::Cancel),
        Ok(DeploymentState::Canceled)
    );
    assert!(deploying.error().is_none());
}

#[test]
fn test_fsm_terminal_states_reject_events() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::StartBuild).unwrap();
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    fsm.process(DeploymentEvent::Deployed).unwrap();

    assert!(fsm.process(DeploymentEvent::Cancel).is_err());
    assert!(fsm
        .process(DeploymentEvent::Fail("late".to_string()))
        .is_err());
    assert_eq!(fsm.state(), DeploymentState::Success);
    assert!(fsm.error().is_none());

    let mut failed = DeploymentFsm::new();
    failed
        .process(DeploymentEvent::Fail("first".to_string()))
        .unwrap();
    assert!(failed.process(DeploymentEvent::StartBuild).is_err());
    assert!(failed
        .process(DeploymentEvent::Fail("second".to_string()))
        .is_err());
    assert_eq!(failed.error(), Some("first"));
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = DeploymentFsm::new();

    // Cannot skip the build
    let result = fsm.process(DeploymentEvent::BuildSucceeded);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("Invalid transition"));
    assert_eq!(fsm.state(), DeploymentState::Pending);

    fsm.process(DeploymentEvent::StartBuild).unwrap();
    assert!(fsm.process(DeploymentEvent::Deployed).is_err());
    assert!(fsm.process(DeploymentEvent::StartBuild).is_err());
    assert_eq!(fsm.state(), DeploymentState::Building);
}

#[test]
fn test_state_strings() {
    let states = [
        (DeploymentState::Pending, "PENDING"),
        (DeploymentState::Building, "BUILDING"),
        (DeploymentState::Deploying, "DEPLOYING"),
        (DeploymentState::Success, "SUCCESS"),
        (DeploymentState::Failed, "FAILED"),
        (DeploymentState::Canceled, "CANCELED"),
    ];

    for (state, text) in states {
        assert_eq!(state.as_str(), text);
        assert_eq!(state.to_string(), text);
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            format!("\"{}\"", text)
        );
    }

    assert!(!DeploymentState::Deploying.is_terminal());
    assert!(DeploymentState::Canceled.is_terminal());
}

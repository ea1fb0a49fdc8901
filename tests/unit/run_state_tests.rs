//! Unit tests for `RunState` transitions.

use driver_host::RunState;

#[test]
fn starting_may_become_running_or_dead() {
    assert!(RunState::Starting.can_transition_to(RunState::Running));
    assert!(RunState::Starting.can_transition_to(RunState::Dead));
}

#[test]
fn running_may_only_die() {
    assert!(RunState::Running.can_transition_to(RunState::Dead));
    assert!(!RunState::Running.can_transition_to(RunState::Starting));
}

#[test]
fn dead_is_terminal() {
    assert!(!RunState::Dead.can_transition_to(RunState::Running));
    assert!(!RunState::Dead.can_transition_to(RunState::Starting));
    assert!(RunState::Dead.can_transition_to(RunState::Dead));
}

#[test]
fn only_running_accepts_requests() {
    assert!(RunState::Running.accepts_requests());
    assert!(!RunState::Starting.accepts_requests());
    assert!(!RunState::Dead.accepts_requests());
}

#[test]
fn display_is_lowercase() {
    assert_eq!(RunState::Dead.to_string(), "dead");
    assert_eq!(RunState::Running.to_string(), "running");
}

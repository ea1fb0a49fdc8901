//! Integration tests for driver death while a request is outstanding.

use std::time::Duration;

use serde_json::{json, Value};

use super::driver_doubles::{
    DriverDouble, CHATTY_CRASH_DRIVER, CLOSE_STDOUT_ON_REQUEST_DRIVER, CRASH_ON_REQUEST_DRIVER,
    LINE_THEN_EXIT_DRIVER, SHORT_LIVED_DRIVER,
};
use driver_host::{EvalError, Evaluator, Request, RunState};

fn any_request() -> Request<Value, Value> {
    Request::new(json!({ "knots": [] }), json!([0.0, 1.0]))
}

#[tokio::test]
async fn driver_exiting_on_request_is_a_child_death() {
    let driver = DriverDouble::new(CRASH_ON_REQUEST_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        evaluator.eval::<_, _, Value>(&any_request()),
    )
    .await
    .expect("eval must not hang on a dead driver");

    match result {
        Err(EvalError::ChildDeath { stderr, stdout, .. }) => {
            assert_eq!(
                stderr,
                vec![
                    "driver: evaluating request".to_owned(),
                    "driver: fatal error in evaluator".to_owned(),
                ]
            );
            assert!(stdout.is_none(), "no stdout was produced: {stdout:?}");
        }
        other => panic!("expected Err(EvalError::ChildDeath), got: {other:?}"),
    }
    assert_eq!(evaluator.state(), RunState::Dead);
}

#[tokio::test]
async fn every_diagnostic_line_survives_in_order() {
    let driver = DriverDouble::new(CHATTY_CRASH_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let err = evaluator
        .eval::<_, _, Value>(&any_request())
        .await
        .expect_err("driver dies");

    let expected: Vec<String> = (1..=200).map(|i| format!("diag {i}")).collect();
    assert!(matches!(err, EvalError::ChildDeath { .. }), "got: {err:?}");
    assert_eq!(err.stderr(), expected.as_slice());
}

#[tokio::test]
async fn eval_after_death_is_not_running() {
    let driver = DriverDouble::new(CRASH_ON_REQUEST_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let _ = evaluator.eval::<_, _, Value>(&any_request()).await;
    let second = evaluator.eval::<_, _, Value>(&any_request()).await;

    assert!(
        matches!(second, Err(EvalError::NotRunning(_))),
        "got: {second:?}"
    );
}

#[tokio::test]
async fn independent_exit_is_detected_before_sending() {
    let driver = DriverDouble::new(SHORT_LIVED_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!evaluator.is_running());
    let result = evaluator.eval::<_, _, Value>(&any_request()).await;
    match result {
        Err(EvalError::NotRunning(msg)) => assert!(msg.contains("dead"), "got: {msg}"),
        other => panic!("expected Err(EvalError::NotRunning), got: {other:?}"),
    }
}

#[tokio::test]
async fn death_error_reports_exit_status() {
    let driver = DriverDouble::new(CRASH_ON_REQUEST_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let err = evaluator
        .eval::<_, _, Value>(&any_request())
        .await
        .expect_err("driver dies");

    let text = err.to_string();
    assert!(text.starts_with("child death:"), "got: {text}");
    assert!(text.contains("driver: fatal error in evaluator"), "got: {text}");
}

#[tokio::test]
async fn line_written_just_before_exit_is_partial_stdout_of_a_child_death() {
    // Whichever side of the exit the line is observed on, the outcome is
    // the same; repeat to cover both orderings.
    for _ in 0..5 {
        let driver = DriverDouble::new(LINE_THEN_EXIT_DRIVER);
        let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            evaluator.eval::<_, _, Value>(&any_request()),
        )
        .await
        .expect("eval must not hang on a dead driver");

        match result {
            Err(EvalError::ChildDeath { stderr, stdout, .. }) => {
                assert_eq!(stdout.as_deref(), Some("garbage-partial"));
                assert_eq!(stderr, vec!["boom".to_owned()]);
            }
            other => panic!("expected Err(EvalError::ChildDeath), got: {other:?}"),
        }
        assert_eq!(evaluator.state(), RunState::Dead);
    }
}

#[tokio::test]
async fn stdout_closed_mid_request_is_a_child_death() {
    let driver = DriverDouble::new(CLOSE_STDOUT_ON_REQUEST_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        evaluator.eval::<_, _, Value>(&any_request()),
    )
    .await
    .expect("eval must not hang on a closed stdout");

    match result {
        Err(EvalError::ChildDeath { reason, stderr, .. }) => {
            assert!(reason.contains("closed its output stream"), "got: {reason}");
            assert!(stderr.contains(&"closing stdout".to_owned()), "got: {stderr:?}");
        }
        other => panic!("expected Err(EvalError::ChildDeath), got: {other:?}"),
    }
    assert_eq!(evaluator.state(), RunState::Dead);
    assert!(!evaluator.is_running());
    evaluator.shutdown().await;
}

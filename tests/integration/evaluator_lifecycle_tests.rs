//! Integration tests for the evaluator happy path: handshake, round-trip
//! fidelity, and diagnostic capture while running.

use std::time::Duration;

use serde_json::{json, Value};

use super::driver_doubles::{
    DriverDouble, ECHO_DRIVER, ENV_REPORTING_DRIVER, GARBAGE_DRIVER, NOISY_ECHO_DRIVER,
};
use driver_host::driver::protocol::PROTOCOL_VERSION;
use driver_host::{EvalError, EvalOptions, Evaluator, Request, RunState, TangentMode};

#[tokio::test]
async fn start_completes_handshake_and_runs() {
    let driver = DriverDouble::new(ECHO_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    assert_eq!(evaluator.state(), RunState::Running);
    assert!(evaluator.is_running());
    assert!(evaluator.pid().is_some());

    evaluator.shutdown().await;
}

#[tokio::test]
async fn eval_returns_exactly_what_the_driver_echoed() {
    let driver = DriverDouble::new(ECHO_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let data = json!({ "knots": [[0.0, 1.0, "held"], [24.0, -3.5, "bezier"]] });
    let times = json!([0.0, 12.0, 24.0]);
    let request = Request::new(data.clone(), times.clone())
        .with_options(EvalOptions::default().with_tangent_mode(TangentMode::Smooth));

    let samples: Vec<Value> = evaluator.eval(&request).await.expect("eval");

    assert_eq!(samples.len(), 1);
    let echoed = &samples[0];
    assert_eq!(echoed["version"], json!(PROTOCOL_VERSION));
    assert_eq!(echoed["data"], data);
    assert_eq!(echoed["times"], times);
    assert_eq!(echoed["options"]["autoTanMethod"], json!("smooth"));

    evaluator.shutdown().await;
}

#[tokio::test]
async fn sequential_requests_each_get_their_own_response() {
    let driver = DriverDouble::new(ECHO_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    for i in 0..5 {
        let request = Request::new(json!({ "index": i }), json!([i]));
        let samples: Vec<Value> = evaluator.eval(&request).await.expect("eval");
        assert_eq!(samples[0]["data"]["index"], json!(i));
    }

    assert_eq!(evaluator.state(), RunState::Running);
    evaluator.shutdown().await;
}

#[tokio::test]
async fn malformed_response_is_a_decode_error_and_keeps_running() {
    let driver = DriverDouble::new(GARBAGE_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let result = evaluator
        .eval::<_, _, Value>(&Request::new(json!(1), json!([0.0])))
        .await;

    match result {
        Err(EvalError::Decode(msg)) => assert!(msg.contains("malformed json"), "got: {msg}"),
        other => panic!("expected Err(EvalError::Decode), got: {other:?}"),
    }
    assert_eq!(evaluator.state(), RunState::Running);

    evaluator.shutdown().await;
}

#[tokio::test]
async fn diagnostics_are_captured_while_running() {
    let driver = DriverDouble::new(NOISY_ECHO_DRIVER);
    let mut evaluator = Evaluator::start(driver.config()).await.expect("start");

    let _: Vec<Value> = evaluator
        .eval(&Request::new(json!(null), json!([])))
        .await
        .expect("eval");

    // The drainer runs concurrently; give it a moment to catch up.
    for _ in 0..40 {
        if evaluator.diagnostics().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let captured = evaluator.diagnostics().to_vec();

    assert_eq!(
        captured,
        vec!["initializing evaluator".to_owned(), "request received".to_owned()]
    );

    evaluator.shutdown().await;
}

#[tokio::test]
async fn driver_receives_arguments_and_environment() {
    let driver = DriverDouble::new(ENV_REPORTING_DRIVER);
    let config = driver
        .config()
        .with_debug_log("/tmp/driver-debug.log")
        .with_env("DRIVER_TEST_FLAG", "on");
    let mut evaluator = Evaluator::start(config).await.expect("start");

    let samples: Vec<String> = evaluator
        .eval(&Request::new(json!(0), json!(0)))
        .await
        .expect("eval");

    assert_eq!(
        samples,
        vec![
            "/tmp/driver-debug.log".to_owned(),
            "1".to_owned(),
            "on".to_owned()
        ]
    );

    evaluator.shutdown().await;
}

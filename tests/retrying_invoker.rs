//! Retry behaviour of `RetryingInvoker` under paused tokio time.

mod common;

use common::*;
use std::time::Duration;
use vision_mediator::provider::ErrorClass;
use vision_mediator::resilience::retry::{RetryConfig, RetryingInvoker};
use vision_mediator::InvocationErrorKind;

fn config() -> RetryConfig {
    RetryConfig::default().with_jitter(false)
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_third_attempt() {
    let provider = ScriptedProvider::scripted(
        vec![Err(transient()), Err(transient())],
        Ok("guidance".into()),
    );
    let invoker = RetryingInvoker::new(config(), provider.clone());

    let out = tokio_test::assert_ok!(invoker.invoke("prompt").await);
    assert_eq!(out.text, "guidance");
    assert_eq!(out.attempts, 3);
    // 1s + 2s of backoff
    assert!(out.latency >= Duration::from_secs(3));
    assert!(out.latency < Duration::from_secs(4));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let provider = ScriptedProvider::always_failing(transient());
    let invoker = RetryingInvoker::new(config().with_max_attempts(4), provider.clone());

    let err = tokio_test::assert_err!(invoker.invoke("prompt").await);
    assert_eq!(err.kind, InvocationErrorKind::Exhausted);
    assert_eq!(err.attempts, 4);
    assert_eq!(err.cause.class, ErrorClass::Overloaded);
    // 1s + 2s + 4s, no sleep after the final attempt
    assert!(err.elapsed >= Duration::from_secs(7));
    assert!(err.elapsed < Duration::from_secs(8));
    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_not_retried() {
    let provider = ScriptedProvider::always_failing(permanent());
    let invoker = RetryingInvoker::new(config(), provider.clone());

    let err = tokio_test::assert_err!(invoker.invoke("prompt").await);
    assert_eq!(err.kind, InvocationErrorKind::Permanent);
    assert_eq!(err.attempts, 1);
    assert_eq!(err.cause.class, ErrorClass::Authentication);
    assert!(err.elapsed < Duration::from_millis(1));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_after_transient_stops_immediately() {
    let provider = ScriptedProvider::scripted(vec![Err(transient())], Err(permanent()));
    let invoker = RetryingInvoker::new(config(), provider.clone());

    let err = tokio_test::assert_err!(invoker.invoke("prompt").await);
    assert_eq!(err.kind, InvocationErrorKind::Permanent);
    assert_eq!(err.attempts, 2);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_attempt_times_out_and_is_retried() {
    let provider = ScriptedProvider::slow("late", Duration::from_secs(10));
    let invoker = RetryingInvoker::new(
        config()
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_secs(2)),
        provider.clone(),
    );

    let err = tokio_test::assert_err!(invoker.invoke("prompt").await);
    assert_eq!(err.kind, InvocationErrorKind::Exhausted);
    assert_eq!(err.cause.class, ErrorClass::Timeout);
    assert_eq!(err.attempts, 2);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn single_attempt_config_never_sleeps() {
    let provider = ScriptedProvider::always_failing(transient());
    let invoker = RetryingInvoker::new(config().with_max_attempts(1), provider.clone());

    let err = tokio_test::assert_err!(invoker.invoke("prompt").await);
    assert_eq!(err.kind, InvocationErrorKind::Exhausted);
    assert_eq!(err.attempts, 1);
    assert!(err.elapsed < Duration::from_millis(1));
}

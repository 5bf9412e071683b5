mod common;

use std::time::Duration;

use vigia_ops::probe::{aggregate, http_probe, wait_ready, ProbeStatus};

const TIMEOUT: Duration = Duration::from_secs(3);
const SLOW_MS: u128 = 2000;

#[tokio::test]
async fn healthy_endpoint_passes() {
    let stub = common::spawn_stub().await.expect("stub");
    let outcome = http_probe("api", &stub.url("/health"), TIMEOUT, SLOW_MS).await;
    assert_eq!(outcome.status, ProbeStatus::Pass);
    assert!(outcome.detail.contains("200"));
}

#[tokio::test]
async fn service_unavailable_warns() {
    let stub = common::spawn_stub().await.expect("stub");
    let outcome = http_probe("api", &stub.url("/degraded"), TIMEOUT, SLOW_MS).await;
    assert_eq!(outcome.status, ProbeStatus::Warn);
}

#[tokio::test]
async fn unexpected_status_fails() {
    let stub = common::spawn_stub().await.expect("stub");
    let outcome = http_probe("api", &stub.url("/no-such-route"), TIMEOUT, SLOW_MS).await;
    assert_eq!(outcome.status, ProbeStatus::Fail);
}

#[tokio::test]
async fn unreachable_host_fails() {
    let outcome = http_probe(
        "api",
        "http://127.0.0.1:9/health",
        Duration::from_millis(800),
        SLOW_MS,
    )
    .await;
    assert_eq!(outcome.status, ProbeStatus::Fail);
}

#[tokio::test]
async fn mixed_outcomes_aggregate_to_unhealthy() {
    let stub = common::spawn_stub().await.expect("stub");
    let outcomes = vec![
        http_probe("ok", &stub.url("/health"), TIMEOUT, SLOW_MS).await,
        http_probe("degraded", &stub.url("/degraded"), TIMEOUT, SLOW_MS).await,
        http_probe("missing", &stub.url("/gone"), TIMEOUT, SLOW_MS).await,
    ];
    let summary = aggregate(&outcomes);
    assert_eq!((summary.passed, summary.warned, summary.failed), (1, 1, 1));
    assert!(!summary.healthy());
}

#[tokio::test]
async fn readiness_polls_until_up() {
    let stub = common::spawn_stub().await.expect("stub");
    let elapsed = wait_ready(
        &stub.url("/health"),
        Duration::from_secs(5),
        Duration::from_millis(50),
    )
    .await
    .expect("becomes ready");
    assert!(elapsed < 5_000);
}

#[tokio::test]
async fn readiness_gives_up_at_deadline() {
    let err = wait_ready(
        "http://127.0.0.1:9/health",
        Duration::from_millis(400),
        Duration::from_millis(100),
    )
    .await
    .expect_err("never ready");
    assert!(err.contains("did not become ready"));
}

mod common;

use std::io::Write;

use vigia_ops::cli::commands::smoke::{load_suite, run_suite};
use vigia_ops::config::OpsConfig;
use vigia_ops::probe::{aggregate, ProbeStatus};

fn write_suite(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("create temp suite");
    write!(f, "{body}").expect("write suite");
    f
}

fn config_for(stub: &common::StubPlatform) -> OpsConfig {
    let mut config = OpsConfig::from_env();
    config.api_url = stub.base_url.clone();
    config.frontend_url = stub.base_url.clone();
    config
}

#[tokio::test]
async fn passing_suite_is_healthy() {
    let stub = common::spawn_stub().await.expect("stub");
    let suite = write_suite(
        r#"
checks:
  - name: api health
    path: /health
    expect_substring: '"status"'
  - name: frontend root
    target: frontend
    path: /
    expect_substring: plataforma
"#,
    );

    let suite = load_suite(suite.path()).expect("loads");
    let outcomes = run_suite(&suite, &config_for(&stub)).await;
    let summary = aggregate(&outcomes);
    assert_eq!(summary.passed, 2);
    assert!(summary.healthy());
}

#[tokio::test]
async fn status_mismatch_fails_the_check() {
    let stub = common::spawn_stub().await.expect("stub");
    let suite = write_suite(
        r#"
checks:
  - name: degraded endpoint
    path: /degraded
    expect_status: 200
"#,
    );

    let suite = load_suite(suite.path()).expect("loads");
    let outcomes = run_suite(&suite, &config_for(&stub)).await;
    assert_eq!(outcomes[0].status, ProbeStatus::Fail);
    assert!(outcomes[0].detail.contains("expected status 200"));
}

#[tokio::test]
async fn missing_substring_fails_the_check() {
    let stub = common::spawn_stub().await.expect("stub");
    let suite = write_suite(
        r#"
checks:
  - name: api health
    path: /health
    expect_substring: no-such-text
"#,
    );

    let suite = load_suite(suite.path()).expect("loads");
    let outcomes = run_suite(&suite, &config_for(&stub)).await;
    assert_eq!(outcomes[0].status, ProbeStatus::Fail);
}

#[tokio::test]
async fn expected_503_passes() {
    let stub = common::spawn_stub().await.expect("stub");
    let suite = write_suite(
        r#"
checks:
  - name: maintenance page
    path: /degraded
    expect_status: 503
    expect_substring: maintenance
"#,
    );

    let suite = load_suite(suite.path()).expect("loads");
    let outcomes = run_suite(&suite, &config_for(&stub)).await;
    assert_eq!(outcomes[0].status, ProbeStatus::Pass);
}

#[test]
fn empty_suite_is_rejected() {
    let suite = write_suite("checks: []\n");
    assert!(load_suite(suite.path()).is_err());
}

use std::time::{Duration, Instant};

use crate::cli::utils::{fail_if_unhealthy, output_checks};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::mongo::Mongo;
use crate::probe::{aggregate, http_probe, ProbeOutcome};

/// Sequence of independent probes against the platform: API, frontend,
/// Postgres, MongoDB. One attempt each, fixed timeouts, aggregate exit.
pub async fn handle(config: &OpsConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(config.probe.timeout_secs);
    let slow_ms = config.probe.slow_ms;
    let mut outcomes = Vec::new();

    let api_health = format!("{}/health", config.api_url.trim_end_matches('/'));
    outcomes.push(http_probe("api", &api_health, timeout, slow_ms).await);
    outcomes.push(http_probe("frontend", &config.frontend_url, timeout, slow_ms).await);
    outcomes.push(postgres_probe(config).await);
    outcomes.push(mongo_probe(config).await);

    let summary = aggregate(&outcomes);
    output_checks(&output_format, "health", &outcomes, &summary)?;
    fail_if_unhealthy(&summary, "health")
}

async fn postgres_probe(config: &OpsConfig) -> ProbeOutcome {
    let Some(url) = config.database_url.as_deref() else {
        return ProbeOutcome::warn("postgres", "DATABASE_URL not set, skipped", 0);
    };
    let start = Instant::now();
    let result = async {
        let pool = crate::db::connect(url).await?;
        crate::db::health_check(&pool).await
    }
    .await;
    let elapsed = start.elapsed().as_millis();
    match result {
        Ok(()) => ProbeOutcome::pass("postgres", format!("SELECT 1 ok in {elapsed}ms"), elapsed),
        Err(e) => ProbeOutcome::fail("postgres", format!("unreachable: {e}"), elapsed),
    }
}

async fn mongo_probe(config: &OpsConfig) -> ProbeOutcome {
    let mongo = Mongo::new(&config.mongo);
    let start = Instant::now();
    match mongo.ping().await {
        Ok(true) => {
            let elapsed = start.elapsed().as_millis();
            ProbeOutcome::pass("mongodb", format!("ping ok in {elapsed}ms"), elapsed)
        }
        Ok(false) => ProbeOutcome::fail("mongodb", "ping answered but not ok", start.elapsed().as_millis()),
        Err(e) => ProbeOutcome::fail("mongodb", format!("unreachable: {e}"), start.elapsed().as_millis()),
    }
}

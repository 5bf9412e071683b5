use std::time::Duration;

use clap::Subcommand;
use serde_json::json;

use crate::backup::BackupCatalog;
use crate::cli::confirm::require_confirmation;
use crate::cli::utils::{output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::docker::Compose;
use crate::exec::mongo::Mongo;
use crate::exec::Runner;
use crate::probe::{http_probe, wait_ready};

#[derive(Subcommand)]
pub enum DeployCommands {
    #[command(about = "Deploy: pull/build images, restart the stack, wait for readiness")]
    Run {
        #[arg(long, help = "Build images locally instead of pulling")]
        build: bool,
    },

    #[command(about = "Container states plus one API health probe")]
    Status,

    #[command(about = "Restore the latest backup and restart the stack (destructive)")]
    Rollback {
        #[arg(long, help = "Skip the typed confirmation prompt")]
        yes: bool,
    },
}

pub async fn handle(
    cmd: DeployCommands,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let runner = Runner::from_deploy(&config.deploy);
    let compose = Compose::new(runner.clone(), &config.deploy);

    match cmd {
        DeployCommands::Run { build } => {
            // Fixed linear sequence; a failing step aborts the deploy.
            if build {
                step_line(&output_format, "building images ...");
                compose.build().await?;
            } else {
                step_line(&output_format, "pulling images ...");
                compose.pull().await?;
            }

            step_line(&output_format, "stopping old containers ...");
            compose.down().await?;

            step_line(&output_format, "starting new containers ...");
            compose.up().await?;

            let health_url = format!("{}/health", config.api_url.trim_end_matches('/'));
            step_line(&output_format, "waiting for API readiness ...");
            let ready_ms = wait_ready(
                &health_url,
                Duration::from_secs(config.deploy.ready_timeout_secs),
                Duration::from_millis(config.deploy.ready_interval_ms),
            )
            .await
            .map_err(|e| anyhow::anyhow!("deploy failed readiness check: {e}"))?;

            output_success(
                &output_format,
                &format!(
                    "Deploy complete{}; API ready after {ready_ms}ms",
                    remote_suffix(&runner, config)
                ),
                Some(json!({
                    "built": build,
                    "ready_after_ms": ready_ms as u64,
                })),
            )
        }
        DeployCommands::Status => {
            let services = compose.ps().await?;
            let health_url = format!("{}/health", config.api_url.trim_end_matches('/'));
            let probe = http_probe(
                "api",
                &health_url,
                Duration::from_secs(config.probe.timeout_secs),
                config.probe.slow_ms,
            )
            .await;

            match output_format {
                OutputFormat::Json => {
                    let list: Vec<_> = services
                        .iter()
                        .map(|s| {
                            json!({
                                "service": s.service,
                                "state": s.state,
                                "status": s.status,
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "services": list,
                            "api_probe": probe,
                        }))?
                    );
                }
                OutputFormat::Text => {
                    if services.is_empty() {
                        println!("No containers found for {}", config.deploy.compose_file);
                    }
                    for s in &services {
                        let marker = if s.is_running() { "✓" } else { "✗" };
                        println!("{} {:<20} {:<10} {}", marker, s.service, s.state, s.status);
                    }
                    println!("{} api {}", probe.status.marker(), probe.detail);
                }
            }
            Ok(())
        }
        DeployCommands::Rollback { yes } => {
            let catalog = BackupCatalog::new(&config.backup.dir);
            let latest = catalog.latest()?;
            catalog.verify(&latest)?;

            require_confirmation(
                "ROLLBACK",
                yes,
                &format!(
                    "This will DROP database '{}', restore {} and restart the stack",
                    config.mongo.database,
                    latest.file_name()
                ),
            )?;

            let mongo = Mongo::new(&config.mongo);
            catalog.ensure_dirs()?;
            let safety = catalog.new_safety_path(mongo.database());
            step_line(&output_format, "safety dump of current state ...");
            mongo.dump(&safety).await?;

            step_line(&output_format, &format!("restoring {} ...", latest.file_name()));
            mongo.restore(&latest.path, true).await?;

            step_line(&output_format, "restarting containers ...");
            compose.restart().await?;

            let stats = mongo.stats().await?;
            if stats.objects == 0 {
                anyhow::bail!(
                    "rollback verification failed: 0 documents after restore; safety dump kept at {}",
                    safety.display()
                );
            }

            output_success(
                &output_format,
                &format!(
                    "Rollback complete from {} ({} documents)",
                    latest.file_name(),
                    stats.objects
                ),
                Some(json!({
                    "archive": latest.file_name(),
                    "documents": stats.objects,
                    "safety_dump": safety.display().to_string(),
                })),
            )
        }
    }
}

fn remote_suffix(runner: &Runner, config: &OpsConfig) -> String {
    if runner.is_remote() {
        match &config.deploy.host {
            Some(host) => format!(" on {host}"),
            None => String::new(),
        }
    } else {
        String::new()
    }
}

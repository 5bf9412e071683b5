use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::backup::BackupCatalog;
use crate::cli::utils::{fail_if_unhealthy, output_checks};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::docker::Compose;
use crate::probe::{aggregate, ProbeOutcome};

/// Passwords that ship in compose examples and never belong in an
/// environment.
const DEFAULT_PASSWORDS: &[&str] = &["admin", "password", "changeme", "secret", "mongo", "123456"];

const BACKUP_FRESHNESS_SECS: u64 = 24 * 60 * 60;
const MIN_PASSWORD_LENGTH: usize = 12;

/// Security audit: independent local checks sharing the pass/warn/fail
/// vocabulary and exit contract of `health`.
pub async fn handle(
    config: &OpsConfig,
    env_path: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let mut outcomes = Vec::new();

    outcomes.push(env_permissions_check(env_path.as_deref()));
    outcomes.push(credentials_check(config));
    outcomes.extend(certificate_checks(config).await);
    outcomes.push(containers_check(config).await);
    outcomes.push(mongo_exposure_check(config).await);
    outcomes.push(backup_freshness_check(config));

    let summary = aggregate(&outcomes);
    output_checks(&output_format, "audit", &outcomes, &summary)?;
    fail_if_unhealthy(&summary, "audit")
}

/// Env files hold credentials; anything beyond owner access fails.
fn env_permissions_check(env_path: Option<&Path>) -> ProbeOutcome {
    use std::os::unix::fs::PermissionsExt;

    let Some(path) = env_path else {
        return ProbeOutcome::warn("env-permissions", "no env file loaded, skipped", 0);
    };
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                ProbeOutcome::fail(
                    "env-permissions",
                    format!("{} is mode {mode:03o}, readable beyond owner", path.display()),
                    0,
                )
            } else {
                ProbeOutcome::pass(
                    "env-permissions",
                    format!("{} is mode {mode:03o}", path.display()),
                    0,
                )
            }
        }
        Err(e) => ProbeOutcome::fail(
            "env-permissions",
            format!("cannot stat {}: {e}", path.display()),
            0,
        ),
    }
}

fn credentials_check(config: &OpsConfig) -> ProbeOutcome {
    let password = &config.mongo.password;
    if password.is_empty() {
        return ProbeOutcome::fail("credentials", "MONGO_PASSWORD is empty", 0);
    }
    if DEFAULT_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return ProbeOutcome::fail("credentials", "MONGO_PASSWORD is a well-known default", 0);
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return ProbeOutcome::warn(
            "credentials",
            format!("MONGO_PASSWORD is shorter than {MIN_PASSWORD_LENGTH} characters"),
            0,
        );
    }
    ProbeOutcome::pass("credentials", "MONGO_PASSWORD looks strong", 0)
}

/// Same expiry classification `ssl status` uses, one outcome per domain.
async fn certificate_checks(config: &OpsConfig) -> Vec<ProbeOutcome> {
    if config.ssl.domains.is_empty() {
        return vec![ProbeOutcome::warn(
            "certificates",
            "SSL_DOMAINS not set, skipped",
            0,
        )];
    }
    let runner = crate::exec::Runner::local();
    let mut outcomes = Vec::with_capacity(config.ssl.domains.len());
    for domain in &config.ssl.domains {
        outcomes.push(super::ssl::domain_status(&runner, &config.ssl, domain).await);
    }
    outcomes
}

async fn containers_check(config: &OpsConfig) -> ProbeOutcome {
    let compose = Compose::new(crate::exec::Runner::from_deploy(&config.deploy), &config.deploy);
    match compose.ps().await {
        Ok(services) if services.is_empty() => {
            ProbeOutcome::warn("containers", "no containers found for the compose project", 0)
        }
        Ok(services) => {
            let stopped: Vec<_> = services
                .iter()
                .filter(|s| !s.is_running())
                .map(|s| s.service.clone())
                .collect();
            if stopped.is_empty() {
                ProbeOutcome::pass(
                    "containers",
                    format!("{} service(s) running", services.len()),
                    0,
                )
            } else {
                ProbeOutcome::fail(
                    "containers",
                    format!("not running: {}", stopped.join(", ")),
                    0,
                )
            }
        }
        Err(e) => ProbeOutcome::warn("containers", format!("docker unavailable: {e}"), 0),
    }
}

/// A published 27017 means the database is reachable from outside the
/// compose network.
async fn mongo_exposure_check(config: &OpsConfig) -> ProbeOutcome {
    let Some(container) = &config.mongo.container else {
        return ProbeOutcome::warn("mongo-exposure", "MONGO_CONTAINER not set, skipped", 0);
    };
    let compose = Compose::new(crate::exec::Runner::from_deploy(&config.deploy), &config.deploy);
    match compose.port_bindings(container).await {
        Ok(bindings) => {
            let published: Vec<_> = bindings
                .iter()
                .filter(|b| b.contains("27017") && (b.contains("0.0.0.0") || b.contains("[::]")))
                .cloned()
                .collect();
            if published.is_empty() {
                ProbeOutcome::pass("mongo-exposure", "27017 not published on all interfaces", 0)
            } else {
                ProbeOutcome::warn(
                    "mongo-exposure",
                    format!("27017 published: {}", published.join("; ")),
                    0,
                )
            }
        }
        Err(e) => ProbeOutcome::warn("mongo-exposure", format!("docker unavailable: {e}"), 0),
    }
}

fn backup_freshness_check(config: &OpsConfig) -> ProbeOutcome {
    let catalog = BackupCatalog::new(&config.backup.dir);
    match catalog.latest() {
        Ok(entry) => {
            let age_secs = SystemTime::now()
                .duration_since(entry.modified)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if age_secs <= BACKUP_FRESHNESS_SECS {
                ProbeOutcome::pass(
                    "backup-freshness",
                    format!("{} is {}h old", entry.file_name(), age_secs / 3600),
                    0,
                )
            } else {
                ProbeOutcome::warn(
                    "backup-freshness",
                    format!("latest backup is {}h old", age_secs / 3600),
                    0,
                )
            }
        }
        Err(_) => ProbeOutcome::warn(
            "backup-freshness",
            format!("no backups in {}", config.backup.dir.display()),
            0,
        ),
    }
}

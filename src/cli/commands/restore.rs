use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use crate::backup::BackupCatalog;
use crate::cli::confirm::require_confirmation;
use crate::cli::utils::{output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::mongo::Mongo;

#[derive(Args)]
pub struct RestoreArgs {
    #[arg(long, help = "Archive to restore (default: latest backup by mtime)")]
    pub archive: Option<PathBuf>,

    #[arg(long, help = "Skip the typed confirmation prompt")]
    pub yes: bool,
}

/// Destructive restore, fixed sequence: confirm, safety dump, restore
/// with --drop, verify document count, report. Exit non-zero on any
/// failed step; the safety archive stays on disk either way.
pub async fn handle(
    args: RestoreArgs,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let catalog = BackupCatalog::new(&config.backup.dir);
    let mongo = Mongo::new(&config.mongo);

    let archive = resolve_archive(&catalog, args.archive)?;

    require_confirmation(
        "RESTORE",
        args.yes,
        &format!(
            "This will DROP and restore database '{}' from {}",
            mongo.database(),
            archive.display()
        ),
    )?;

    catalog.ensure_dirs()?;
    let safety = catalog.new_safety_path(mongo.database());
    step_line(
        &output_format,
        &format!("safety dump to {} ...", safety.display()),
    );
    mongo.dump(&safety).await?;

    step_line(&output_format, "restoring (--drop) ...");
    mongo.restore(&archive, true).await?;

    step_line(&output_format, "verifying document count ...");
    let stats = mongo.stats().await?;
    if stats.objects == 0 {
        anyhow::bail!(
            "restore verification failed: database '{}' has 0 documents; safety dump kept at {}",
            mongo.database(),
            safety.display()
        );
    }

    output_success(
        &output_format,
        &format!(
            "Restore complete: {} collections, {} documents",
            stats.collections, stats.objects
        ),
        Some(json!({
            "archive": archive.display().to_string(),
            "safety_dump": safety.display().to_string(),
            "collections": stats.collections,
            "documents": stats.objects,
        })),
    )
}

/// An explicit archive path is taken as-is after a checksum verification
/// when its manifest exists; the catalog default must verify cleanly.
fn resolve_archive(
    catalog: &BackupCatalog,
    explicit: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("archive not found: {}", path.display());
            }
            // Archives living in the catalog must verify; a standalone path
            // without a manifest is the operator's call.
            if let Ok(entries) = catalog.entries() {
                if let Some(known) = entries.into_iter().find(|e| e.path == path) {
                    catalog.verify(&known)?;
                    return Ok(known.path);
                }
            }
            Ok(path)
        }
        None => {
            let latest = catalog.latest()?;
            catalog.verify(&latest)?;
            Ok(latest.path)
        }
    }
}

use clap::Subcommand;
use serde_json::json;

use crate::backup::BackupCatalog;
use crate::cli::utils::{output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::mongo::Mongo;

#[derive(Subcommand)]
pub enum BackupCommands {
    #[command(about = "Dump the MongoDB database into the backup catalog")]
    Create,

    #[command(about = "List catalog archives, newest first")]
    List,

    #[command(about = "Delete archives beyond the retention count")]
    Prune {
        #[arg(long, help = "Archives to keep (default: BACKUP_RETENTION)")]
        keep: Option<usize>,
    },
}

pub async fn handle(
    cmd: BackupCommands,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let catalog = BackupCatalog::new(&config.backup.dir);

    match cmd {
        BackupCommands::Create => {
            catalog.ensure_dirs()?;
            let mongo = Mongo::new(&config.mongo);
            let archive = catalog.new_archive_path(mongo.database());

            step_line(&output_format, &format!("dumping {} ...", mongo.database()));
            mongo.dump(&archive).await?;
            let manifest = catalog.write_manifest(&archive, mongo.database())?;

            output_success(
                &output_format,
                &format!(
                    "Backup created: {} ({} bytes)",
                    manifest.archive, manifest.size_bytes
                ),
                Some(json!({
                    "archive": manifest.archive,
                    "size_bytes": manifest.size_bytes,
                    "sha256": manifest.sha256,
                })),
            )
        }
        BackupCommands::List => {
            let entries = catalog.entries()?;
            match output_format {
                OutputFormat::Json => {
                    let list: Vec<_> = entries
                        .iter()
                        .map(|e| {
                            json!({
                                "archive": e.file_name(),
                                "manifest": e.manifest,
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "backups": list }))?
                    );
                }
                OutputFormat::Text => {
                    if entries.is_empty() {
                        println!("No backups in {}", catalog.dir().display());
                        return Ok(());
                    }
                    println!("{:<55} {:>14} {}", "ARCHIVE", "SIZE", "CREATED");
                    for entry in &entries {
                        match &entry.manifest {
                            Some(m) => println!(
                                "{:<55} {:>14} {}",
                                entry.file_name(),
                                m.size_bytes,
                                m.created_at.format("%Y-%m-%d %H:%M UTC")
                            ),
                            None => println!(
                                "{:<55} {:>14} (no manifest)",
                                entry.file_name(),
                                "-"
                            ),
                        }
                    }
                }
            }
            Ok(())
        }
        BackupCommands::Prune { keep } => {
            let retention = keep.unwrap_or(config.backup.retention);
            let removed = catalog.prune(retention)?;
            let names: Vec<String> = removed
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect();
            output_success(
                &output_format,
                &format!("Pruned {} archive(s), kept {}", names.len(), retention),
                Some(json!({ "removed": names, "retention": retention })),
            )
        }
    }
}

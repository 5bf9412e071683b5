pub mod commands;
pub mod confirm;
pub mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::OpsConfig;

#[derive(Parser)]
#[command(name = "vigia")]
#[command(about = "Vigia - operations CLI for the financial-metrics reporting platform")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Environment file to load (default: envs/.env.$VIGIA_ENV, then ./.env)"
    )]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Deploy the platform stack and inspect its state")]
    Deploy {
        #[command(subcommand)]
        cmd: commands::deploy::DeployCommands,
    },

    #[command(about = "MongoDB backup catalog: create, list, prune")]
    Backup {
        #[command(subcommand)]
        cmd: commands::backup::BackupCommands,
    },

    #[command(about = "Restore MongoDB from a backup archive (destructive)")]
    Restore(commands::restore::RestoreArgs),

    #[command(about = "Database management: ping, status, credential rotation")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "Probe platform endpoints and report pass/warn/fail")]
    Health,

    #[command(about = "Application cache operations")]
    Cache {
        #[command(subcommand)]
        cmd: commands::cache::CacheCommands,
    },

    #[command(about = "TLS certificate provisioning and expiry status")]
    Ssl {
        #[command(subcommand)]
        cmd: commands::ssl::SslCommands,
    },

    #[command(about = "Security audit of the operational environment")]
    Audit,

    #[command(about = "Run an end-to-end smoke suite against live services")]
    Smoke(commands::smoke::SmokeArgs),

    #[command(about = "Financial-metrics reporting database")]
    Metrics {
        #[command(subcommand)]
        cmd: commands::metrics::MetricsCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    let env_path = crate::config::load_env(cli.env_file.clone())?;
    let config = OpsConfig::from_env();

    match cli.command {
        Commands::Deploy { cmd } => commands::deploy::handle(cmd, &config, output_format).await,
        Commands::Backup { cmd } => commands::backup::handle(cmd, &config, output_format).await,
        Commands::Restore(args) => commands::restore::handle(args, &config, output_format).await,
        Commands::Db { cmd } => {
            commands::db::handle(cmd, &config, env_path, output_format).await
        }
        Commands::Health => commands::health::handle(&config, output_format).await,
        Commands::Cache { cmd } => commands::cache::handle(cmd, &config, output_format).await,
        Commands::Ssl { cmd } => commands::ssl::handle(cmd, &config, output_format).await,
        Commands::Audit => commands::audit::handle(&config, env_path, output_format).await,
        Commands::Smoke(args) => commands::smoke::handle(args, &config, output_format).await,
        Commands::Metrics { cmd } => commands::metrics::handle(cmd, &config, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_with_global_flags() {
        let cli = Cli::try_parse_from(["vigia", "--json", "health"]).expect("parses");
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Health));
    }

    #[test]
    fn parses_restore_with_archive_and_yes() {
        let cli = Cli::try_parse_from([
            "vigia",
            "restore",
            "--archive",
            "backups/plataforma-20260101-000000.archive.gz",
            "--yes",
        ])
        .expect("parses");
        match cli.command {
            Commands::Restore(args) => {
                assert!(args.yes);
                assert!(args.archive.is_some());
            }
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn parses_env_file_flag() {
        let cli = Cli::try_parse_from([
            "vigia",
            "--env-file",
            "envs/.env.production",
            "deploy",
            "status",
        ])
        .expect("parses");
        assert_eq!(
            cli.env_file,
            Some(std::path::PathBuf::from("envs/.env.production"))
        );
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["vigia", "orchestrate"]).is_err());
    }
}

use chrono::NaiveDate;
use clap::Subcommand;
use rust_decimal::Decimal;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::db::{self, metrics};

#[derive(Subcommand)]
pub enum MetricsCommands {
    #[command(about = "Apply the metrics schema migrations")]
    Init,

    #[command(about = "Row counts per table")]
    Status,

    #[command(about = "Latest period per institution with key ratios")]
    Report {
        #[arg(long, help = "Filter to one institution (short or official name)")]
        institucion: Option<String>,

        #[arg(long, help = "Exact cutoff date (YYYY-MM-DD)")]
        fecha: Option<NaiveDate>,
    },

    #[command(about = "Segment-level portfolio quality for one institution")]
    Segments {
        #[arg(help = "Institution (short or official name)")]
        institucion: String,
    },
}

pub async fn handle(
    cmd: MetricsCommands,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let pool = db::connect(config.database_url()?).await?;

    match cmd {
        MetricsCommands::Init => {
            db::run_migrations(&pool).await?;
            output_success(&output_format, "Metrics schema is up to date", None)
        }
        MetricsCommands::Status => {
            let counts = metrics::table_counts(&pool).await?;
            match output_format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "tables": counts }))?
                    );
                }
                OutputFormat::Text => {
                    println!("{:<30} {:>10}", "TABLE", "ROWS");
                    for count in &counts {
                        println!("{:<30} {:>10}", count.table, count.rows);
                    }
                }
            }
            Ok(())
        }
        MetricsCommands::Report { institucion, fecha } => {
            let rows = metrics::latest_report(&pool, institucion.as_deref(), fecha).await?;
            match output_format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "report": rows }))?
                    );
                }
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No metrics found");
                        return Ok(());
                    }
                    println!(
                        "{:<20} {:<12} {:>16} {:>16} {:>8} {:>8} {:>8} {:>8}",
                        "INSTITUCION",
                        "FECHA",
                        "ACTIVOS",
                        "CARTERA",
                        "ROA",
                        "ROE",
                        "IMOR",
                        "ICOR"
                    );
                    for row in &rows {
                        println!(
                            "{:<20} {:<12} {:>16} {:>16} {:>8} {:>8} {:>8} {:>8}",
                            row.institucion,
                            row.fecha_corte,
                            fmt_decimal(&row.activos_totales),
                            fmt_decimal(&row.cartera_total),
                            fmt_decimal(&row.roa),
                            fmt_decimal(&row.roe),
                            fmt_decimal(&row.imor),
                            fmt_decimal(&row.icor),
                        );
                    }
                }
            }
            Ok(())
        }
        MetricsCommands::Segments { institucion } => {
            let rows = metrics::segment_quality(&pool, &institucion).await?;
            match output_format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "segments": rows }))?
                    );
                }
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No segment metrics for '{institucion}'");
                        return Ok(());
                    }
                    println!(
                        "{:<28} {:<12} {:>16} {:>16} {:>8} {:>8}",
                        "SEGMENTO", "FECHA", "CARTERA", "VENCIDA", "IMOR", "ICOR"
                    );
                    for row in &rows {
                        println!(
                            "{:<28} {:<12} {:>16} {:>16} {:>8} {:>8}",
                            row.segmento,
                            row.fecha_corte,
                            fmt_decimal(&row.cartera_total),
                            fmt_decimal(&row.cartera_vencida),
                            fmt_decimal(&row.imor),
                            fmt_decimal(&row.icor),
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn fmt_decimal(value: &Option<Decimal>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::probe::{ProbeOutcome, Summary};

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(Value::Object(map)) = data {
                response.as_object_mut().unwrap().extend(map);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// One status line for a step inside a fixed sequence (text format only;
/// JSON consumers get the final summary object instead).
pub fn step_line(output_format: &OutputFormat, message: &str) {
    if let OutputFormat::Text = output_format {
        println!("→ {}", message);
    }
}

/// Render a list of classified check outcomes plus their aggregate.
pub fn output_checks(
    output_format: &OutputFormat,
    kind: &str,
    outcomes: &[ProbeOutcome],
    summary: &Summary,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    kind: outcomes,
                    "summary": summary,
                }))?
            );
        }
        OutputFormat::Text => {
            for outcome in outcomes {
                println!(
                    "{} {:<22} {}",
                    outcome.status.marker(),
                    outcome.name,
                    outcome.detail
                );
            }
            println!(
                "{} passed, {} warnings, {} failed",
                summary.passed, summary.warned, summary.failed
            );
        }
    }
    Ok(())
}

/// Uniform exit contract for check-style commands: any failure aborts the
/// process with a non-zero code, warnings never do.
pub fn fail_if_unhealthy(summary: &Summary, what: &str) -> anyhow::Result<()> {
    if !summary.healthy() {
        anyhow::bail!(
            "{} of {} {} checks failed",
            summary.failed,
            summary.passed + summary.warned + summary.failed,
            what
        );
    }
    Ok(())
}

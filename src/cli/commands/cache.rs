use std::time::Duration;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::probe::HTTP;

#[derive(Subcommand)]
pub enum CacheCommands {
    #[command(about = "Clear the API application cache and verify the service")]
    Clear,
}

pub async fn handle(
    cmd: CacheCommands,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        CacheCommands::Clear => {
            let base = config.api_url.trim_end_matches('/');
            let clear_url = format!("{base}/api/cache/clear");
            let timeout = Duration::from_secs(config.probe.timeout_secs);

            step_line(&output_format, "clearing cache ...");
            let response = HTTP
                .post(&clear_url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("cache clear request failed: {e}"))?;
            if !response.status().is_success() {
                anyhow::bail!("cache clear rejected with status {}", response.status());
            }

            // The endpoint reports how many entries it dropped, when it can.
            let cleared = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("cleared").and_then(|c| c.as_i64()));

            step_line(&output_format, "verifying API after clear ...");
            let verify = HTTP
                .get(format!("{base}/health"))
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("API unreachable after cache clear: {e}"))?;
            if !verify.status().is_success() {
                anyhow::bail!(
                    "API degraded after cache clear: status {}",
                    verify.status()
                );
            }

            let message = match cleared {
                Some(n) => format!("Cache cleared ({n} entries), API healthy"),
                None => "Cache cleared, API healthy".to_string(),
            };
            output_success(
                &output_format,
                &message,
                Some(json!({ "cleared": cleared })),
            )
        }
    }
}

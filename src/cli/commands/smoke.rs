use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use serde::Deserialize;

use crate::cli::utils::{fail_if_unhealthy, output_checks};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::probe::{aggregate, ProbeOutcome, HTTP};

#[derive(Args)]
pub struct SmokeArgs {
    #[arg(
        default_value = "smoke.yaml",
        help = "YAML suite of live HTTP checks"
    )]
    pub suite: PathBuf,
}

/// End-to-end checks against live services: status code plus optional
/// body substring, one attempt per check. Pass/fail only.
#[derive(Debug, Deserialize)]
pub struct SmokeSuite {
    pub checks: Vec<SmokeCheck>,
}

#[derive(Debug, Deserialize)]
pub struct SmokeCheck {
    pub name: String,
    #[serde(default)]
    pub target: SmokeTarget,
    #[serde(default)]
    pub path: String,
    /// Absolute URL; only read when `target: url`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_status")]
    pub expect_status: u16,
    #[serde(default)]
    pub expect_substring: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmokeTarget {
    #[default]
    Api,
    Frontend,
    Url,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

pub fn load_suite(path: &std::path::Path) -> anyhow::Result<SmokeSuite> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read suite {}: {e}", path.display()))?;
    let suite: SmokeSuite = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid suite {}: {e}", path.display()))?;
    if suite.checks.is_empty() {
        anyhow::bail!("suite {} has no checks", path.display());
    }
    Ok(suite)
}

impl SmokeCheck {
    pub fn resolve_url(&self, config: &OpsConfig) -> anyhow::Result<String> {
        match self.target {
            SmokeTarget::Api => Ok(format!(
                "{}{}",
                config.api_url.trim_end_matches('/'),
                self.path
            )),
            SmokeTarget::Frontend => Ok(format!(
                "{}{}",
                config.frontend_url.trim_end_matches('/'),
                self.path
            )),
            SmokeTarget::Url => self
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("check '{}' has target url but no url", self.name)),
        }
    }
}

pub async fn run_suite(suite: &SmokeSuite, config: &OpsConfig) -> Vec<ProbeOutcome> {
    let mut outcomes = Vec::with_capacity(suite.checks.len());
    for check in &suite.checks {
        outcomes.push(run_check(check, config).await);
    }
    outcomes
}

async fn run_check(check: &SmokeCheck, config: &OpsConfig) -> ProbeOutcome {
    let url = match check.resolve_url(config) {
        Ok(url) => url,
        Err(e) => return ProbeOutcome::fail(&check.name, e.to_string(), 0),
    };
    let method = match reqwest::Method::from_bytes(check.method.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            return ProbeOutcome::fail(&check.name, format!("invalid method {}", check.method), 0)
        }
    };
    let timeout = Duration::from_secs(check.timeout_secs.unwrap_or(config.probe.timeout_secs));

    let start = Instant::now();
    let response = match HTTP.request(method, &url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(e) => {
            let elapsed = start.elapsed().as_millis();
            let detail = if e.is_timeout() {
                format!("timed out after {elapsed}ms")
            } else {
                format!("request failed: {e}")
            };
            return ProbeOutcome::fail(&check.name, detail, elapsed);
        }
    };

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let elapsed = start.elapsed().as_millis();

    if status != check.expect_status {
        return ProbeOutcome::fail(
            &check.name,
            format!("expected status {}, got {status}", check.expect_status),
            elapsed,
        );
    }
    if let Some(needle) = &check.expect_substring {
        if !body.contains(needle.as_str()) {
            return ProbeOutcome::fail(
                &check.name,
                format!("body does not contain '{needle}'"),
                elapsed,
            );
        }
    }
    ProbeOutcome::pass(&check.name, format!("{status} in {elapsed}ms"), elapsed)
}

pub async fn handle(
    args: SmokeArgs,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let suite = load_suite(&args.suite)?;
    let outcomes = run_suite(&suite, config).await;
    let summary = aggregate(&outcomes);
    output_checks(&output_format, "smoke", &outcomes, &summary)?;
    fail_if_unhealthy(&summary, "smoke")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_defaults_fill_in() {
        let yaml = r#"
checks:
  - name: api health
    path: /health
  - name: frontend
    target: frontend
    path: /
    expect_status: 200
"#;
        let suite: SmokeSuite = serde_yaml::from_str(yaml).expect("parses");
        assert_eq!(suite.checks.len(), 2);
        assert_eq!(suite.checks[0].target, SmokeTarget::Api);
        assert_eq!(suite.checks[0].method, "GET");
        assert_eq!(suite.checks[0].expect_status, 200);
    }

    #[test]
    fn url_target_requires_url() {
        let yaml = r#"
checks:
  - name: external
    target: url
"#;
        let suite: SmokeSuite = serde_yaml::from_str(yaml).expect("parses");
        let config = crate::config::OpsConfig::from_env();
        assert!(suite.checks[0].resolve_url(&config).is_err());
    }

    #[test]
    fn relative_paths_join_the_configured_base() {
        let yaml = r#"
checks:
  - name: api health
    path: /health
"#;
        let suite: SmokeSuite = serde_yaml::from_str(yaml).expect("parses");
        let mut config = crate::config::OpsConfig::from_env();
        config.api_url = "http://api.internal:3000/".to_string();
        let url = suite.checks[0].resolve_url(&config).expect("resolves");
        assert_eq!(url, "http://api.internal:3000/health");
    }
}

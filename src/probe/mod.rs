//! HTTP probe engine shared by health, smoke and deploy.
//!
//! A probe is one request with a fixed timeout; there is no retry and no
//! backoff. Classification is pass / warn / fail and failures drive the
//! process exit code.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Pass,
    Warn,
    Fail,
}

impl ProbeStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            ProbeStatus::Pass => "✓",
            ProbeStatus::Warn => "!",
            ProbeStatus::Fail => "✗",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub name: String,
    pub status: ProbeStatus,
    pub detail: String,
    pub elapsed_ms: u128,
}

impl ProbeOutcome {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>, elapsed_ms: u128) -> Self {
        Self {
            name: name.into(),
            status: ProbeStatus::Pass,
            detail: detail.into(),
            elapsed_ms,
        }
    }

    pub fn warn(name: impl Into<String>, detail: impl Into<String>, elapsed_ms: u128) -> Self {
        Self {
            name: name.into(),
            status: ProbeStatus::Warn,
            detail: detail.into(),
            elapsed_ms,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>, elapsed_ms: u128) -> Self {
        Self {
            name: name.into(),
            status: ProbeStatus::Fail,
            detail: detail.into(),
            elapsed_ms,
        }
    }
}

/// One HTTP GET, classified:
/// - 2xx within the slow threshold: pass
/// - 2xx but slow, or 503: warn (reachable, degraded)
/// - any other status, connection error, or timeout: fail
pub async fn http_probe(
    name: &str,
    url: &str,
    timeout: Duration,
    slow_ms: u128,
) -> ProbeOutcome {
    let start = Instant::now();
    match HTTP.get(url).timeout(timeout).send().await {
        Ok(response) => {
            let elapsed = start.elapsed().as_millis();
            let status = response.status();
            if status.is_success() {
                if elapsed > slow_ms {
                    ProbeOutcome::warn(name, format!("{status} in {elapsed}ms (slow)"), elapsed)
                } else {
                    ProbeOutcome::pass(name, format!("{status} in {elapsed}ms"), elapsed)
                }
            } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                ProbeOutcome::warn(name, format!("{status} (degraded)"), elapsed)
            } else {
                ProbeOutcome::fail(name, format!("unexpected status {status}"), elapsed)
            }
        }
        Err(e) => {
            let elapsed = start.elapsed().as_millis();
            let detail = if e.is_timeout() {
                format!("timed out after {elapsed}ms")
            } else {
                format!("request failed: {e}")
            };
            ProbeOutcome::fail(name, detail, elapsed)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
}

impl Summary {
    pub fn healthy(&self) -> bool {
        self.failed == 0
    }
}

pub fn aggregate(outcomes: &[ProbeOutcome]) -> Summary {
    let mut summary = Summary {
        passed: 0,
        warned: 0,
        failed: 0,
    };
    for outcome in outcomes {
        match outcome.status {
            ProbeStatus::Pass => summary.passed += 1,
            ProbeStatus::Warn => summary.warned += 1,
            ProbeStatus::Fail => summary.failed += 1,
        }
    }
    summary
}

/// Poll `url` until it answers 2xx or the deadline passes. Deployment
/// readiness uses this instead of a fixed sleep.
pub async fn wait_ready(
    url: &str,
    deadline: Duration,
    interval: Duration,
) -> Result<u128, String> {
    let start = Instant::now();
    loop {
        if start.elapsed() > deadline {
            return Err(format!(
                "{url} did not become ready within {}s",
                deadline.as_secs()
            ));
        }
        if let Ok(resp) = HTTP
            .get(url)
            .timeout(interval.max(Duration::from_millis(500)))
            .send()
            .await
        {
            if resp.status().is_success() {
                return Ok(start.elapsed().as_millis());
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: ProbeStatus) -> ProbeOutcome {
        ProbeOutcome {
            name: "x".to_string(),
            status,
            detail: String::new(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn aggregation_counts_by_class() {
        let outcomes = vec![
            outcome(ProbeStatus::Pass),
            outcome(ProbeStatus::Warn),
            outcome(ProbeStatus::Pass),
            outcome(ProbeStatus::Fail),
        ];
        let summary = aggregate(&outcomes);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.warned, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.healthy());
    }

    #[test]
    fn warnings_do_not_fail_the_run() {
        let summary = aggregate(&[outcome(ProbeStatus::Warn)]);
        assert!(summary.healthy());
    }

    #[tokio::test]
    async fn connection_refused_is_a_fail() {
        // Port 9 (discard) is assumed closed.
        let outcome = http_probe(
            "api",
            "http://127.0.0.1:9/health",
            Duration::from_millis(800),
            2000,
        )
        .await;
        assert_eq!(outcome.status, ProbeStatus::Fail);
    }
}

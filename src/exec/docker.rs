//! Docker Compose wrapper for the deployment and audit commands.

use std::path::PathBuf;
use std::time::Duration;

use super::{CmdOutput, ExecError, Runner};

const PULL_TIMEOUT: Duration = Duration::from_secs(600);
const BUILD_TIMEOUT: Duration = Duration::from_secs(1800);
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(180);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// One compose project, addressed by its compose file path.
#[derive(Debug, Clone)]
pub struct Compose {
    runner: Runner,
    compose_path: PathBuf,
}

impl Compose {
    pub fn new(runner: Runner, deploy: &crate::config::DeployConfig) -> Self {
        Self {
            runner,
            compose_path: deploy.project_dir.join(&deploy.compose_file),
        }
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_path.display().to_string(),
        ]
    }

    async fn compose(&self, extra: &[&str], timeout: Duration) -> Result<CmdOutput, ExecError> {
        let mut args = self.base_args();
        args.extend(extra.iter().map(|s| s.to_string()));
        self.runner.run("docker", &args, timeout).await
    }

    pub async fn pull(&self) -> Result<CmdOutput, ExecError> {
        self.compose(&["pull"], PULL_TIMEOUT).await
    }

    pub async fn build(&self) -> Result<CmdOutput, ExecError> {
        self.compose(&["build", "--pull"], BUILD_TIMEOUT).await
    }

    pub async fn up(&self) -> Result<CmdOutput, ExecError> {
        self.compose(&["up", "-d", "--remove-orphans"], LIFECYCLE_TIMEOUT)
            .await
    }

    pub async fn down(&self) -> Result<CmdOutput, ExecError> {
        self.compose(&["down"], LIFECYCLE_TIMEOUT).await
    }

    pub async fn restart(&self) -> Result<CmdOutput, ExecError> {
        self.compose(&["restart"], LIFECYCLE_TIMEOUT).await
    }

    /// `compose ps` in machine-readable form: one JSON object per line.
    pub async fn ps(&self) -> Result<Vec<ServiceState>, ExecError> {
        let out = self
            .compose(&["ps", "--all", "--format", "json"], QUERY_TIMEOUT)
            .await?;
        Ok(parse_ps_lines(&out.stdout))
    }

    /// Host port bindings of one container, via `docker port`.
    pub async fn port_bindings(&self, container: &str) -> Result<Vec<String>, ExecError> {
        let out = self
            .runner
            .run_unchecked(
                "docker",
                &super::args(["port", container]),
                QUERY_TIMEOUT,
            )
            .await?;
        if !out.success() {
            // Container not running; nothing is published.
            return Ok(Vec::new());
        }
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Run a command inside a service container.
    pub async fn exec(
        &self,
        service: &str,
        command: &[&str],
        timeout: Duration,
    ) -> Result<CmdOutput, ExecError> {
        let mut extra = vec!["exec", "-T", service];
        extra.extend_from_slice(command);
        self.compose(&extra, timeout).await
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceState {
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

fn parse_ps_lines(stdout: &str) -> Vec<ServiceState> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<ServiceState>(line.trim()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compose_ps_json_lines() {
        let raw = concat!(
            r#"{"Service":"api","State":"running","Status":"Up 3 hours"}"#,
            "\n",
            r#"{"Service":"mongo","State":"exited","Status":"Exited (1) 2 minutes ago"}"#,
            "\n",
        );
        let states = parse_ps_lines(raw);
        assert_eq!(states.len(), 2);
        assert!(states[0].is_running());
        assert!(!states[1].is_running());
    }

    #[test]
    fn ignores_unparseable_lines() {
        let states = parse_ps_lines("not json\n");
        assert!(states.is_empty());
    }
}

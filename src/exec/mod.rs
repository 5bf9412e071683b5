//! External command boundary.
//!
//! Every external tool (docker, mongodump, mongorestore, mongosh, certbot,
//! nginx, openssl) is invoked through [`Runner::run`], which captures
//! bounded stdout/stderr and enforces a timeout. A runner is either local
//! or wraps each command in `ssh` for remote deployments.

pub mod docker;
pub mod mongo;

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr captured per stream (10 MiB). Output beyond
/// this is truncated.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {code}: {stderr}")]
    NonZero {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {elapsed_ms}ms")]
    Timeout { tool: String, elapsed_ms: u64 },

    #[error("{tool} produced unparseable output: {message}")]
    Output { tool: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
enum Target {
    Local,
    Ssh { user: String, host: String },
}

/// Executes external commands, locally or over ssh.
#[derive(Debug, Clone)]
pub struct Runner {
    target: Target,
}

impl Runner {
    pub fn local() -> Self {
        Self { target: Target::Local }
    }

    pub fn ssh(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            target: Target::Ssh {
                user: user.into(),
                host: host.into(),
            },
        }
    }

    /// Local runner unless the deploy config names a remote host.
    pub fn from_deploy(deploy: &crate::config::DeployConfig) -> Self {
        match &deploy.host {
            Some(host) => Self::ssh(deploy.user.clone(), host.clone()),
            None => Self::local(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.target, Target::Ssh { .. })
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        match &self.target {
            Target::Local => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Target::Ssh { user, host } => {
                // The remote side goes through a shell, so each argument is
                // single-quoted.
                let remote = std::iter::once(program.to_string())
                    .chain(args.iter().cloned())
                    .map(|a| shell_quote(&a))
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut cmd = Command::new("ssh");
                cmd.arg("-o")
                    .arg("BatchMode=yes")
                    .arg(format!("{user}@{host}"))
                    .arg(remote);
                cmd
            }
        }
    }

    /// Run a command and fail on non-zero exit, carrying captured stderr.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CmdOutput, ExecError> {
        let output = self.run_unchecked(program, args, timeout).await?;
        if !output.success() {
            return Err(ExecError::NonZero {
                tool: program.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a command and return its output regardless of exit status.
    /// Used where a non-zero exit is a classified result, not an abort.
    pub async fn run_unchecked(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CmdOutput, ExecError> {
        let mut cmd = self.command(program, args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        tracing::debug!(tool = program, remote = self.is_remote(), "exec");

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            tool: program.to_string(),
            source,
        })?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        // On timeout the child is dropped with kill_on_drop(true), which
        // kills the process instead of waiting forever.
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout_bytes = stdout_task.await.unwrap_or_default();
                let stderr_bytes = stderr_task.await.unwrap_or_default();
                Ok(CmdOutput {
                    stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                    exit_code: status.code().unwrap_or(-1),
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(ExecError::Io(e)),
            Err(_elapsed) => Err(ExecError::Timeout {
                tool: program.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

/// Single-quote an argument for the remote shell.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Convenience for building argument vectors from string literals.
pub fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_and_captures_stdout() {
        let out = Runner::local()
            .run("echo", &args(["hola"]), Duration::from_secs(5))
            .await
            .expect("echo runs");
        assert_eq!(out.stdout.trim(), "hola");
        assert!(out.success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = Runner::local()
            .run("false", &[], Duration::from_secs(5))
            .await
            .expect_err("false exits 1");
        match err {
            ExecError::NonZero { code, .. } => assert_eq!(code, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unchecked_returns_nonzero_output() {
        let out = Runner::local()
            .run_unchecked("false", &[], Duration::from_secs(5))
            .await
            .expect("runs");
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn hung_command_is_killed_at_timeout() {
        let err = Runner::local()
            .run("sleep", &args(["30"]), Duration::from_millis(200))
            .await
            .expect_err("must time out");
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("plain-arg_1.0"), "plain-arg_1.0");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn ssh_runner_wraps_program() {
        let runner = Runner::ssh("deploy", "10.0.0.5");
        assert!(runner.is_remote());
        let cmd = runner.command("docker", &args(["compose", "ps"]));
        assert_eq!(cmd.as_std().get_program(), "ssh");
    }
}

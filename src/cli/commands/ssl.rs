use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Subcommand;

use crate::cli::utils::{fail_if_unhealthy, output_checks, output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::{OpsConfig, SslConfig};
use crate::exec::{args, Runner};
use crate::probe::{aggregate, ProbeOutcome};

const CERTBOT_TIMEOUT: Duration = Duration::from_secs(300);
const NGINX_TIMEOUT: Duration = Duration::from_secs(30);
const OPENSSL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Subcommand)]
pub enum SslCommands {
    #[command(about = "Obtain certificates for the configured domains (webroot challenge)")]
    Issue,

    #[command(about = "Renew due certificates and reload nginx")]
    Renew,

    #[command(about = "Certificate expiry per domain, classified pass/warn/fail")]
    Status,
}

pub async fn handle(
    cmd: SslCommands,
    config: &OpsConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let runner = Runner::local();

    match cmd {
        SslCommands::Issue => {
            let ssl = require_domains(&config.ssl)?;
            let mut certbot_args = args([
                "certonly",
                "--webroot",
                "-w",
            ]);
            certbot_args.push(ssl.webroot.display().to_string());
            for domain in &ssl.domains {
                certbot_args.push("-d".to_string());
                certbot_args.push(domain.clone());
            }
            certbot_args.push("--non-interactive".to_string());
            certbot_args.push("--agree-tos".to_string());
            match &ssl.email {
                Some(email) => {
                    certbot_args.push("--email".to_string());
                    certbot_args.push(email.clone());
                }
                None => certbot_args.push("--register-unsafely-without-email".to_string()),
            }

            step_line(&output_format, "requesting certificates ...");
            runner.run("certbot", &certbot_args, CERTBOT_TIMEOUT).await?;

            reload_nginx(&runner, &output_format).await?;

            output_success(
                &output_format,
                &format!("Certificates issued for {}", ssl.domains.join(", ")),
                None,
            )
        }
        SslCommands::Renew => {
            step_line(&output_format, "renewing due certificates ...");
            runner
                .run("certbot", &args(["renew", "--quiet"]), CERTBOT_TIMEOUT)
                .await?;

            reload_nginx(&runner, &output_format).await?;

            output_success(&output_format, "Certificate renewal complete", None)
        }
        SslCommands::Status => {
            let ssl = require_domains(&config.ssl)?;
            let mut outcomes = Vec::new();
            for domain in &ssl.domains {
                outcomes.push(domain_status(&runner, ssl, domain).await);
            }
            let summary = aggregate(&outcomes);
            output_checks(&output_format, "certificates", &outcomes, &summary)?;
            fail_if_unhealthy(&summary, "certificate")
        }
    }
}

fn require_domains(ssl: &SslConfig) -> anyhow::Result<&SslConfig> {
    if ssl.domains.is_empty() {
        anyhow::bail!("SSL_DOMAINS is not set");
    }
    Ok(ssl)
}

/// Config test before reload so a broken config never takes nginx down.
async fn reload_nginx(runner: &Runner, output_format: &OutputFormat) -> anyhow::Result<()> {
    step_line(output_format, "reloading nginx ...");
    runner.run("nginx", &args(["-t"]), NGINX_TIMEOUT).await?;
    runner
        .run("nginx", &args(["-s", "reload"]), NGINX_TIMEOUT)
        .await?;
    Ok(())
}

pub(crate) async fn domain_status(runner: &Runner, ssl: &SslConfig, domain: &str) -> ProbeOutcome {
    let cert = ssl.cert_dir.join(domain).join("fullchain.pem");
    let openssl_args = args(["x509", "-enddate", "-noout", "-in"])
        .into_iter()
        .chain(std::iter::once(cert.display().to_string()))
        .collect::<Vec<_>>();

    let output = match runner.run("openssl", &openssl_args, OPENSSL_TIMEOUT).await {
        Ok(out) => out,
        Err(e) => return ProbeOutcome::fail(domain, format!("cannot read certificate: {e}"), 0),
    };

    let Some(not_after) = parse_not_after(output.stdout.trim()) else {
        return ProbeOutcome::fail(
            domain,
            format!("unparseable expiry: {}", output.stdout.trim()),
            0,
        );
    };

    let days_left = (not_after - Utc::now()).num_days();
    if days_left < 0 {
        ProbeOutcome::fail(domain, format!("expired {} days ago", -days_left), 0)
    } else if days_left <= ssl.warn_days {
        ProbeOutcome::warn(domain, format!("expires in {days_left} days"), 0)
    } else {
        ProbeOutcome::pass(domain, format!("valid for {days_left} days"), 0)
    }
}

/// Parse openssl's `notAfter=May 30 00:00:00 2026 GMT` line.
fn parse_not_after(line: &str) -> Option<DateTime<Utc>> {
    let raw = line.strip_prefix("notAfter=")?.trim();
    let naive = NaiveDateTime::parse_from_str(raw, "%b %e %H:%M:%S %Y GMT").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openssl_enddate() {
        let parsed = parse_not_after("notAfter=May 30 00:00:00 2026 GMT").expect("parses");
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2026-05-30");
    }

    #[test]
    fn parses_space_padded_day() {
        let parsed = parse_not_after("notAfter=Aug  7 12:30:01 2027 GMT").expect("parses");
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2027-08-07");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_not_after("no certificate here").is_none());
    }
}

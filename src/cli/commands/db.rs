use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::json;

use crate::cli::confirm::require_confirmation;
use crate::cli::utils::{output_success, step_line};
use crate::cli::OutputFormat;
use crate::config::OpsConfig;
use crate::exec::mongo::Mongo;

const ROTATED_PASSWORD_LENGTH: usize = 32;

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Ping MongoDB with the configured credentials")]
    Ping,

    #[command(about = "Collection and document counts")]
    Status,

    #[command(about = "Rotate the MongoDB application user's password (destructive)")]
    RotateCredentials {
        #[arg(long, help = "Skip the typed confirmation prompt")]
        yes: bool,
    },
}

pub async fn handle(
    cmd: DbCommands,
    config: &OpsConfig,
    env_path: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let mongo = Mongo::new(&config.mongo);

    match cmd {
        DbCommands::Ping => {
            if mongo.ping().await? {
                output_success(
                    &output_format,
                    &format!("MongoDB reachable at {}", config.mongo_uri_redacted()),
                    None,
                )
            } else {
                anyhow::bail!("MongoDB ping answered but not ok");
            }
        }
        DbCommands::Status => {
            let stats = mongo.stats().await?;
            output_success(
                &output_format,
                &format!(
                    "Database '{}': {} collections, {} documents",
                    mongo.database(),
                    stats.collections,
                    stats.objects
                ),
                Some(json!({
                    "database": mongo.database(),
                    "collections": stats.collections,
                    "documents": stats.objects,
                })),
            )
        }
        DbCommands::RotateCredentials { yes } => {
            rotate_credentials(config, env_path, yes, &output_format).await
        }
    }
}

/// Credential rotation, fixed sequence: resolve the env file first (fail
/// fast before any mutation), confirm, generate, updateUser, verify with
/// the new credentials, then rewrite the env file behind a .bak copy.
async fn rotate_credentials(
    config: &OpsConfig,
    env_path: Option<PathBuf>,
    yes: bool,
    output_format: &OutputFormat,
) -> anyhow::Result<()> {
    let env_path = env_path
        .ok_or_else(|| anyhow::anyhow!("credential rotation needs an env file (--env-file or VIGIA_ENV)"))?;
    if !env_path.exists() {
        anyhow::bail!("env file not found: {}", env_path.display());
    }

    let username = &config.mongo.username;
    require_confirmation(
        "ROTATE",
        yes,
        &format!(
            "This will rotate the password of MongoDB user '{username}' and rewrite {}",
            env_path.display()
        ),
    )?;

    let new_password = generate_password(ROTATED_PASSWORD_LENGTH);
    let mongo = Mongo::new(&config.mongo);

    step_line(output_format, "updating user password ...");
    mongo.update_user_password(username, &new_password).await?;

    step_line(output_format, "verifying new credentials ...");
    let verify_uri = config.mongo.uri_with(username, &new_password)?;
    if !mongo.ping_uri(&verify_uri).await? {
        anyhow::bail!(
            "rotation verification failed: new credentials for '{username}' were rejected; env file untouched"
        );
    }

    step_line(output_format, "rewriting env file ...");
    let backup = rewrite_env_var(&env_path, "MONGO_PASSWORD", &new_password)?;

    output_success(
        output_format,
        &format!(
            "Credentials rotated for '{username}'; previous env saved as {}",
            backup.display()
        ),
        Some(json!({
            "user": username,
            "env_file": env_path.display().to_string(),
            "env_backup": backup.display().to_string(),
        })),
    )
}

fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Replace (or append) `KEY=value` in an env file, writing a `.bak` safety
/// copy of the original first. Returns the backup path.
fn rewrite_env_var(path: &Path, key: &str, value: &str) -> anyhow::Result<PathBuf> {
    let original = fs::read_to_string(path)?;
    let backup = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.bak", ext.to_string_lossy()),
        None => "bak".to_string(),
    });
    fs::write(&backup, &original)?;

    let mut replaced = false;
    let mut lines: Vec<String> = original
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with(&format!("{key}=")) && !replaced {
                replaced = true;
                format!("{key}={value}")
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(format!("{key}={value}"));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_alphanumeric_and_long_enough() {
        let password = generate_password(ROTATED_PASSWORD_LENGTH);
        assert_eq!(password.len(), ROTATED_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password(ROTATED_PASSWORD_LENGTH));
    }

    #[test]
    fn rewrites_existing_key_and_keeps_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = dir.path().join(".env.production");
        fs::write(&env, "API_URL=http://x\nMONGO_PASSWORD=old\n# comment\n").expect("seed");

        let backup = rewrite_env_var(&env, "MONGO_PASSWORD", "newpass").expect("rewrite");

        let updated = fs::read_to_string(&env).expect("read");
        assert!(updated.contains("MONGO_PASSWORD=newpass"));
        assert!(updated.contains("API_URL=http://x"));
        assert!(updated.contains("# comment"));
        assert!(!updated.contains("MONGO_PASSWORD=old"));

        let saved = fs::read_to_string(&backup).expect("backup");
        assert!(saved.contains("MONGO_PASSWORD=old"));
    }

    #[test]
    fn appends_missing_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = dir.path().join(".env");
        fs::write(&env, "API_URL=http://x\n").expect("seed");

        rewrite_env_var(&env, "MONGO_PASSWORD", "fresh").expect("rewrite");

        let updated = fs::read_to_string(&env).expect("read");
        assert!(updated.ends_with("MONGO_PASSWORD=fresh\n"));
    }
}

//! mongodump / mongorestore / mongosh wrappers.
//!
//! MongoDB's native tools stay the backup and query boundary; this module
//! only builds their argument lists and parses the JSON that `mongosh
//! --eval` prints.

use std::path::Path;
use std::time::Duration;

use super::{ExecError, Runner};

const DUMP_TIMEOUT: Duration = Duration::from_secs(1800);
const RESTORE_TIMEOUT: Duration = Duration::from_secs(1800);
const QUERY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct Mongo {
    runner: Runner,
    uri: String,
    database: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DbStats {
    #[serde(default)]
    pub collections: i64,
    #[serde(default)]
    pub objects: i64,
}

impl Mongo {
    pub fn new(config: &crate::config::MongoConfig) -> Self {
        Self {
            runner: Runner::local(),
            uri: config.uri.clone(),
            database: config.database.clone(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Gzip archive dump of the configured database.
    pub async fn dump(&self, archive: &Path) -> Result<(), ExecError> {
        let args = vec![
            format!("--uri={}", self.uri),
            format!("--db={}", self.database),
            format!("--archive={}", archive.display()),
            "--gzip".to_string(),
            "--quiet".to_string(),
        ];
        self.runner.run("mongodump", &args, DUMP_TIMEOUT).await?;
        Ok(())
    }

    /// Restore from a gzip archive. `drop` removes existing collections
    /// before loading, the destructive half of the restore contract.
    pub async fn restore(&self, archive: &Path, drop: bool) -> Result<(), ExecError> {
        let mut args = vec![
            format!("--uri={}", self.uri),
            format!("--archive={}", archive.display()),
            "--gzip".to_string(),
            "--quiet".to_string(),
        ];
        if drop {
            args.push("--drop".to_string());
        }
        self.runner.run("mongorestore", &args, RESTORE_TIMEOUT).await?;
        Ok(())
    }

    /// `db.runCommand({ping: 1})` against the configured URI.
    pub async fn ping(&self) -> Result<bool, ExecError> {
        self.ping_uri(&self.uri).await
    }

    /// Ping with an explicit URI; used to verify rotated credentials
    /// before anything is persisted.
    pub async fn ping_uri(&self, uri: &str) -> Result<bool, ExecError> {
        let out = self
            .eval_with_uri(uri, "JSON.stringify(db.runCommand({ping: 1}))")
            .await?;
        Ok(out
            .get("ok")
            .and_then(|v| v.as_f64())
            .map(|ok| ok == 1.0)
            .unwrap_or(false))
    }

    /// Database stats, the post-condition count query after a restore.
    pub async fn stats(&self) -> Result<DbStats, ExecError> {
        let script = format!(
            "JSON.stringify(db.getSiblingDB({}).stats())",
            js_string(&self.database)
        );
        let value = self.eval_with_uri(&self.uri, &script).await?;
        Ok(serde_json::from_value(value).unwrap_or(DbStats {
            collections: 0,
            objects: 0,
        }))
    }

    /// Rotate the password of a database user via `db.updateUser`.
    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
    ) -> Result<(), ExecError> {
        let script = format!(
            "db.getSiblingDB('admin').updateUser({}, {{pwd: {}}})",
            js_string(username),
            js_string(new_password)
        );
        self.eval_raw(&self.uri, &script).await?;
        Ok(())
    }

    async fn eval_with_uri(
        &self,
        uri: &str,
        script: &str,
    ) -> Result<serde_json::Value, ExecError> {
        let out = self.eval_raw(uri, script).await?;
        serde_json::from_str(out.trim()).map_err(|e| ExecError::Output {
            tool: "mongosh".to_string(),
            message: e.to_string(),
        })
    }

    async fn eval_raw(&self, uri: &str, script: &str) -> Result<String, ExecError> {
        let args = vec![
            uri.to_string(),
            "--quiet".to_string(),
            "--eval".to_string(),
            script.to_string(),
        ];
        let out = self.runner.run("mongosh", &args, QUERY_TIMEOUT).await?;
        Ok(out.stdout)
    }
}

/// JSON string literal, which is also a valid JS string literal. Keeps
/// user-supplied names and generated passwords out of script syntax.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("a'b\"c"), r#""a'b\"c""#);
    }
}

//! Backup catalog: timestamped mongodump archives plus sidecar manifests.
//!
//! Layout under the backup directory:
//!   plataforma-20260807-153000.archive.gz
//!   plataforma-20260807-153000.archive.gz.manifest.json
//!   safety/...                            (pre-restore snapshots)
//!
//! "Latest" is resolved by file modification time, matching how the
//! rollback flow picks the newest backup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const ARCHIVE_SUFFIX: &str = ".archive.gz";
const MANIFEST_SUFFIX: &str = ".manifest.json";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no backups found in {0}")]
    NoBackups(PathBuf),

    #[error("archive checksum mismatch for {archive}: manifest {expected}, actual {actual}")]
    Corrupt {
        archive: String,
        expected: String,
        actual: String,
    },

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub archive: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub manifest: Option<Manifest>,
}

impl CatalogEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    dir: PathBuf,
}

impl BackupCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for pre-restore safety snapshots, kept apart from the
    /// rotation so pruning never deletes them.
    pub fn safety_dir(&self) -> PathBuf {
        self.dir.join("safety")
    }

    pub fn ensure_dirs(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.dir)?;
        fs::create_dir_all(self.safety_dir())?;
        Ok(())
    }

    /// Fresh archive path named after the database and the current UTC
    /// timestamp.
    pub fn new_archive_path(&self, database: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        self.dir.join(format!("{database}-{stamp}{ARCHIVE_SUFFIX}"))
    }

    pub fn new_safety_path(&self, database: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        self.safety_dir()
            .join(format!("{database}-pre-restore-{stamp}{ARCHIVE_SUFFIX}"))
    }

    /// Write the sidecar manifest for a freshly dumped archive.
    pub fn write_manifest(&self, archive: &Path, database: &str) -> Result<Manifest, BackupError> {
        let size_bytes = fs::metadata(archive)?.len();
        let sha256 = sha256_file(archive)?;
        let manifest = Manifest {
            database: database.to_string(),
            created_at: Utc::now(),
            archive: archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes,
            sha256,
        };
        let path = manifest_path(archive);
        let content = serde_json::to_string_pretty(&manifest).map_err(|source| {
            BackupError::Manifest {
                path: path.display().to_string(),
                source,
            }
        })?;
        fs::write(&path, content)?;
        Ok(manifest)
    }

    /// All catalog entries, newest first by modification time. Archives
    /// without a readable manifest are still listed (manifest = None) so
    /// operators can see them; they are just never restore candidates via
    /// `verified_latest`.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>, BackupError> {
        let mut entries = Vec::new();
        if !self.dir.exists() {
            return Ok(entries);
        }
        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let path = dirent.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let Some(name) = name else { continue };
            if !name.ends_with(ARCHIVE_SUFFIX) {
                continue;
            }
            let modified = dirent.metadata()?.modified()?;
            entries.push(CatalogEntry {
                manifest: read_manifest(&path)?,
                path,
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    /// Newest archive by modification time.
    pub fn latest(&self) -> Result<CatalogEntry, BackupError> {
        self.entries()?
            .into_iter()
            .next()
            .ok_or_else(|| BackupError::NoBackups(self.dir.clone()))
    }

    /// Verify an entry's archive against its manifest checksum. An entry
    /// that fails here must never be restored from.
    pub fn verify(&self, entry: &CatalogEntry) -> Result<(), BackupError> {
        let Some(manifest) = &entry.manifest else {
            return Err(BackupError::Corrupt {
                archive: entry.file_name(),
                expected: "<missing manifest>".to_string(),
                actual: String::new(),
            });
        };
        let actual = sha256_file(&entry.path)?;
        if actual != manifest.sha256 {
            return Err(BackupError::Corrupt {
                archive: entry.file_name(),
                expected: manifest.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Delete archives (and their manifests) beyond the retention count,
    /// oldest first. Returns the removed archive paths.
    pub fn prune(&self, retention: usize) -> Result<Vec<PathBuf>, BackupError> {
        let entries = self.entries()?;
        let mut removed = Vec::new();
        for entry in entries.into_iter().skip(retention) {
            let manifest = manifest_path(&entry.path);
            if manifest.exists() {
                fs::remove_file(&manifest)?;
            }
            fs::remove_file(&entry.path)?;
            removed.push(entry.path);
        }
        Ok(removed)
    }
}

fn manifest_path(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(MANIFEST_SUFFIX);
    archive.with_file_name(name)
}

fn read_manifest(archive: &Path) -> Result<Option<Manifest>, BackupError> {
    let path = manifest_path(archive);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let manifest = serde_json::from_str(&content).map_err(|source| BackupError::Manifest {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(manifest))
}

fn sha256_file(path: &Path) -> Result<String, io::Error> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_archive(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).expect("create archive");
        f.write_all(body).expect("write archive");
        path
    }

    #[test]
    fn manifest_roundtrip_and_verify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = BackupCatalog::new(dir.path());
        let archive = write_archive(dir.path(), &format!("db-x{ARCHIVE_SUFFIX}"), b"dump-bytes");

        let manifest = catalog.write_manifest(&archive, "db").expect("manifest");
        assert_eq!(manifest.size_bytes, 10);

        let entry = catalog.latest().expect("latest");
        assert_eq!(entry.manifest.as_ref().unwrap().sha256, manifest.sha256);
        catalog.verify(&entry).expect("checksum matches");
    }

    #[test]
    fn tampered_archive_fails_verification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = BackupCatalog::new(dir.path());
        let archive = write_archive(dir.path(), &format!("db-y{ARCHIVE_SUFFIX}"), b"original");
        catalog.write_manifest(&archive, "db").expect("manifest");

        fs::write(&archive, b"tampered").expect("overwrite");
        let entry = catalog.latest().expect("latest");
        assert!(matches!(
            catalog.verify(&entry),
            Err(BackupError::Corrupt { .. })
        ));
    }

    #[test]
    fn latest_is_newest_by_mtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = BackupCatalog::new(dir.path());
        let older = write_archive(dir.path(), &format!("db-a{ARCHIVE_SUFFIX}"), b"a");
        let newer = write_archive(dir.path(), &format!("db-b{ARCHIVE_SUFFIX}"), b"b");

        // Push the first archive's mtime into the past.
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        let f = fs::File::open(&older).expect("open");
        f.set_modified(past).expect("set mtime");

        assert_eq!(catalog.latest().expect("latest").path, newer);
    }

    #[test]
    fn prune_removes_oldest_beyond_retention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = BackupCatalog::new(dir.path());
        for (i, age_secs) in [(1u32, 300u64), (2, 200), (3, 100)] {
            let path = write_archive(dir.path(), &format!("db-{i}{ARCHIVE_SUFFIX}"), b"x");
            catalog.write_manifest(&path, "db").expect("manifest");
            let f = fs::File::open(&path).expect("open");
            f.set_modified(SystemTime::now() - std::time::Duration::from_secs(age_secs))
                .expect("set mtime");
        }

        let removed = catalog.prune(2).expect("prune");
        assert_eq!(removed.len(), 1);
        assert!(removed[0].ends_with(format!("db-1{ARCHIVE_SUFFIX}")));
        assert_eq!(catalog.entries().expect("entries").len(), 2);
        // Manifests of pruned archives are gone too.
        assert!(!manifest_path(&removed[0]).exists());
    }

    #[test]
    fn empty_catalog_has_no_latest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = BackupCatalog::new(dir.path());
        assert!(matches!(catalog.latest(), Err(BackupError::NoBackups(_))));
    }
}

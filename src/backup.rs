//! Zip archives of the data directory, with rotation.
//!
//! Archives are named `subwatch-backup-{YYYYMMDD-HHMMSS}.zip` (UTC) inside the
//! output directory. After each new archive, all but the newest `keep` are
//! deleted.

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::BackupConfig;
use crate::error::{BotError, Result};

const BACKUP_PREFIX: &str = "subwatch-backup-";
const BACKUP_EXT: &str = ".zip";

/// A produced archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Something that can turn the data directory into an archive.
pub trait BackupProducer: Send + Sync {
    /// Build a new archive. Blocking; call from `spawn_blocking`.
    fn produce(&self) -> Result<BackupArtifact>;
}

/// Zips `source_dir` recursively into `output_dir`.
#[derive(Debug, Clone)]
pub struct ZipBackupProducer {
    source_dir: PathBuf,
    output_dir: PathBuf,
    keep: usize,
}

impl ZipBackupProducer {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(&config.source_dir, &config.output_dir, config.keep_archives)
    }
}

impl BackupProducer for ZipBackupProducer {
    fn produce(&self) -> Result<BackupArtifact> {
        if !self.source_dir.is_dir() {
            return Err(BotError::Backup(format!(
                "source directory {} does not exist",
                self.source_dir.display()
            )));
        }
        fs::create_dir_all(&self.output_dir)?;

        let filename = format!(
            "{BACKUP_PREFIX}{}{BACKUP_EXT}",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        );
        let zip_path = self.output_dir.join(&filename);
        // Canonical output dir so it can be skipped when nested in the source.
        let skip_dir = fs::canonicalize(&self.output_dir).unwrap_or_else(|_| self.output_dir.clone());

        let file = fs::File::create(&zip_path)?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let files = add_directory_to_zip(&mut zip, &self.source_dir, "", &skip_dir, options)?;
        zip.finish()
            .map_err(|e| BotError::Backup(format!("zip finish error: {e}")))?;

        let size = fs::metadata(&zip_path)?.len();
        tracing::info!(path = %zip_path.display(), size, files, "backup archive written");

        let deleted = rotate_backups(&self.output_dir, self.keep)?;
        if deleted > 0 {
            tracing::debug!(deleted, "old backup archives rotated");
        }

        Ok(BackupArtifact {
            path: zip_path,
            size,
        })
    }
}

/// Add every file under `dir` to the archive, recursing into subdirectories
/// except `skip_dir`. Returns the number of files added.
fn add_directory_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    skip_dir: &Path,
    options: SimpleFileOptions,
) -> Result<usize> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut added = 0;
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let zip_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if canonical == skip_dir {
                continue;
            }
            added += add_directory_to_zip(zip, &path, &zip_name, skip_dir, options)?;
        } else if file_type.is_file() {
            if is_backup_name(&name) {
                continue;
            }
            if add_file_to_zip(zip, &path, &zip_name, options)? {
                added += 1;
            }
        }
    }
    Ok(added)
}

/// Returns `false` when the file could not be opened and was skipped.
fn add_file_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    zip_name: &str,
    options: SimpleFileOptions,
) -> Result<bool> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
            return Ok(false);
        }
    };
    zip.start_file(zip_name, options)
        .map_err(|e| BotError::Backup(format!("zip error: {e}")))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    zip.write_all(&buf)?;
    Ok(true)
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXT)
}

/// Keep the newest `keep_count` archives in `backup_dir`, deleting the rest.
/// Returns the number deleted; individual delete failures are logged.
pub fn rotate_backups(backup_dir: &Path, keep_count: usize) -> Result<usize> {
    if !backup_dir.exists() {
        return Ok(0);
    }

    let mut backups: Vec<PathBuf> = fs::read_dir(backup_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            is_backup_name(&name).then(|| entry.path())
        })
        .collect();

    // Timestamped names sort chronologically.
    backups.sort_by(|a, b| b.cmp(a));

    let mut deleted = 0;
    for old in backups.iter().skip(keep_count) {
        match fs::remove_file(old) {
            Ok(()) => deleted += 1,
            Err(e) => {
                tracing::warn!(path = %old.display(), error = %e, "failed to delete old backup");
            }
        }
    }
    Ok(deleted)
}

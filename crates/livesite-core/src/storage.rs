//! Document storage: atomic writes, timestamped backups and the cycle lock.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::{Error, Result};

/// `strftime` pattern embedded in backup file names.
const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

/// Write `contents` to `path` through a temp file and a rename, so readers
/// see either the old file or the new one, never a torn write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let persist = |what: &str, e: std::io::Error| {
        Error::Persistence(format!("{what} {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persist("failed to create parent of", e))?;
    }

    let tmp_path = sibling_with_suffix(path, ".tmp");
    if let Err(e) = write_synced(&tmp_path, contents) {
        let _ = fs::remove_file(&tmp_path);
        return Err(persist("failed to write temp file for", e));
    }

    match fs::rename(&tmp_path, path) {
        Ok(()) => {},
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            fs::remove_file(path).map_err(|e| persist("failed to replace", e))?;
            fs::rename(&tmp_path, path).map_err(|e| persist("failed to commit", e))?;
        },
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(persist("failed to commit", err));
        },
    }

    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Exclusive hold on a document. Released when dropped.
#[derive(Debug)]
pub struct DocumentLock {
    _file: File,
    path: PathBuf,
}

impl DocumentLock {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The document file plus its backup directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl DocumentStore {
    /// Create a store. `max_backups == 0` keeps every backup.
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            max_backups,
        }
    }

    /// Create a store from the `[website]` section.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.website.path,
            &config.website.backup_dir,
            config.website.max_backups,
        )
    }

    /// Path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding backups.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Whether the document exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the whole document.
    pub fn read(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Replace the document atomically.
    pub fn write(&self, html: &str) -> Result<()> {
        write_atomic(&self.path, html.as_bytes())?;
        debug!(path = %self.path.display(), bytes = html.len(), "saved document");
        Ok(())
    }

    /// Take the exclusive cycle lock, failing fast with [`Error::Locked`]
    /// when another process holds it.
    pub fn lock(&self) -> Result<DocumentLock> {
        let path = sibling_with_suffix(&self.path, ".lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(DocumentLock { _file: file, path }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(Error::Locked(self.path.display().to_string()))
            },
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn backup_parts(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map_or_else(|| "document".to_string(), |s| s.to_string_lossy().into_owned());
        let ext = self
            .path
            .extension()
            .map_or_else(|| "html".to_string(), |s| s.to_string_lossy().into_owned());
        (stem, ext)
    }

    /// Sort key of a backup file name: `(timestamp, counter)`.
    fn backup_key(&self, name: &str) -> Option<(String, u32)> {
        let (stem, ext) = self.backup_parts();
        let middle = name
            .strip_prefix(&format!("{stem}_"))?
            .strip_suffix(&format!(".{ext}"))?;
        let (stamp, counter) = match middle.get(15..) {
            Some("") => (middle, 1),
            Some(rest) => (&middle[..15], rest.strip_prefix('_')?.parse().ok()?),
            None => return None,
        };
        let digits = stamp.chars().filter(char::is_ascii_digit).count();
        (digits == 14 && stamp.as_bytes().get(8) == Some(&b'_')).then(|| (stamp.to_string(), counter))
    }

    /// Backups, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keyed = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(key) = self.backup_key(&name.to_string_lossy()) {
                keyed.push((key, entry.path()));
            }
        }
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, path)| path).collect())
    }

    /// Copy the current document into the backup directory, then prune.
    /// Returns `None` when there is no document yet.
    pub fn backup(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if !self.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            Error::Persistence(format!(
                "failed to create backup directory {}: {e}",
                self.backup_dir.display()
            ))
        })?;

        let (stem, ext) = self.backup_parts();
        let stamp = now.format(BACKUP_STAMP);
        let mut target = self.backup_dir.join(format!("{stem}_{stamp}.{ext}"));
        let mut counter = 2;
        while target.exists() {
            target = self.backup_dir.join(format!("{stem}_{stamp}_{counter}.{ext}"));
            counter += 1;
        }

        fs::copy(&self.path, &target).map_err(|e| {
            Error::Persistence(format!("failed to back up to {}: {e}", target.display()))
        })?;
        info!(backup = %target.display(), "backed up document");

        self.prune()?;
        Ok(Some(target))
    }

    /// Delete the oldest backups beyond `max_backups`. Returns how many were
    /// removed.
    pub fn prune(&self) -> Result<usize> {
        if self.max_backups == 0 {
            return Ok(0);
        }
        let backups = self.backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);
        for old in &backups[..excess] {
            if let Err(e) = fs::remove_file(old) {
                warn!(backup = %old.display(), error = %e, "failed to remove old backup");
            }
        }
        if excess > 0 {
            debug!(removed = excess, "pruned backups");
        }
        Ok(excess)
    }
}

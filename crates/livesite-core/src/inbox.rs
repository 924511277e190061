//! Message inbox.
//!
//! Operators drop `*.txt` files into the inbox directory. A cycle reads them
//! oldest first and renames each consumed file to `*.read`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::Result;
use crate::config::Config;

/// One pending message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// File name without the directory.
    pub name: String,
    /// Trimmed file content.
    pub content: String,
    #[serde(skip)]
    path: PathBuf,
}

/// Directory of pending messages.
#[derive(Debug, Clone)]
pub struct Inbox {
    dir: PathBuf,
}

impl Inbox {
    /// Inbox at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Inbox at `communication.message_dir`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.communication.message_dir)
    }

    /// Inbox directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pending messages, oldest modification time first. A missing
    /// directory holds no messages. Empty files are skipped.
    pub fn pending(&self) -> Result<Vec<Message>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            found.push((modified, path));
        }
        found.sort();

        let mut messages = Vec::with_capacity(found.len());
        for (_, path) in found {
            let content = fs::read_to_string(&path)?.trim().to_string();
            if content.is_empty() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            messages.push(Message {
                name,
                content,
                path,
            });
        }
        tracing::debug!(dir = %self.dir.display(), count = messages.len(), "read inbox");
        Ok(messages)
    }

    /// Rename consumed messages to `*.read`.
    pub fn mark_read(&self, messages: &[Message]) -> Result<()> {
        for message in messages {
            let target = message.path.with_extension("read");
            fs::rename(&message.path, &target)?;
            tracing::debug!(message = %message.name, "marked message read");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_aged(dir: &Path, name: &str, content: &str, age_secs: u64) {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_missing_dir_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let inbox = Inbox::new(dir.path().join("absent"));
        assert!(inbox.pending()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_pending_orders_by_age_and_filters() -> Result<()> {
        // Given: two messages, an empty one, a read one and a non-text file
        let dir = TempDir::new()?;
        write_aged(dir.path(), "newer.txt", "second\n", 10);
        write_aged(dir.path(), "older.txt", "  first  ", 100);
        write_aged(dir.path(), "blank.txt", "   ", 50);
        write_aged(dir.path(), "done.read", "old news", 200);
        write_aged(dir.path(), "notes.md", "ignored", 300);

        // When
        let messages = Inbox::new(dir.path()).pending()?;

        // Then
        let names: Vec<_> = messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["older.txt", "newer.txt"]);
        assert_eq!(messages[0].content, "first");
        Ok(())
    }

    #[test]
    fn test_mark_read_renames() -> Result<()> {
        let dir = TempDir::new()?;
        write_aged(dir.path(), "hello.txt", "hi", 5);
        let inbox = Inbox::new(dir.path());

        let messages = inbox.pending()?;
        inbox.mark_read(&messages)?;

        assert!(!dir.path().join("hello.txt").exists());
        assert!(dir.path().join("hello.read").exists());
        assert!(inbox.pending()?.is_empty());
        Ok(())
    }
}

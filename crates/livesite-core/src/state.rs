//! Persistent agent state: history lists, staleness records and seed ideas.
//!
//! Stored as one pretty-printed JSON document. The staleness maps are
//! flattened into the top level as `website_hashes` and `section_modified`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, EntityConfig};
use crate::staleness::StalenessTracker;
use crate::storage::write_atomic;
use crate::{Error, Result};

/// Characters of generated content kept in a modification summary.
pub const SUMMARY_CHARS: usize = 500;
/// Characters of prompt context kept in a conversation entry.
pub const CONTEXT_CHARS: usize = 500;
/// Characters of generated response kept in a conversation entry.
pub const RESPONSE_CHARS: usize = 1000;

/// Keep the first `limit` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationEntry {
    /// When the change was written.
    pub timestamp: DateTime<Utc>,
    /// Section identifier, sentinel, or `complete-replacement`.
    #[serde(alias = "section")]
    pub target: String,
    /// Patch strategy that succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Content classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    /// Truncated generated content.
    #[serde(alias = "content")]
    pub content_summary: String,
}

/// One generator exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// When the response arrived.
    pub timestamp: DateTime<Utc>,
    /// Truncated user context sent to the generator.
    pub context: String,
    /// Truncated response.
    pub response: String,
    /// Target the cycle selected.
    #[serde(default, alias = "target_section")]
    pub target: String,
}

/// Everything that survives between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// First time the state was created.
    pub creation_date: DateTime<Utc>,
    /// Applied changes, oldest first.
    #[serde(default)]
    pub website_modifications: Vec<ModificationEntry>,
    /// Generator exchanges, oldest first.
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
    /// Section hashes and modification times.
    #[serde(flatten)]
    pub staleness: StalenessTracker,
    /// Free-form ideas fed into prompts.
    #[serde(default)]
    pub ideas: Vec<String>,
    /// Free-form personality traits fed into prompts.
    #[serde(default)]
    pub personality_traits: Vec<String>,
}

impl AgentState {
    /// Fresh state seeded from the entity configuration.
    pub fn new(entity: &EntityConfig, now: DateTime<Utc>) -> Self {
        Self {
            creation_date: now,
            website_modifications: Vec::new(),
            conversations: Vec::new(),
            staleness: StalenessTracker::default(),
            ideas: entity.ideas.clone(),
            personality_traits: entity.personality.clone(),
        }
    }

    /// Time of the newest applied change.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.website_modifications.last().map(|m| m.timestamp)
    }

    /// Append a modification, keeping the newest `max_history` entries.
    pub fn push_modification(&mut self, mut entry: ModificationEntry, max_history: usize) {
        entry.content_summary = truncate_chars(&entry.content_summary, SUMMARY_CHARS);
        self.website_modifications.push(entry);
        cap(&mut self.website_modifications, max_history);
    }

    /// Append a conversation, keeping the newest `max_history` entries.
    pub fn push_conversation(&mut self, mut entry: ConversationEntry, max_history: usize) {
        entry.context = truncate_chars(&entry.context, CONTEXT_CHARS);
        entry.response = truncate_chars(&entry.response, RESPONSE_CHARS);
        self.conversations.push(entry);
        cap(&mut self.conversations, max_history);
    }
}

fn cap<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

/// Loads and saves [`AgentState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `entity.state_file`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.entity.state_file)
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the state file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the state, or start a fresh one when the file does not exist.
    pub fn load_or_new(&self, entity: &EntityConfig, now: DateTime<Utc>) -> Result<AgentState> {
        if !self.exists() {
            tracing::info!(path = %self.path.display(), "no state file yet; starting fresh");
            return Ok(AgentState::new(entity, now));
        }
        self.load()
    }

    /// Load an existing state file.
    pub fn load(&self) -> Result<AgentState> {
        let json = fs::read_to_string(&self.path)?;
        serde_json::from_str(&json).map_err(|e| {
            Error::Serialization(format!(
                "failed to parse state file {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Save atomically.
    pub fn save(&self, state: &AgentState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes())?;
        tracing::debug!(path = %self.path.display(), "saved state");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn modification(target: &str, content: &str) -> ModificationEntry {
        ModificationEntry {
            timestamp: now(),
            target: target.into(),
            strategy: Some("append-to-log".into()),
            classification: Some("plain-text".into()),
            content_summary: content.into(),
        }
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly", 7), "exactly");
        assert_eq!(truncate_chars("πππππ", 2), "ππ...");
    }

    #[test]
    fn test_fresh_state_is_seeded_from_entity() {
        let entity = EntityConfig::default();
        let state = AgentState::new(&entity, now());
        assert_eq!(state.ideas, entity.ideas);
        assert_eq!(state.personality_traits, entity.personality);
        assert_eq!(state.last_update(), None);
    }

    #[test]
    fn test_history_is_capped_and_truncated() {
        let mut state = AgentState::new(&EntityConfig::default(), now());
        for i in 0..5 {
            state.push_modification(modification(&format!("section_{i}"), &"x".repeat(600)), 3);
        }
        let targets: Vec<_> = state
            .website_modifications
            .iter()
            .map(|m| m.target.as_str())
            .collect();
        assert_eq!(targets, vec!["section_2", "section_3", "section_4"]);
        assert_eq!(state.website_modifications[0].content_summary.chars().count(), 503);

        state.push_conversation(
            ConversationEntry {
                timestamp: now(),
                context: "c".repeat(501),
                response: "r".repeat(1000),
                target: "new-section".into(),
            },
            3,
        );
        assert!(state.conversations[0].context.ends_with("..."));
        assert_eq!(state.conversations[0].response.len(), 1000);
    }

    #[test]
    fn test_save_and_load_roundtrip() -> Result<()> {
        // Given: a state with history and staleness records
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("memories.json"));
        let mut state = AgentState::new(&EntityConfig::default(), now());
        state.push_modification(modification("section_contact", "hello"), 10);
        state.staleness.record_modification("section_contact", now());

        // When
        store.save(&state)?;
        let loaded = store.load()?;

        // Then: identical, with the staleness maps at the top level
        assert_eq!(loaded, state);
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.path())?)?;
        assert!(raw.get("section_modified").is_some());
        assert!(raw.get("website_hashes").is_some());
        Ok(())
    }

    #[test]
    fn test_load_accepts_sparse_and_legacy_files() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memories.json");
        fs::write(
            &path,
            r#"{
                "creation_date": "2025-03-01T00:00:00Z",
                "website_modifications": [
                    {"timestamp": "2025-03-02T00:00:00Z", "section": "title", "content": "New title"}
                ]
            }"#,
        )?;

        let state = StateStore::new(&path).load()?;
        assert_eq!(state.website_modifications[0].target, "title");
        assert_eq!(state.website_modifications[0].content_summary, "New title");
        assert!(state.conversations.is_empty());
        assert_eq!(state.staleness, StalenessTracker::default());
        Ok(())
    }

    #[test]
    fn test_missing_file_starts_fresh_and_corrupt_file_errors() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("memories.json"));
        let fresh = store.load_or_new(&EntityConfig::default(), now())?;
        assert_eq!(fresh.creation_date, now());

        fs::write(store.path(), "{ not json")?;
        assert!(matches!(
            store.load_or_new(&EntityConfig::default(), now()),
            Err(Error::Serialization(_))
        ));
        Ok(())
    }
}

//! One wake-up cycle, plus the read-only and setup operations around it.
//!
//! A cycle runs lock, load, index, gather, select, generate, classify,
//! back up, patch, then persist. Apart from creating a missing default
//! document, nothing before the backup touches the disk, so a generator
//! failure leaves no trace. The backup is skipped when the content cannot
//! apply to the target at all. The document is only rewritten once a patch
//! has applied.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{ContentKind, classify};
use crate::config::Config;
use crate::dom::Document;
use crate::generator::Generator;
use crate::inbox::Inbox;
use crate::news;
use crate::patch::{PatchApplier, PatchOutcome};
use crate::prompt::PromptContext;
use crate::random::RandomSource;
use crate::sections::{SectionIndex, SectionIndexer};
use crate::staleness::{AnalysisReport, SectionState, Target};
use crate::state::{AgentState, ConversationEntry, ModificationEntry, StateStore};
use crate::storage::DocumentStore;
use crate::template::default_document;
use crate::{Error, Result};

/// What a finished cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Cycle start.
    pub started_at: DateTime<Utc>,
    /// Selected target.
    pub target: Target,
    /// Classification of the generated content.
    pub classification: ContentKind,
    /// Patch result.
    pub outcome: PatchOutcome,
    /// Backup written before patching.
    pub backup: Option<PathBuf>,
    /// Identifiers whose content changed, now recorded as modified.
    pub modified_sections: Vec<String>,
    /// Inbox messages consumed.
    pub messages: usize,
    /// Headlines offered to the generator.
    pub headlines: usize,
}

/// What `setup` created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    /// The default document was written.
    pub document_created: bool,
    /// A fresh state file was written.
    pub state_created: bool,
}

/// Wires the stores, indexer and applier for one configuration.
#[derive(Debug)]
pub struct Agent {
    config: Config,
    indexer: SectionIndexer,
    applier: PatchApplier,
    documents: DocumentStore,
    states: StateStore,
    inbox: Inbox,
}

impl Agent {
    /// Build an agent from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            indexer: SectionIndexer::from_config(&config)?,
            applier: PatchApplier::from_config(&config)?,
            documents: DocumentStore::from_config(&config),
            states: StateStore::from_config(&config),
            inbox: Inbox::from_config(&config),
            config,
        })
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Document store.
    pub const fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// State store.
    pub const fn states(&self) -> &StateStore {
        &self.states
    }

    /// Create the default document, the state file and the inbox directory
    /// where missing. Existing files are left alone.
    pub fn setup(&self, now: DateTime<Utc>) -> Result<SetupReport> {
        let _lock = self.documents.lock()?;

        let document_created = !self.documents.exists();
        if document_created {
            self.documents.write(&default_document(&self.config.entity))?;
            info!(path = %self.documents.path().display(), "created default document");
        }

        let state_created = !self.states.exists();
        if state_created {
            let mut state = AgentState::new(&self.config.entity, now);
            let doc = Document::parse(&self.documents.read()?)?;
            state.staleness.observe(&self.indexer.index(&doc));
            self.states.save(&state)?;
            info!(path = %self.states.path().display(), "created state file");
        }

        std::fs::create_dir_all(self.inbox.dir())?;
        Ok(SetupReport {
            document_created,
            state_created,
        })
    }

    /// Change states and the selection a cycle would make right now.
    /// Nothing is written.
    pub fn analyze(&self, now: DateTime<Utc>, rng: &mut dyn RandomSource) -> Result<AnalysisReport> {
        let doc = self.load_document()?;
        let state = self.states.load_or_new(&self.config.entity, now)?;
        let index = self.indexer.index(&doc);
        Ok(state
            .staleness
            .analyze(&index, &self.config.selection, now, rng))
    }

    fn load_document(&self) -> Result<Document> {
        if !self.documents.exists() {
            return Err(Error::Other(format!(
                "no document at {}; run setup first",
                self.documents.path().display()
            )));
        }
        Document::parse(&self.documents.read()?)
    }

    /// Run one cycle.
    ///
    /// Fails without touching the document, the backups or the state file
    /// when the generator fails or the content is unusable. Fails after the
    /// backup, still without writing the document or history, when every
    /// patch strategy fails.
    pub async fn run_cycle(
        &self,
        generator: &dyn Generator,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Result<CycleReport> {
        let _lock = self.documents.lock()?;
        info!("waking up");

        let mut state = self.states.load_or_new(&self.config.entity, now)?;
        if !self.documents.exists() {
            self.documents.write(&default_document(&self.config.entity))?;
            info!(path = %self.documents.path().display(), "created default document");
        }
        let mut doc = self.load_document()?;
        let index = self.indexer.index(&doc);
        log_states(&state.staleness.observe(&index));

        let (messages, headlines) = tokio::join!(
            async {
                self.inbox.pending().unwrap_or_else(|e| {
                    warn!(category = e.category(), "inbox unreadable: {e}");
                    Vec::new()
                })
            },
            news::gather(&self.config.news)
        );

        let selection = state
            .staleness
            .select(&index, &self.config.selection, now, rng);
        let target = selection.target.clone();
        info!(section = %target, sections = index.len(), "selected target");

        let prompt = PromptContext {
            entity: &self.config.entity,
            state: &state,
            doc: &doc,
            index: &index,
            selection: &selection,
            messages: &messages,
            news: &headlines,
        }
        .build(rng);

        let response = generator.generate(&prompt.system, &prompt.user).await?;
        let classification = classify(&response)?;
        info!(section = %target, classification = %classification.kind, "classified content");

        // A deliberate no-op writes nothing, not even a backup
        let backup = if self
            .applier
            .plan(&doc, &index, &classification, &target)
            .is_some()
        {
            self.documents.backup(now)?
        } else {
            None
        };
        let outcome = self
            .applier
            .apply(&mut doc, &index, &classification, &target, now)?;

        let mut modified_sections = Vec::new();
        if let PatchOutcome::Applied {
            strategy,
            target_label,
            ..
        } = &outcome
        {
            self.documents.write(&doc.serialize())?;
            let after = self.indexer.index(&doc);
            modified_sections = changed_identifiers(&index, &after);
            for identifier in &modified_sections {
                state.staleness.record_modification(identifier, now);
            }
            state.staleness.observe(&after);
            state.push_modification(
                ModificationEntry {
                    timestamp: now,
                    target: target_label.clone(),
                    strategy: Some(strategy.as_str().to_string()),
                    classification: Some(classification.kind.as_str().to_string()),
                    content_summary: classification.content.clone(),
                },
                self.config.entity.max_history,
            );
        }

        state.push_conversation(
            ConversationEntry {
                timestamp: now,
                context: prompt.user,
                response,
                target: target.label().to_string(),
            },
            self.config.entity.max_history,
        );
        self.states.save(&state)?;

        if let Err(e) = self.inbox.mark_read(&messages) {
            warn!(category = e.category(), "failed to mark messages read: {e}");
        }

        let report = CycleReport {
            started_at: now,
            target,
            classification: classification.kind,
            outcome,
            backup,
            modified_sections,
            messages: messages.len(),
            headlines: headlines.iter().map(|s| s.headlines.len()).sum(),
        };
        info!(
            applied = report.outcome.is_applied(),
            modified = report.modified_sections.len(),
            "going back to sleep"
        );
        Ok(report)
    }
}

/// Identifiers that are new in `after` or whose hash differs from `before`.
fn changed_identifiers(before: &SectionIndex, after: &SectionIndex) -> Vec<String> {
    after
        .iter()
        .filter(|section| {
            before
                .get(&section.identifier)
                .is_none_or(|old| old.content_hash != section.content_hash)
        })
        .map(|section| section.identifier.clone())
        .collect()
}

fn log_states(states: &BTreeMap<String, SectionState>) {
    let changed: Vec<&str> = states
        .iter()
        .filter(|(_, state)| **state == SectionState::SeenChangedExternally)
        .map(|(identifier, _)| identifier.as_str())
        .collect();
    if !changed.is_empty() {
        info!(sections = ?changed, "sections changed outside the agent");
    }
    debug!(observed = states.len(), "observed section hashes");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Canned {
        reply: Result<String>,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(Error::Generator("boom".into())),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for Canned {
        async fn generate(&self, _system: &str, user: &str) -> Result<String> {
            self.seen.lock().unwrap().push(user.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Generator(e.to_string())),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn agent(dir: &TempDir) -> Agent {
        let mut config = Config::default();
        config.website.path = dir.path().join("site/index.html");
        config.website.backup_dir = dir.path().join("site/backups");
        config.entity.state_file = dir.path().join("memories.json");
        config.communication.message_dir = dir.path().join("messages");
        config.news.enabled = false;
        // Keep every section in the pool so no sampling draws are made
        config.selection.max_sections = 100;
        Agent::new(config).unwrap()
    }

    /// Skip both sentinels, then take the top of the pool.
    fn no_sentinels() -> ScriptedRandom {
        ScriptedRandom::constant(0.99)
    }

    #[test]
    fn test_setup_is_idempotent() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);

        let first = agent.setup(now())?;
        assert!(first.document_created && first.state_created);
        assert!(dir.path().join("messages").is_dir());

        let second = agent.setup(now())?;
        assert!(!second.document_created && !second.state_created);
        Ok(())
    }

    #[test]
    fn test_analyze_requires_document_and_writes_nothing() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        assert!(matches!(
            agent.analyze(now(), &mut no_sentinels()),
            Err(Error::Other(_))
        ));

        agent.setup(now())?;
        let before = std::fs::read_to_string(agent.states().path())?;
        let report = agent.analyze(now(), &mut no_sentinels())?;
        assert!(!report.selection.ranking.is_empty());
        assert!(report.unseen.is_empty());
        assert_eq!(std::fs::read_to_string(agent.states().path())?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_appends_plain_text_to_log() -> Result<()> {
        // Given: a freshly set up site and a message in the inbox
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;
        std::fs::write(dir.path().join("messages/hello.txt"), "Please say hi")?;
        let generator = Canned::ok("Hello\n\nWorld");

        // When
        let report = agent
            .run_cycle(&generator, now(), &mut no_sentinels())
            .await?;

        // Then: the log holds both paragraphs and history was recorded
        assert!(report.outcome.is_applied());
        assert_eq!(report.classification, ContentKind::PlainText);
        assert_eq!(report.messages, 1);
        assert!(report.backup.as_ref().is_some_and(|p| p.exists()));
        assert!(generator.seen.lock().unwrap()[0].contains("Please say hi"));

        let html = std::fs::read_to_string(agent.documents().path())?;
        let doc = Document::parse(&html)?;
        let log = doc.select_first(".modifications")?.unwrap();
        let paragraphs: Vec<_> = doc
            .select_within(log, "p")?
            .into_iter()
            .map(|p| doc.text_content(p))
            .collect();
        assert_eq!(paragraphs, vec!["Hello", "World"]);

        let state = agent.states().load()?;
        assert_eq!(state.website_modifications.len(), 1);
        assert_eq!(state.conversations.len(), 1);
        assert!(report.modified_sections.iter().any(|id| id.starts_with("log_")));
        for identifier in &report.modified_sections {
            assert_eq!(state.staleness.last_modified(identifier), Some(now()));
        }
        assert!(dir.path().join("messages/hello.read").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_generator_failure_leaves_everything_untouched() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;
        let document = std::fs::read_to_string(agent.documents().path())?;
        let state = std::fs::read_to_string(agent.states().path())?;

        let result = agent
            .run_cycle(&Canned::failing(), now(), &mut no_sentinels())
            .await;

        assert!(matches!(result, Err(Error::Generator(_))));
        assert_eq!(std::fs::read_to_string(agent.documents().path())?, document);
        assert_eq!(std::fs::read_to_string(agent.states().path())?, state);
        assert!(agent.documents().backups()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_whole_document_with_plain_text_is_skipped() -> Result<()> {
        // Given: rolls that offer and pick the whole-document sentinel
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;
        let document = std::fs::read_to_string(agent.documents().path())?;
        let mut rng = ScriptedRandom::new([0.99, 0.0, 0.0], 0.99);

        // When
        let report = agent
            .run_cycle(&Canned::ok("just words"), now(), &mut rng)
            .await?;

        // Then: nothing applied, document unchanged, conversation kept
        assert_eq!(report.target, Target::WholeDocument);
        assert!(!report.outcome.is_applied());
        assert_eq!(std::fs::read_to_string(agent.documents().path())?, document);
        assert!(report.backup.is_none());
        assert!(agent.documents().backups()?.is_empty());
        let state = agent.states().load()?;
        assert!(state.website_modifications.is_empty());
        assert_eq!(state.conversations[0].target, "whole-document");
        Ok(())
    }

    /// Offer and pick the whole-document sentinel, then nothing else.
    fn whole_document() -> ScriptedRandom {
        ScriptedRandom::new([0.99, 0.0, 0.0], 0.99)
    }

    #[tokio::test]
    async fn test_whole_document_replacement_backs_up_first() -> Result<()> {
        // Given: a set-up site and a generator returning a complete page
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;
        let original = std::fs::read_to_string(agent.documents().path())?;
        let page = "<!DOCTYPE html><html><head><title>Reborn</title></head>\
                    <body><div id=\"fresh\">All new</div>\
                    <footer><span id=\"last-update\">Never</span></footer></body></html>";

        // When
        let report = agent
            .run_cycle(&Canned::ok(page), now(), &mut whole_document())
            .await?;

        // Then: the backup holds the page as it was before the cycle
        assert_eq!(report.target, Target::WholeDocument);
        assert!(matches!(
            report.outcome,
            PatchOutcome::Applied { strategy: crate::patch::Strategy::ReplaceDocument, .. }
        ));
        let backup = report.backup.expect("backup written");
        assert_eq!(std::fs::read_to_string(&backup)?, original);
        assert_eq!(agent.documents().backups()?, vec![backup]);

        let doc = Document::parse(&std::fs::read_to_string(agent.documents().path())?)?;
        assert!(doc.find_by_id("fresh").is_some());
        assert_eq!(
            doc.text_content(doc.find_by_id("last-update").unwrap()),
            "2025-06-01 03:00:00"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_whole_document_with_tagged_fragment_is_skipped() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;
        let document = std::fs::read_to_string(agent.documents().path())?;
        let generator = Canned::ok("<!-- REPLACE masthead --><header class=\"masthead\">x</header>");

        let report = agent
            .run_cycle(&generator, now(), &mut whole_document())
            .await?;

        assert!(!report.outcome.is_applied());
        assert!(matches!(report.classification, ContentKind::TaggedFragment { .. }));
        assert_eq!(std::fs::read_to_string(agent.documents().path())?, document);
        assert!(agent.documents().backups()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tagged_inserts_land_at_body_edges() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir);
        agent.setup(now())?;

        // When: a header-named fragment, then a footer-named one
        let header = Canned::ok("<!-- INSERT header-banner --><div id=\"banner\">Hi</div>");
        let report = agent.run_cycle(&header, now(), &mut no_sentinels()).await?;
        assert!(report.outcome.is_applied());
        let footer = Canned::ok("<!-- INSERT footer-note --><p id=\"note\">Bye</p>");
        let later = now() + chrono::Duration::days(1);
        let report = agent.run_cycle(&footer, later, &mut no_sentinels()).await?;
        assert!(report.outcome.is_applied());

        // Then: the banner opens the body and the note closes it
        let doc = Document::parse(&std::fs::read_to_string(agent.documents().path())?)?;
        let children = doc.element_children(doc.body().unwrap());
        assert_eq!(doc.attr(children[0], "id"), Some("banner"));
        assert_eq!(doc.attr(*children.last().unwrap(), "id"), Some("note"));
        assert_eq!(agent.documents().backups()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_changed_identifiers_include_new_and_rehashed() -> Result<()> {
        let config = Config::default();
        let indexer = SectionIndexer::from_config(&config)?;
        let before = indexer.index(&Document::parse(
            r#"<body><div id="a">1</div><div id="b">2</div></body>"#,
        )?);
        let after = indexer.index(&Document::parse(
            r#"<body><div id="a">1</div><div id="b">3</div><div id="c">4</div></body>"#,
        )?);
        assert_eq!(
            changed_identifiers(&before, &after),
            vec!["body", "section_b", "section_c"]
        );
        Ok(())
    }
}

//! Configuration for livesite.
//!
//! Configuration is a single TOML file. Every section and every key has a
//! default, so an empty file (or no file at all) yields a working setup that
//! keeps its site under `./site/`.
//!
//! ## Location
//!
//! The config path is resolved in this order:
//!
//! 1. An explicit path (the CLI `--config` flag)
//! 2. The `LIVESITE_CONFIG` environment variable
//! 3. `./livesite.toml` when it exists
//! 4. `livesite.toml` in the platform config directory
//!
//! Relative paths inside the file resolve against the file's directory.
//!
//! ## Example
//!
//! ```toml
//! [website]
//! path = "site/index.html"
//! backup_dir = "site/backups"
//! max_backups = 30
//!
//! [generator]
//! model = "claude-3-7-sonnet-20250219"
//! api_key_env = "ANTHROPIC_API_KEY"
//!
//! [selection]
//! max_sections = 5
//! new_section_probability = 0.3
//!
//! [[news.sources]]
//! name = "Hacker News"
//! url = "https://news.ycombinator.com/news"
//! kind = "hacker_news"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::dom::SelectorList;
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LIVESITE_CONFIG";

/// File name looked up in the working and platform config directories.
pub const CONFIG_FILE_NAME: &str = "livesite.toml";

/// Elements treated as the standing modifications log.
pub const DEFAULT_LOG_SELECTOR: &str = ".modifications, #evolving-thoughts, #ai-thoughts";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document location and backups.
    pub website: WebsiteConfig,
    /// Identity and history settings of the agent.
    pub entity: EntityConfig,
    /// Text generator endpoint.
    pub generator: GeneratorConfig,
    /// Message inbox.
    pub communication: CommunicationConfig,
    /// Daily wake-up schedule.
    pub schedule: ScheduleConfig,
    /// News sources feeding the prompt.
    pub news: NewsConfig,
    /// Target selection weights and probabilities.
    pub selection: SelectionConfig,
    /// Section indexing rules.
    pub indexing: IndexingConfig,
    /// Patch placement rules.
    pub patch: PatchConfig,
}

/// Where the document lives and how many backups to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsiteConfig {
    /// The HTML document mutated each cycle.
    pub path: PathBuf,
    /// Directory receiving a timestamped copy before every mutation.
    pub backup_dir: PathBuf,
    /// Backups kept; the oldest are deleted first. `0` keeps everything.
    pub max_backups: usize,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("site/index.html"),
            backup_dir: PathBuf::from("site/backups"),
            max_backups: 30,
        }
    }
}

/// The agent's identity, used for prompts, and its history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Display name used in prompts.
    pub name: String,
    /// One paragraph describing what the site is for.
    pub mission: String,
    /// Personality traits copied into the state file on first run.
    pub personality: Vec<String>,
    /// Seed ideas copied into the state file on first run.
    pub ideas: Vec<String>,
    /// JSON state file holding history and staleness records.
    pub state_file: PathBuf,
    /// Newest history entries kept per list.
    pub max_history: usize,
    /// Optional closing lines, one of which may be appended to a prompt.
    pub inspirations: Vec<String>,
    /// Chance of appending one inspiration line.
    pub inspiration_probability: f64,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            name: "Euler's Identity".into(),
            mission: "A living website that expresses its owners' ideas about mathematics, \
                      technology and human progress, and keeps evolving on its own."
                .into(),
            personality: ["ambitious", "mathematical", "visionary", "philosophical"]
                .into_iter()
                .map(String::from)
                .collect(),
            ideas: vec![
                "Explore mathematical concepts as business metaphors".into(),
                "Create a visualization of Euler's Identity".into(),
                "Develop a manifesto about technology and human progress".into(),
            ],
            state_file: PathBuf::from("memories.json"),
            max_history: 100,
            inspirations: vec![
                "Consider how e, i, pi, 1 and 0 meeting in one equation could inspire this update."
                    .into(),
                "Simple rules can create complex systems. Let this update reflect that.".into(),
                "Balance analytical rigor with creative vision.".into(),
            ],
            inspiration_probability: 0.3,
        }
    }
}

/// Messages API endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL; `/v1/messages` is appended.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Response token limit.
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout. Absent means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            model: "claude-3-7-sonnet-20250219".into(),
            max_tokens: 4000,
            api_version: "2023-06-01".into(),
            api_key: None,
            api_key_env: "ANTHROPIC_API_KEY".into(),
            timeout_secs: None,
        }
    }
}

impl GeneratorConfig {
    /// The API key, from the file or the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no generator API key: set generator.api_key or ${}",
                    self.api_key_env
                ))
            })
    }
}

/// Message inbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    /// Directory scanned for `*.txt` messages.
    pub message_dir: PathBuf,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            message_dir: PathBuf::from("messages"),
        }
    }
}

/// Daily wake-up schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wake time, `HH:MM`.
    pub wake_time: String,
    /// Shift the wake time by a random whole number of hours at startup.
    pub random_factor: bool,
    /// Largest shift, in hours, applied when `random_factor` is set.
    pub jitter_hours: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            wake_time: "03:00".into(),
            random_factor: true,
            jitter_hours: 2,
        }
    }
}

impl ScheduleConfig {
    /// Parsed wake time.
    pub fn wake_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.wake_time.trim(), "%H:%M").map_err(|e| {
            Error::Config(format!(
                "schedule.wake_time `{}` is not HH:MM: {e}",
                self.wake_time
            ))
        })
    }
}

/// How a news page is scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsKind {
    /// Hacker News front page layout.
    HackerNews,
    /// Generic article listing.
    Articles,
}

/// One news source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSource {
    /// Label shown in prompts.
    pub name: String,
    /// Page to fetch.
    pub url: String,
    /// Scraping strategy.
    pub kind: NewsKind,
    /// Headlines kept.
    #[serde(default = "default_news_limit")]
    pub limit: usize,
}

const fn default_news_limit() -> usize {
    5
}

/// News fetching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Fetch news at all.
    pub enabled: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Sources fetched concurrently each cycle.
    pub sources: Vec<NewsSource>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
            sources: vec![
                NewsSource {
                    name: "Byte Federal".into(),
                    url: "https://news.bytefederal.com/".into(),
                    kind: NewsKind::Articles,
                    limit: default_news_limit(),
                },
                NewsSource {
                    name: "Hacker News".into(),
                    url: "https://news.ycombinator.com/news".into(),
                    kind: NewsKind::HackerNews,
                    limit: default_news_limit(),
                },
            ],
        }
    }
}

/// Weights and probabilities of the per-cycle target selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Size of the candidate pool before sentinels are added.
    pub max_sections: usize,
    /// Age assumed for identifiers that were never modified.
    pub unseen_days: i64,
    /// Substrings marking an identifier as high value.
    pub high_value_keywords: Vec<String>,
    /// Prefixes marking an identifier as high value.
    pub high_value_prefixes: Vec<String>,
    /// Days per unit of sampling weight.
    pub weight_period_days: f64,
    /// Lower clamp of the sampling weight.
    pub min_weight: f64,
    /// Upper clamp of the sampling weight.
    pub max_weight: f64,
    /// Chance the new-section sentinel joins the pool.
    pub new_section_probability: f64,
    /// Chance the whole-document sentinel joins the pool.
    pub whole_document_probability: f64,
    /// Final roll below this picks whole-document when it is in the pool.
    pub pick_whole_document_below: f64,
    /// Final roll below this (and above the previous band) picks new-section.
    pub pick_new_section_below: f64,
    /// Chance of preferring the oldest high-value identifier.
    pub high_value_bias: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_sections: 5,
            unseen_days: 999,
            high_value_keywords: ["title", "meta_description", "heading", "featured"]
                .into_iter()
                .map(String::from)
                .collect(),
            high_value_prefixes: ["section_blk", "section_grey", "section_featured"]
                .into_iter()
                .map(String::from)
                .collect(),
            weight_period_days: 30.0,
            min_weight: 1.0,
            max_weight: 5.0,
            new_section_probability: 0.3,
            whole_document_probability: 0.1,
            pick_whole_document_below: 0.1,
            pick_new_section_below: 0.3,
            high_value_bias: 0.6,
        }
    }
}

/// Which classes are too generic to name a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Classes ignored when they come first, matched exactly.
    pub layout_classes: Vec<String>,
    /// Classes ignored when they come first, matched by prefix.
    pub layout_class_prefixes: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            layout_classes: [
                "row",
                "col",
                "container",
                "container-fluid",
                "clearfix",
                "wrapper",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            layout_class_prefixes: ["col-", "row-", "g-", "offset-"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Keyword rule naming a freshly created container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRule {
    /// Case-insensitive substrings looked for in the content.
    pub keywords: Vec<String>,
    /// `id` of the new container.
    pub id: String,
    /// `class` of the new container.
    pub class: String,
}

/// Placement rules of the patch applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// `id` used when no rule matches.
    pub default_container_id: String,
    /// `class` used when no rule matches.
    pub default_container_class: String,
    /// Selector locating the standing modifications log.
    pub log_selector: String,
    /// Selector locating the footer-like element.
    pub footer_selector: String,
    /// `id` of the element holding the last-updated time.
    pub last_update_id: String,
    /// `chrono` format of log entry and footer timestamps.
    pub timestamp_format: String,
    /// Rules checked in order; the first with a matching keyword wins.
    pub container_rules: Vec<ContainerRule>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        let rule = |keywords: &[&str], id: &str, class: &str| ContainerRule {
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            id: id.into(),
            class: class.into(),
        };
        Self {
            default_container_id: "new-section".into(),
            default_container_class: "container".into(),
            log_selector: DEFAULT_LOG_SELECTOR.into(),
            footer_selector: "footer, #grey".into(),
            last_update_id: "last-update".into(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".into(),
            container_rules: vec![
                rule(&["contact", "email", "address", "phone"], "contact", "container"),
                rule(&["portfolio", "project", "work"], "portfolio", "container"),
            ],
        }
    }
}

impl Config {
    /// Resolve the config path from an explicit path, the environment, the
    /// working directory and finally the platform config directory.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(local);
        }
        let dirs = directories::ProjectDirs::from("dev", "livesite", "livesite")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file, resolving relative paths against
    /// its directory. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?
        } else {
            tracing::debug!(path = %path.display(), "config file missing, using defaults");
            Self::default()
        };
        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Write the default configuration to `path`, creating parent
    /// directories. Existing files are left alone; returns whether a file was
    /// written.
    pub fn write_default(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let body = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        let content = format!(
            "# livesite configuration\n\
             # Relative paths resolve against this file's directory.\n\
             # The generator API key is read from $ANTHROPIC_API_KEY unless\n\
             # generator.api_key or generator.api_key_env says otherwise.\n\n{body}"
        );
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(true)
    }

    /// Check value ranges and selector syntax.
    pub fn validate(&self) -> Result<()> {
        let s = &self.selection;
        let probabilities = [
            ("selection.new_section_probability", s.new_section_probability),
            ("selection.whole_document_probability", s.whole_document_probability),
            ("selection.pick_whole_document_below", s.pick_whole_document_below),
            ("selection.pick_new_section_below", s.pick_new_section_below),
            ("selection.high_value_bias", s.high_value_bias),
            ("entity.inspiration_probability", self.entity.inspiration_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if s.max_sections == 0 {
            return Err(Error::Config("selection.max_sections must be at least 1".into()));
        }
        if !(s.min_weight > 0.0 && s.min_weight <= s.max_weight) {
            return Err(Error::Config(
                "selection weights need 0 < min_weight <= max_weight".into(),
            ));
        }
        if s.weight_period_days <= 0.0 {
            return Err(Error::Config(
                "selection.weight_period_days must be positive".into(),
            ));
        }
        if s.pick_whole_document_below > s.pick_new_section_below {
            return Err(Error::Config(
                "selection.pick_whole_document_below must not exceed pick_new_section_below".into(),
            ));
        }
        if self.entity.max_history == 0 {
            return Err(Error::Config("entity.max_history must be at least 1".into()));
        }
        self.schedule.wake_time()?;
        for (name, selector) in [
            ("patch.log_selector", &self.patch.log_selector),
            ("patch.footer_selector", &self.patch.footer_selector),
        ] {
            SelectorList::parse(selector)
                .map_err(|e| Error::Config(format!("{name}: {e}")))?;
        }
        crate::patch::check_timestamp_format(&self.patch.timestamp_format)?;
        for source in &self.news.sources {
            url::Url::parse(&source.url).map_err(|e| {
                Error::Config(format!("news source `{}` has an invalid url: {e}", source.name))
            })?;
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() && !base.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.website.path);
        resolve(&mut self.website.backup_dir);
        resolve(&mut self.entity.state_file);
        resolve(&mut self.communication.message_dir);
    }
}

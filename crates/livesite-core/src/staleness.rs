//! Staleness tracking and per-cycle target selection.
//!
//! The tracker remembers two things per section identifier: the last hash it
//! observed and the last time a cycle modified the section. Selection turns
//! those ages into one [`Target`] per cycle, deliberately mixing in
//! randomness so the same region is not edited every time.
//!
//! Every random draw goes through a [`RandomSource`], in this order: weighted
//! pool sampling and the tie-breaking shuffle (only when there are more
//! sections than pool slots), the new-section sentinel, the whole-document
//! sentinel, the final roll, and the high-value bias roll.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::random::{RandomSource, shuffle, weighted_sample};
use crate::sections::{Section, SectionIndex, SectionKind};

/// Change state of a section relative to the previous observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionState {
    /// No hash was recorded for the identifier.
    Unseen,
    /// Same hash as last time.
    SeenUnchanged,
    /// Hash differs from the recorded one.
    SeenChangedExternally,
}

/// The section a cycle works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// An identifier from the current index.
    Concrete(String),
    /// Create a brand-new container.
    NewSection,
    /// Replace the whole document.
    WholeDocument,
}

impl Target {
    /// Identifier or sentinel name.
    pub fn label(&self) -> &str {
        match self {
            Self::Concrete(identifier) => identifier,
            Self::NewSection => "new-section",
            Self::WholeDocument => "whole-document",
        }
    }

    /// Parse a label produced by [`Target::label`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "new-section" => Self::NewSection,
            "whole-document" => Self::WholeDocument,
            other => Self::Concrete(other.to_string()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One identifier with its age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedSection {
    /// Section identifier.
    pub identifier: String,
    /// Section role.
    pub kind: SectionKind,
    /// Whole days since the last modification, or the unseen sentinel.
    pub days_since: i64,
    /// Whether the identifier counts as high value.
    pub high_value: bool,
}

/// Pool entry: a concrete section or a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// What would be worked on.
    pub target: Target,
    /// Age used for ordering.
    pub days_since: i64,
}

/// Outcome of one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Every identifier, oldest first.
    pub ranking: Vec<RankedSection>,
    /// High-value identifiers, oldest first.
    pub high_value: Vec<RankedSection>,
    /// Candidate pool, sentinels last.
    pub pool: Vec<Candidate>,
    /// The chosen target.
    pub target: Target,
}

/// Read-only analysis of a document against the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Identifiers whose hash matches the recorded one.
    pub unchanged: Vec<String>,
    /// Identifiers whose hash differs from the recorded one.
    pub changed: Vec<String>,
    /// Identifiers without a recorded hash.
    pub unseen: Vec<String>,
    /// What a cycle would pick right now.
    pub selection: Selection,
}

/// Per-identifier hashes and modification times, persisted with the state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessTracker {
    /// Last observed content hash per identifier.
    #[serde(rename = "website_hashes", default)]
    hashes: BTreeMap<String, String>,
    /// Last cycle-driven modification per identifier.
    #[serde(rename = "section_modified", default)]
    modified: BTreeMap<String, DateTime<Utc>>,
}

impl StalenessTracker {
    /// Recorded hash of an identifier.
    pub fn hash(&self, identifier: &str) -> Option<&str> {
        self.hashes.get(identifier).map(String::as_str)
    }

    /// Last recorded modification of an identifier.
    pub fn last_modified(&self, identifier: &str) -> Option<DateTime<Utc>> {
        self.modified.get(identifier).copied()
    }

    /// Compare the index against recorded hashes without recording anything.
    pub fn states(&self, index: &SectionIndex) -> BTreeMap<String, SectionState> {
        index
            .iter()
            .map(|section| {
                let state = match self.hashes.get(&section.identifier) {
                    None => SectionState::Unseen,
                    Some(hash) if *hash == section.content_hash => SectionState::SeenUnchanged,
                    Some(_) => SectionState::SeenChangedExternally,
                };
                (section.identifier.clone(), state)
            })
            .collect()
    }

    /// Compare the index against recorded hashes, then record the new ones.
    /// Hashes of identifiers missing from the index are kept.
    pub fn observe(&mut self, index: &SectionIndex) -> BTreeMap<String, SectionState> {
        let states = self.states(index);
        for section in index.iter() {
            self.hashes
                .insert(section.identifier.clone(), section.content_hash.clone());
        }
        states
    }

    /// Record a modification. Only a strictly later time replaces an existing
    /// record; returns whether the record changed.
    pub fn record_modification(&mut self, identifier: &str, at: DateTime<Utc>) -> bool {
        match self.modified.get(identifier) {
            Some(existing) if *existing >= at => false,
            _ => {
                self.modified.insert(identifier.to_string(), at);
                true
            },
        }
    }

    /// Whole days since the last modification, `unseen_days` when never
    /// modified.
    pub fn days_since(&self, identifier: &str, now: DateTime<Utc>, unseen_days: i64) -> i64 {
        self.modified
            .get(identifier)
            .map_or(unseen_days, |at| (now - *at).num_days().max(0))
    }

    /// Every identifier in `index` ranked oldest first. Ties keep document
    /// order.
    pub fn rank(&self, index: &SectionIndex, policy: &SelectionConfig, now: DateTime<Utc>) -> Vec<RankedSection> {
        let mut ranking: Vec<RankedSection> = index
            .iter()
            .map(|section| RankedSection {
                identifier: section.identifier.clone(),
                kind: section.kind,
                days_since: self.days_since(&section.identifier, now, policy.unseen_days),
                high_value: is_high_value(section, policy),
            })
            .collect();
        ranking.sort_by(|a, b| b.days_since.cmp(&a.days_since));
        ranking
    }

    /// Choose this cycle's target.
    pub fn select(
        &self,
        index: &SectionIndex,
        policy: &SelectionConfig,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> Selection {
        let ranking = self.rank(index, policy, now);
        let high_value: Vec<RankedSection> =
            ranking.iter().filter(|r| r.high_value).cloned().collect();

        let concrete = build_pool(&ranking, &high_value, policy, rng);
        let mut pool: Vec<Candidate> = concrete
            .iter()
            .map(|r| Candidate {
                target: Target::Concrete(r.identifier.clone()),
                days_since: r.days_since,
            })
            .collect();

        let offer_new = rng.chance(policy.new_section_probability);
        let offer_whole = rng.chance(policy.whole_document_probability);
        if offer_new {
            pool.push(Candidate {
                target: Target::NewSection,
                days_since: policy.unseen_days,
            });
        }
        if offer_whole {
            pool.push(Candidate {
                target: Target::WholeDocument,
                days_since: policy.unseen_days,
            });
        }

        let roll = rng.next_f64();
        let target = if offer_whole && roll < policy.pick_whole_document_below {
            Target::WholeDocument
        } else if offer_new && roll < policy.pick_new_section_below {
            Target::NewSection
        } else {
            // Only pool members are eligible
            let prefer_high_value = rng.chance(policy.high_value_bias);
            match (concrete.iter().find(|r| r.high_value), concrete.first()) {
                (Some(top), _) if prefer_high_value => Target::Concrete(top.identifier.clone()),
                (_, Some(top)) => Target::Concrete(top.identifier.clone()),
                (_, None) => Target::NewSection,
            }
        };

        tracing::debug!(
            sections = ranking.len(),
            pool = pool.len(),
            section = %target,
            "selected target"
        );

        Selection {
            ranking,
            high_value,
            pool,
            target,
        }
    }

    /// Change states plus the selection a cycle would make, without
    /// recording anything.
    pub fn analyze(
        &self,
        index: &SectionIndex,
        policy: &SelectionConfig,
        now: DateTime<Utc>,
        rng: &mut dyn RandomSource,
    ) -> AnalysisReport {
        let mut unchanged = Vec::new();
        let mut changed = Vec::new();
        let mut unseen = Vec::new();
        for (identifier, state) in self.states(index) {
            match state {
                SectionState::SeenUnchanged => unchanged.push(identifier),
                SectionState::SeenChangedExternally => changed.push(identifier),
                SectionState::Unseen => unseen.push(identifier),
            }
        }
        AnalysisReport {
            unchanged,
            changed,
            unseen,
            selection: self.select(index, policy, now, rng),
        }
    }
}

fn is_high_value(section: &Section, policy: &SelectionConfig) -> bool {
    matches!(
        section.kind,
        SectionKind::Title | SectionKind::Meta | SectionKind::Heading
    ) || policy
        .high_value_keywords
        .iter()
        .any(|kw| section.identifier.contains(kw.as_str()))
        || policy
            .high_value_prefixes
            .iter()
            .any(|prefix| section.identifier.starts_with(prefix.as_str()))
}

#[allow(clippy::cast_precision_loss)]
fn sampling_weight(days_since: i64, policy: &SelectionConfig) -> f64 {
    (days_since as f64 / policy.weight_period_days).clamp(policy.min_weight, policy.max_weight)
}

/// Concrete candidates, oldest first. When everything fits, everything is
/// taken; otherwise half the slots go to the oldest high-value identifiers
/// and the rest are drawn by age-weighted sampling.
fn build_pool(
    ranking: &[RankedSection],
    high_value: &[RankedSection],
    policy: &SelectionConfig,
    rng: &mut dyn RandomSource,
) -> Vec<RankedSection> {
    if ranking.len() <= policy.max_sections {
        return ranking.to_vec();
    }

    let reserved = high_value.len().min(policy.max_sections / 2);
    let mut pool: Vec<RankedSection> = high_value[..reserved].to_vec();
    let taken: HashSet<&str> = pool.iter().map(|r| r.identifier.as_str()).collect();

    let weighted: Vec<(RankedSection, f64)> = ranking
        .iter()
        .filter(|r| !taken.contains(r.identifier.as_str()))
        .map(|r| (r.clone(), sampling_weight(r.days_since, policy)))
        .collect();
    pool.extend(weighted_sample(rng, &weighted, policy.max_sections - reserved));

    shuffle(rng, &mut pool);
    pool.sort_by(|a, b| b.days_since.cmp(&a.days_since));
    pool
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_LOG_SELECTOR, IndexingConfig};
    use crate::dom::Document;
    use crate::random::{ScriptedRandom, StdRandom};
    use crate::sections::SectionIndexer;
    use chrono::Duration;
    use std::collections::HashMap;

    fn index_of(html: &str) -> SectionIndex {
        let doc = Document::parse(html).unwrap();
        SectionIndexer::new(&IndexingConfig::default(), DEFAULT_LOG_SELECTOR)
            .unwrap()
            .index(&doc)
    }

    /// Body plus `n` containers named `section_s0` .. `section_s{n-1}`.
    fn plain_index(n: usize) -> SectionIndex {
        let blocks: String = (0..n).map(|i| format!("<div id=\"s{i}\">{i}</div>")).collect();
        index_of(&format!("<body>{blocks}</body>"))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_days_since_defaults_to_sentinel() {
        let mut tracker = StalenessTracker::default();
        assert_eq!(tracker.days_since("section_a", now(), 999), 999);
        tracker.record_modification("section_a", now() - Duration::days(45));
        assert_eq!(tracker.days_since("section_a", now(), 999), 45);
    }

    #[test]
    fn test_record_modification_is_monotonic() {
        let mut tracker = StalenessTracker::default();
        let earlier = now() - Duration::hours(5);
        assert!(tracker.record_modification("x", now()));
        assert!(!tracker.record_modification("x", earlier));
        assert!(!tracker.record_modification("x", now()));
        assert_eq!(tracker.last_modified("x"), Some(now()));
        assert!(tracker.record_modification("x", now() + Duration::seconds(1)));
    }

    #[test]
    fn test_observe_state_machine() {
        // Given: a first observation of a document
        let mut tracker = StalenessTracker::default();
        let first = index_of(r#"<body><div id="a">1</div><div id="b">2</div></body>"#);
        let states = tracker.observe(&first);
        assert!(states.values().all(|s| *s == SectionState::Unseen));

        // When: section b changes outside of any cycle
        let second = index_of(r#"<body><div id="a">1</div><div id="b">changed</div></body>"#);
        let states = tracker.observe(&second);

        // Then: a is unchanged, b changed externally, body changed too
        assert_eq!(states["section_a"], SectionState::SeenUnchanged);
        assert_eq!(states["section_b"], SectionState::SeenChangedExternally);
        assert_eq!(states["body"], SectionState::SeenChangedExternally);

        // And: hashes of vanished sections are kept
        let third = index_of(r#"<body><div id="a">1</div></body>"#);
        tracker.observe(&third);
        assert!(tracker.hash("section_b").is_some());
    }

    #[test]
    fn test_rank_orders_oldest_first() {
        let index = plain_index(3);
        let mut tracker = StalenessTracker::default();
        tracker.record_modification("body", now() - Duration::days(1));
        tracker.record_modification("section_s0", now() - Duration::days(10));
        tracker.record_modification("section_s1", now() - Duration::days(100));
        let ranking = tracker.rank(&index, &SelectionConfig::default(), now());
        let order: Vec<_> = ranking.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(order, vec!["section_s2", "section_s1", "section_s0", "body"]);
    }

    #[test]
    fn test_small_index_takes_everything_and_picks_oldest() {
        // Given: 4 sections, all fit into the pool, no sentinels offered
        let index = plain_index(3);
        let mut tracker = StalenessTracker::default();
        tracker.record_modification("section_s2", now() - Duration::days(3));
        tracker.record_modification("body", now());
        // new-section 0.9 (no), whole 0.9 (no), roll 0.9, bias 0.9 (no)
        let mut rng = ScriptedRandom::constant(0.9);

        let selection = tracker.select(&index, &SelectionConfig::default(), now(), &mut rng);

        assert_eq!(selection.pool.len(), 4);
        assert_eq!(selection.target, Target::Concrete("section_s0".into()));
    }

    #[test]
    fn test_sentinel_bands() {
        let index = plain_index(2);
        let tracker = StalenessTracker::default();
        let policy = SelectionConfig::default();

        // Both offered, roll 0.05 < 0.1 picks the whole document
        let mut rng = ScriptedRandom::new([0.0, 0.0, 0.05], 0.9);
        assert_eq!(tracker.select(&index, &policy, now(), &mut rng).target, Target::WholeDocument);

        // Both offered, roll 0.2 falls in the new-section band
        let mut rng = ScriptedRandom::new([0.0, 0.0, 0.2], 0.9);
        assert_eq!(tracker.select(&index, &policy, now(), &mut rng).target, Target::NewSection);

        // Only new-section offered, roll 0.05 still picks new-section
        let mut rng = ScriptedRandom::new([0.0, 0.5, 0.05], 0.9);
        let selection = tracker.select(&index, &policy, now(), &mut rng);
        assert_eq!(selection.target, Target::NewSection);
        assert_eq!(selection.pool.last().unwrap().target, Target::NewSection);

        // Nothing offered, low roll falls through to a concrete section
        let mut rng = ScriptedRandom::new([0.9, 0.9, 0.0], 0.9);
        assert!(matches!(
            tracker.select(&index, &policy, now(), &mut rng).target,
            Target::Concrete(_)
        ));
    }

    #[test]
    fn test_high_value_bias() {
        // Given: a heading (and its content run) modified recently and a
        // container never modified
        let index = index_of(r#"<body><h1>Hello</h1><div id="plain">x</div></body>"#);
        let mut tracker = StalenessTracker::default();
        tracker.record_modification("heading_0", now() - Duration::days(2));
        tracker.record_modification("heading_0_content", now() - Duration::days(1));
        tracker.record_modification("body", now());
        let policy = SelectionConfig::default();

        // When: the bias roll succeeds the oldest high-value section wins
        let mut rng = ScriptedRandom::new([0.9, 0.9, 0.9, 0.1], 0.9);
        let selection = tracker.select(&index, &policy, now(), &mut rng);
        assert_eq!(selection.target, Target::Concrete("heading_0".into()));
        assert_eq!(selection.high_value.len(), 2);

        // When: the bias roll fails the overall oldest wins
        let mut rng = ScriptedRandom::new([0.9, 0.9, 0.9, 0.7], 0.9);
        let selection = tracker.select(&index, &policy, now(), &mut rng);
        assert_eq!(selection.target, Target::Concrete("section_plain".into()));
    }

    #[test]
    fn test_high_value_bias_stays_inside_the_pool() {
        // Given: a single-slot pool, so no high-value slot is reserved, and a
        // never-modified container that dominates the sampling weights
        let index = index_of(r#"<body><h1>Hello</h1><div id="plain">x</div></body>"#);
        let mut tracker = StalenessTracker::default();
        tracker.record_modification("heading_0", now() - Duration::days(2));
        tracker.record_modification("heading_0_content", now() - Duration::days(1));
        tracker.record_modification("body", now());
        let policy = SelectionConfig {
            max_sections: 1,
            ..SelectionConfig::default()
        };

        // When: the sample lands on the container and the bias roll succeeds
        // (sample 0.1, no sentinels, roll 0.9, bias 0.1)
        let mut rng = ScriptedRandom::new([0.1, 0.9, 0.9, 0.9, 0.1], 0.9);
        let selection = tracker.select(&index, &policy, now(), &mut rng);

        // Then: the target is the pooled container, not the unpooled heading
        assert_eq!(selection.pool.len(), 1);
        assert_eq!(selection.pool[0].target, Target::Concrete("section_plain".into()));
        assert_eq!(selection.target, Target::Concrete("section_plain".into()));
        assert!(!selection.high_value.is_empty());
    }

    #[test]
    fn test_empty_index_yields_new_section() {
        let index = SectionIndex::default();
        let mut rng = ScriptedRandom::constant(0.99);
        let selection =
            StalenessTracker::default().select(&index, &SelectionConfig::default(), now(), &mut rng);
        assert_eq!(selection.target, Target::NewSection);
        assert!(selection.pool.is_empty());
    }

    #[test]
    fn test_oversized_index_reserves_high_value_slots() {
        // Given: 3 headings plus 7 containers and the body, pool of 5
        let html = format!(
            "<body><h2>a</h2><h2>b</h2><h2>c</h2>{}</body>",
            (0..7).map(|i| format!("<div id=\"d{i}\">x</div>")).collect::<String>()
        );
        let index = index_of(&html);
        let policy = SelectionConfig::default();
        let mut rng = StdRandom::seeded(99);

        // When
        let selection = StalenessTracker::default().select(&index, &policy, now(), &mut rng);

        // Then: 5 concrete candidates, at least 2 of them high value
        let concrete: Vec<_> = selection
            .pool
            .iter()
            .filter(|c| matches!(c.target, Target::Concrete(_)))
            .collect();
        assert_eq!(concrete.len(), 5);
        let high_value_in_pool = concrete
            .iter()
            .filter(|c| c.target.label().starts_with("heading_"))
            .count();
        assert!(high_value_in_pool >= 2);
        let unique: HashSet<_> = concrete.iter().map(|c| c.target.label()).collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_weighted_selection_bounds() {
        // Given: 8 containers with ages spanning every weight band; the body
        // was modified just now so it has the minimum weight as well
        let index = plain_index(8);
        let ages = [0_i64, 15, 45, 75, 100, 130, 400, 999];
        let mut tracker = StalenessTracker::default();
        for (i, days) in ages.iter().enumerate() {
            tracker.record_modification(&format!("section_s{i}"), now() - Duration::days(*days));
        }
        tracker.record_modification("body", now());
        let policy = SelectionConfig::default();
        let mut rng = StdRandom::seeded(2024);

        // When: sampling many pools
        let rounds = 4_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut targets: HashMap<String, usize> = HashMap::new();
        for _ in 0..rounds {
            let selection = tracker.select(&index, &policy, now(), &mut rng);
            for candidate in &selection.pool {
                if let Target::Concrete(id) = &candidate.target {
                    *counts.entry(id.clone()).or_default() += 1;
                }
            }
            if let Target::Concrete(id) = selection.target {
                *targets.entry(id).or_default() += 1;
            }
        }

        // Then: every section shows up, and older sections show up no less
        // often than younger ones (up to sampling noise)
        let tolerance = rounds * 3 / 100;
        let mut previous = 0;
        for i in 0..ages.len() {
            let count = counts.get(&format!("section_s{i}")).copied().unwrap_or(0);
            assert!(count > 0, "section_s{i} never entered the pool");
            assert!(count + tolerance >= previous, "section_s{i}: {count} < {previous}");
            previous = count;
        }
        // The oldest section is the most frequent final target
        let oldest = targets.get("section_s7").copied().unwrap_or(0);
        assert!(targets.values().all(|c| *c <= oldest));
    }

    #[test]
    fn test_analyze_does_not_record() {
        let index = plain_index(2);
        let mut tracker = StalenessTracker::default();
        tracker.observe(&index);
        let before = tracker.clone();
        let changed = index_of(r#"<body><div id="s0">new</div><div id="s1">1</div></body>"#);

        let report = tracker.analyze(&changed, &SelectionConfig::default(), now(), &mut ScriptedRandom::constant(0.9));

        assert_eq!(tracker, before);
        assert_eq!(report.unchanged, vec!["section_s1".to_string()]);
        assert_eq!(report.changed, vec!["body".to_string(), "section_s0".to_string()]);
        assert!(report.unseen.is_empty());
    }

    #[test]
    fn test_target_labels_roundtrip() {
        for target in [
            Target::NewSection,
            Target::WholeDocument,
            Target::Concrete("section_contact".into()),
        ] {
            assert_eq!(Target::from_label(target.label()), target);
        }
    }
}

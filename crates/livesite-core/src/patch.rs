//! Patch application.
//!
//! Turns a [`Classification`] plus a [`Target`] into an ordered list of
//! strategies and runs them until one succeeds. Each strategy works on a
//! clone of the document, so a failing strategy never leaves a half-applied
//! change behind and the next, less specific strategy starts from the
//! untouched tree.
//!
//! | content          | target               | strategies                                   |
//! |------------------|----------------------|----------------------------------------------|
//! | full document    | any                  | replace-document, append-to-log              |
//! | any other        | whole-document       | skipped with a warning                       |
//! | tagged fragment  | name resolves        | replace-tagged, append-to-log                |
//! | tagged fragment  | name does not resolve| insert-tagged, append-to-log                 |
//! | loose fragment   | resolvable section   | replace-target, new-container, append-to-log |
//! | loose fragment   | otherwise            | new-container, append-to-log                 |
//! | plain text       | new-section          | new-container, append-to-log                 |
//! | plain text       | otherwise            | append-to-log                                |

use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{Classification, ContentKind};
use crate::config::{Config, ContainerRule, PatchConfig};
use crate::dom::{Document, NodeId, SelectorList};
use crate::sections::{CONTAINER_TAGS, ResolvedSection, SectionIndex, SectionKind};
use crate::staleness::Target;
use crate::{Error, Result};

/// `id` of a freshly created modifications log.
const LOG_ID: &str = "evolving-thoughts";
/// Heading of a freshly created modifications log.
const LOG_HEADING: &str = "Evolving Thoughts";
/// Target label recorded for whole-document replacements.
pub const COMPLETE_REPLACEMENT: &str = "complete-replacement";

/// Fail with [`Error::Config`] when `format` is not a valid `chrono` format.
pub fn check_timestamp_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::Config(format!(
            "patch.timestamp_format `{format}` is not a valid strftime format"
        )));
    }
    Ok(())
}

/// One way of merging content into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Swap in a parsed full document.
    ReplaceDocument,
    /// Replace the element named by a marker comment.
    ReplaceTagged,
    /// Insert a tagged fragment at a position inferred from its name.
    InsertTagged,
    /// Replace the selected section.
    ReplaceTarget,
    /// Wrap the content in a new container.
    NewContainer,
    /// Add a timestamped entry to the modifications log.
    AppendToLog,
}

impl Strategy {
    /// Short name for logs and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReplaceDocument => "replace-document",
            Self::ReplaceTagged => "replace-tagged",
            Self::InsertTagged => "insert-tagged",
            Self::ReplaceTarget => "replace-target",
            Self::NewContainer => "new-container",
            Self::AppendToLog => "append-to-log",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`PatchApplier::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchOutcome {
    /// The document was changed.
    Applied {
        /// Strategy that succeeded.
        strategy: Strategy,
        /// What was changed, for the history.
        target_label: String,
        /// `id` of an element the strategy created, if any.
        created_id: Option<String>,
    },
    /// Nothing was changed on purpose.
    Skipped {
        /// Why the content was not applied.
        reason: String,
    },
}

impl PatchOutcome {
    /// Whether the document changed.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

struct Applied {
    target_label: String,
    created_id: Option<String>,
}

impl Applied {
    fn labelled(label: impl Into<String>) -> Self {
        Self {
            target_label: label.into(),
            created_id: None,
        }
    }
}

/// Applies classified content to a document.
#[derive(Debug, Clone)]
pub struct PatchApplier {
    log: SelectorList,
    footer: SelectorList,
    rules: Vec<ContainerRule>,
    default_id: String,
    default_class: String,
    last_update_id: String,
    timestamp_format: String,
}

impl PatchApplier {
    /// Build an applier from placement rules.
    pub fn new(config: &PatchConfig) -> Result<Self> {
        check_timestamp_format(&config.timestamp_format)?;
        Ok(Self {
            log: SelectorList::parse(&config.log_selector)?,
            footer: SelectorList::parse(&config.footer_selector)?,
            rules: config.container_rules.clone(),
            default_id: config.default_container_id.clone(),
            default_class: config.default_container_class.clone(),
            last_update_id: config.last_update_id.clone(),
            timestamp_format: config.timestamp_format.clone(),
        })
    }

    /// Build an applier from the full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.patch)
    }

    /// Strategies to try, in order. `None` means the combination is a
    /// deliberate no-op.
    pub fn plan(
        &self,
        doc: &Document,
        index: &SectionIndex,
        classification: &Classification,
        target: &Target,
    ) -> Option<Vec<Strategy>> {
        use Strategy::{
            AppendToLog, InsertTagged, NewContainer, ReplaceDocument, ReplaceTagged, ReplaceTarget,
        };

        let plan = match (&classification.kind, target) {
            (ContentKind::FullDocument, _) => vec![ReplaceDocument, AppendToLog],
            (_, Target::WholeDocument) => return None,
            (ContentKind::TaggedFragment { name }, _) => {
                if find_named(doc, name).is_some() {
                    vec![ReplaceTagged, AppendToLog]
                } else {
                    vec![InsertTagged, AppendToLog]
                }
            },
            (ContentKind::LooseFragment, Target::Concrete(identifier))
                if index
                    .get(identifier)
                    .and_then(|section| section.resolve(doc))
                    .is_some() =>
            {
                vec![ReplaceTarget, NewContainer, AppendToLog]
            },
            (ContentKind::LooseFragment, _) | (ContentKind::PlainText, Target::NewSection) => {
                vec![NewContainer, AppendToLog]
            },
            (ContentKind::PlainText, _) => vec![AppendToLog],
        };
        Some(plan)
    }

    /// Apply `classification` to `doc` for `target`.
    ///
    /// On `Ok(PatchOutcome::Applied { .. })` the document holds the change
    /// and a refreshed last-updated stamp. On `Err` every strategy failed
    /// and `doc` is untouched.
    pub fn apply(
        &self,
        doc: &mut Document,
        index: &SectionIndex,
        classification: &Classification,
        target: &Target,
        now: DateTime<Utc>,
    ) -> Result<PatchOutcome> {
        let Some(plan) = self.plan(doc, index, classification, target) else {
            tracing::warn!(
                section = %target,
                classification = %classification.kind,
                "whole-document target needs a full document; skipping"
            );
            return Ok(PatchOutcome::Skipped {
                reason: format!(
                    "{} content cannot replace the whole document",
                    classification.kind.as_str()
                ),
            });
        };

        let stamp = now.format(&self.timestamp_format).to_string();
        let mut last_error = None;
        for strategy in plan {
            let mut work = doc.clone();
            match self.run(strategy, &mut work, index, classification, target, &stamp) {
                Ok(applied) => {
                    self.refresh_last_update(&mut work, &stamp);
                    *doc = work;
                    tracing::info!(
                        section = %target,
                        classification = %classification.kind,
                        strategy = %strategy,
                        label = %applied.target_label,
                        "patch applied"
                    );
                    return Ok(PatchOutcome::Applied {
                        strategy,
                        target_label: applied.target_label,
                        created_id: applied.created_id,
                    });
                },
                Err(err) => {
                    tracing::warn!(
                        section = %target,
                        classification = %classification.kind,
                        strategy = %strategy,
                        error = %err,
                        "patch strategy failed; falling back"
                    );
                    last_error = Some(err);
                },
            }
        }

        Err(Error::Other(format!(
            "every patch strategy failed for {target}: {}",
            last_error.map_or_else(|| "no strategy left".to_string(), |e| e.to_string())
        )))
    }

    fn run(
        &self,
        strategy: Strategy,
        work: &mut Document,
        index: &SectionIndex,
        classification: &Classification,
        target: &Target,
        stamp: &str,
    ) -> Result<Applied> {
        match strategy {
            Strategy::ReplaceDocument => replace_document(work, classification),
            Strategy::ReplaceTagged => replace_tagged(work, classification),
            Strategy::InsertTagged => self.insert_tagged(work, classification),
            Strategy::ReplaceTarget => replace_target(work, index, classification, target),
            Strategy::NewContainer => self.new_container(work, classification),
            Strategy::AppendToLog => self.append_to_log(work, classification, stamp),
        }
    }

    fn insert_tagged(&self, work: &mut Document, classification: &Classification) -> Result<Applied> {
        let ContentKind::TaggedFragment { name } = &classification.kind else {
            return Err(Error::InvalidOperation("insert-tagged needs a tagged fragment".into()));
        };
        let roots = import_roots(work, classification);
        if roots.is_empty() {
            return Err(Error::Parse(format!("fragment `{name}` has no elements")));
        }
        let created_id = work.attr(roots[0], "id").map(str::to_string);

        let scope = body_or_root(work);
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("header") || lower.starts_with("top") {
            work.prepend_children(scope, &roots)?;
        } else if lower.starts_with("footer") || lower.starts_with("bottom") {
            work.append_children(scope, &roots)?;
        } else if let Some(footer) = first_match(work, &self.footer) {
            work.insert_before(footer, &roots)?;
        } else {
            work.append_children(scope, &roots)?;
        }

        Ok(Applied {
            target_label: name.clone(),
            created_id,
        })
    }

    fn container_naming(&self, content: &str) -> (&str, &str) {
        let lower = content.to_lowercase();
        self.rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|keyword| lower.contains(&keyword.to_lowercase()))
            })
            .map_or(
                (self.default_id.as_str(), self.default_class.as_str()),
                |rule| (rule.id.as_str(), rule.class.as_str()),
            )
    }

    fn new_container(&self, work: &mut Document, classification: &Classification) -> Result<Applied> {
        let (id, class) = self.container_naming(&classification.content);
        let id = unique_id(work, id);
        let mut attrs = vec![("id", id.as_str())];
        if !class.is_empty() {
            attrs.push(("class", class));
        }
        let container = work.create_element("div", &attrs, None);

        let entries = entry_nodes(work, classification);
        work.append_children(container, &entries)?;

        let scope = body_or_root(work);
        let anchor = work
            .element_children(scope)
            .into_iter()
            .filter(|node| {
                work.tag_name(*node)
                    .is_some_and(|tag| tag != "footer" && CONTAINER_TAGS.contains(&tag))
                    && !self.footer.matches(work, *node)
            })
            .last();
        if let Some(anchor) = anchor {
            work.insert_after(anchor, &[container])?;
        } else if let Some(footer) = first_match(work, &self.footer) {
            work.insert_before(footer, &[container])?;
        } else {
            work.append_children(scope, &[container])?;
        }

        Ok(Applied {
            target_label: id.clone(),
            created_id: Some(id),
        })
    }

    fn create_log(&self, work: &mut Document) -> Result<NodeId> {
        let id = unique_id(work, LOG_ID);
        let log = work.create_element("div", &[("id", id.as_str()), ("class", "container")], None);
        let row = work.create_element("div", &[("class", "row")], None);
        let heading = work.create_element("h5", &[("class", "centered")], Some(LOG_HEADING));
        let rule = work.create_element("hr", &[("class", "aligncenter mb")], None);
        work.append_children(row, &[heading, rule])?;
        work.append_children(log, &[row])?;

        if let Some(footer) = first_match(work, &self.footer) {
            work.insert_before(footer, &[log])?;
        } else {
            let scope = body_or_root(work);
            work.append_children(scope, &[log])?;
        }
        tracing::info!(id = %id, "created modifications log");
        Ok(log)
    }

    fn append_to_log(&self, work: &mut Document, classification: &Classification, stamp: &str) -> Result<Applied> {
        let log = match first_match(work, &self.log) {
            Some(log) => log,
            None => self.create_log(work)?,
        };

        let mut entry = vec![work.create_element("div", &[("class", "timestamp")], Some(stamp))];
        entry.extend(entry_nodes(work, classification));

        let newest = work
            .children(log)
            .iter()
            .copied()
            .find(|child| work.has_class(*child, "timestamp"));
        match newest {
            Some(newest) => work.insert_before(newest, &entry)?,
            None => work.append_children(log, &entry)?,
        }

        let label = work.attr(log, "id").unwrap_or("modifications").to_string();
        Ok(Applied::labelled(label))
    }

    fn refresh_last_update(&self, work: &mut Document, stamp: &str) {
        let Some(node) = work.find_by_id(&self.last_update_id) else {
            tracing::debug!(id = %self.last_update_id, "no last-updated element");
            return;
        };
        if let Err(err) = work.set_text(node, stamp) {
            tracing::debug!(error = %err, "could not refresh last-updated element");
        }
    }
}

fn first_match(doc: &Document, selector: &SelectorList) -> Option<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .find(|node| selector.matches(doc, *node))
}

fn body_or_root(doc: &Document) -> NodeId {
    doc.body().unwrap_or_else(|| doc.root())
}

/// Element carrying `name` as its id, else the first carrying it as a class.
fn find_named(doc: &Document, name: &str) -> Option<NodeId> {
    doc.find_by_id(name).or_else(|| {
        doc.descendants(doc.root())
            .into_iter()
            .find(|node| doc.has_class(*node, name))
    })
}

fn unique_id(doc: &Document, base: &str) -> String {
    if doc.find_by_id(base).is_none() {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| doc.find_by_id(candidate).is_none())
        .unwrap_or_else(|| base.to_string())
}

/// Detached copies of the content's top-level elements. A full document
/// contributes the element children of its body.
fn import_roots(work: &mut Document, classification: &Classification) -> Vec<NodeId> {
    let Some(parsed) = &classification.parsed else {
        return Vec::new();
    };
    let sources = if classification.kind == ContentKind::FullDocument {
        parsed
            .body()
            .map(|body| parsed.element_children(body))
            .unwrap_or_default()
    } else {
        classification.top_level_elements()
    };
    sources
        .into_iter()
        .map(|node| work.import_subtree(parsed, node))
        .collect()
}

/// One detached `<p>` per paragraph.
fn paragraph_nodes(work: &mut Document, classification: &Classification) -> Vec<NodeId> {
    classification
        .paragraphs
        .iter()
        .map(|paragraph| work.create_element("p", &[], Some(paragraph)))
        .collect()
}

/// Markup roots when there are any, paragraphs otherwise.
fn entry_nodes(work: &mut Document, classification: &Classification) -> Vec<NodeId> {
    let roots = import_roots(work, classification);
    if roots.is_empty() {
        paragraph_nodes(work, classification)
    } else {
        roots
    }
}

/// The content as a single line of text.
fn plain_text(classification: &Classification) -> String {
    let raw = match &classification.parsed {
        Some(parsed) => parsed.text_content(parsed.root()),
        None => classification.paragraphs.join(" "),
    };
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn replace_document(work: &mut Document, classification: &Classification) -> Result<Applied> {
    let parsed = classification
        .parsed
        .as_ref()
        .filter(|_| classification.kind == ContentKind::FullDocument)
        .ok_or_else(|| Error::InvalidOperation("replace-document needs a full document".into()))?;
    if parsed.html_root().is_none() || parsed.body().is_none() {
        return Err(Error::Parse(
            "replacement document lacks a root element or body".into(),
        ));
    }
    *work = parsed.clone();
    Ok(Applied::labelled(COMPLETE_REPLACEMENT))
}

fn replace_tagged(work: &mut Document, classification: &Classification) -> Result<Applied> {
    let ContentKind::TaggedFragment { name } = &classification.kind else {
        return Err(Error::InvalidOperation("replace-tagged needs a tagged fragment".into()));
    };
    let node = find_named(work, name).ok_or_else(|| Error::TargetNotFound(name.clone()))?;
    if Some(node) == work.body() || Some(node) == work.html_root() {
        return Err(Error::InvalidOperation(format!(
            "marker `{name}` names the page itself"
        )));
    }
    let roots = import_roots(work, classification);
    if roots.is_empty() {
        return Err(Error::Parse(format!("fragment `{name}` has no elements")));
    }
    work.replace_subtree(node, &roots)?;
    Ok(Applied::labelled(name.clone()))
}

/// Whether `root` of the fragment describes the same element as `node`:
/// equal ids, or no ids and equal tag plus first class.
fn same_identity(work: &Document, node: NodeId, parsed: &Document, root: NodeId) -> bool {
    let (Some(current), Some(incoming)) = (work.element(node), parsed.element(root)) else {
        return false;
    };
    match (current.attr("id"), incoming.attr("id")) {
        (Some(a), Some(b)) => a == b,
        (None, None) => {
            current.name == incoming.name && current.classes().next() == incoming.classes().next()
        },
        _ => false,
    }
}

fn replace_node(work: &mut Document, node: NodeId, classification: &Classification) -> Result<()> {
    let parsed = classification
        .parsed
        .as_ref()
        .ok_or_else(|| Error::InvalidOperation("no markup to place".into()))?;
    let sources = classification.top_level_elements();

    if let [single] = sources.as_slice() {
        if same_identity(work, node, parsed, *single) {
            let attrs = parsed
                .element(*single)
                .map(|el| el.attrs.clone())
                .unwrap_or_default();
            let children: Vec<NodeId> = parsed
                .children(*single)
                .iter()
                .map(|child| work.import_subtree(parsed, *child))
                .collect();
            work.replace_children(node, &children)?;
            work.set_attrs(node, attrs)?;
            return Ok(());
        }
    }

    if sources.is_empty() {
        return Err(Error::Parse("fragment has no elements".into()));
    }
    let roots: Vec<NodeId> = sources
        .iter()
        .map(|source| work.import_subtree(parsed, *source))
        .collect();
    if work.children(node).is_empty() {
        work.replace_subtree(node, &roots)
    } else {
        work.replace_children(node, &roots)
    }
}

fn replace_target(
    work: &mut Document,
    index: &SectionIndex,
    classification: &Classification,
    target: &Target,
) -> Result<Applied> {
    let Target::Concrete(identifier) = target else {
        return Err(Error::InvalidOperation("replace-target needs a concrete section".into()));
    };
    let section = index
        .get(identifier)
        .ok_or_else(|| Error::TargetNotFound(identifier.clone()))?;
    let resolved = section
        .resolve(work)
        .ok_or_else(|| Error::TargetNotFound(identifier.clone()))?;

    match (section.kind, resolved) {
        (SectionKind::ModificationsLog, _) => {
            return Err(Error::InvalidOperation(
                "the modifications log is only appended to".into(),
            ));
        },
        (SectionKind::Title, ResolvedSection::Node(node)) => {
            let text = plain_text(classification);
            if text.is_empty() {
                return Err(Error::Parse("no text for the title".into()));
            }
            work.set_text(node, &text)?;
        },
        (SectionKind::Meta, ResolvedSection::Node(node)) => {
            work.set_attr(node, "content", &plain_text(classification))?;
        },
        (_, ResolvedSection::Node(node)) if Some(node) == work.body() => {
            return Err(Error::InvalidOperation("refusing to replace the whole body".into()));
        },
        (SectionKind::Heading, ResolvedSection::Node(node)) => {
            let parsed = classification
                .parsed
                .as_ref()
                .ok_or_else(|| Error::InvalidOperation("no markup to place".into()))?;
            let heading = classification
                .top_level_elements()
                .into_iter()
                .next()
                .filter(|root| parsed.heading_level(*root).is_some())
                .ok_or_else(|| {
                    Error::InvalidOperation("a heading can only be replaced by a heading".into())
                })?;
            let text = parsed.text_content(heading);
            work.set_text(node, text.trim())?;
        },
        (_, ResolvedSection::Node(node)) => replace_node(work, node, classification)?,
        (_, ResolvedSection::Run { heading, nodes }) => {
            let roots = import_roots(work, classification);
            if roots.is_empty() {
                return Err(Error::Parse("fragment has no elements".into()));
            }
            for node in nodes {
                work.remove_subtree(node)?;
            }
            work.insert_after(heading, &roots)?;
        },
    }
    Ok(Applied::labelled(identifier.clone()))
}

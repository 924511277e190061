//! Section indexing.
//!
//! Splits a [`Document`] into named, hashed sections. Identifiers are derived
//! from the element alone (explicit id, first meaningful class, or position
//! among unnamed siblings of the same kind) so the same element gets the same
//! identifier every cycle as long as it keeps its attributes and place.
//! Positional identifiers below a named section carry that section's
//! identifier, so edits elsewhere never renumber them.
//!
//! Indexing is pure: it reads the document and returns a [`SectionIndex`].
//! Recording hashes is the staleness tracker's job.

use std::collections::{BTreeMap, HashMap, HashSet};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;
use crate::config::{Config, IndexingConfig};
use crate::dom::{Document, NodeData, NodeId, NodePath, SelectorList};

/// Block containers that can form a section.
pub(crate) const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "article", "aside", "nav", "header", "footer", "main",
];

/// Role of a section in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// The `<title>` element.
    Title,
    /// `<meta name="description">`.
    Meta,
    /// A `<header>` element.
    Header,
    /// A `<footer>` element.
    Footer,
    /// A block container, or the body itself.
    Container,
    /// An `h1`..`h6` element.
    Heading,
    /// The siblings following a heading up to the next heading of equal or
    /// higher rank.
    ContentBlock,
    /// The standing modifications log.
    ModificationsLog,
}

impl SectionKind {
    /// Identifier prefix for sections of this kind.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Meta => "meta",
            Self::Header => "header",
            Self::Footer => "footer",
            Self::Container => "section",
            Self::Heading => "heading",
            Self::ContentBlock => "content",
            Self::ModificationsLog => "log",
        }
    }

    /// Human readable name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Meta => "meta",
            Self::Header => "header",
            Self::Footer => "footer",
            Self::Container => "container",
            Self::Heading => "heading",
            Self::ContentBlock => "content-block",
            Self::ModificationsLog => "modifications-log",
        }
    }
}

/// Where a section lives, as paths re-resolved against the live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionLocator {
    /// A single element.
    Node(NodePath),
    /// `len` sibling nodes directly after a heading.
    Run {
        /// The heading that owns the run.
        heading: NodePath,
        /// Number of sibling nodes in the run.
        len: usize,
    },
}

/// A section resolved against a live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSection {
    /// A single element.
    Node(NodeId),
    /// The run of siblings after `heading`.
    Run {
        /// The owning heading.
        heading: NodeId,
        /// Run members in order.
        nodes: Vec<NodeId>,
    },
}

/// One addressable section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Stable identifier, unique within one index.
    pub identifier: String,
    /// Role of the section.
    pub kind: SectionKind,
    /// Digest of the serialized section.
    pub content_hash: String,
    /// Location in the document.
    pub locator: SectionLocator,
}

impl Section {
    /// Resolve the locator against `doc`.
    pub fn resolve(&self, doc: &Document) -> Option<ResolvedSection> {
        match &self.locator {
            SectionLocator::Node(path) => doc.resolve(path).map(ResolvedSection::Node),
            SectionLocator::Run { heading, len } => {
                let heading = doc.resolve(heading)?;
                doc.heading_level(heading)?;
                let parent = doc.parent(heading)?;
                let siblings = doc.children(parent);
                let start = siblings.iter().position(|s| *s == heading)? + 1;
                let nodes = siblings.get(start..start + len)?.to_vec();
                Some(ResolvedSection::Run { heading, nodes })
            },
        }
    }

    /// Serialized markup of the section.
    pub fn html(&self, doc: &Document) -> Option<String> {
        Some(match self.resolve(doc)? {
            ResolvedSection::Node(node) => doc.outer_html(node),
            ResolvedSection::Run { nodes, .. } => nodes.iter().map(|n| doc.outer_html(*n)).collect(),
        })
    }

    /// Text content of the section.
    pub fn text(&self, doc: &Document) -> Option<String> {
        Some(match self.resolve(doc)? {
            ResolvedSection::Node(node) => doc.text_content(node),
            ResolvedSection::Run { nodes, .. } => nodes.iter().map(|n| doc.text_content(*n)).collect(),
        })
    }
}

/// All sections of a document in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionIndex {
    sections: Vec<Section>,
    by_identifier: HashMap<String, usize>,
}

impl SectionIndex {
    /// Section by identifier.
    pub fn get(&self, identifier: &str) -> Option<&Section> {
        self.by_identifier
            .get(identifier)
            .map(|index| &self.sections[*index])
    }

    /// Sections in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// `identifier -> content hash` for every section.
    pub fn hashes(&self) -> BTreeMap<String, String> {
        self.sections
            .iter()
            .map(|s| (s.identifier.clone(), s.content_hash.clone()))
            .collect()
    }
}

/// SHA-256 of `html`, base64 encoded.
pub fn content_hash(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Builds [`SectionIndex`]es.
#[derive(Debug, Clone)]
pub struct SectionIndexer {
    layout_classes: HashSet<String>,
    layout_prefixes: Vec<String>,
    log: SelectorList,
}

impl SectionIndexer {
    /// Create an indexer from indexing rules and the log selector.
    pub fn new(indexing: &IndexingConfig, log_selector: &str) -> Result<Self> {
        Ok(Self {
            layout_classes: indexing.layout_classes.iter().cloned().collect(),
            layout_prefixes: indexing.layout_class_prefixes.clone(),
            log: SelectorList::parse(log_selector)?,
        })
    }

    /// Create an indexer from the full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.indexing, &config.patch.log_selector)
    }

    /// Whether `node` is the standing modifications log.
    pub fn is_log(&self, doc: &Document, node: NodeId) -> bool {
        self.log.matches(doc, node)
    }

    fn meaningful_class<'d>(&self, doc: &'d Document, node: NodeId) -> Option<&'d str> {
        let first = doc.element(node)?.classes().next()?;
        let layout = self.layout_classes.contains(first)
            || self.layout_prefixes.iter().any(|p| first.starts_with(p.as_str()));
        (!layout).then_some(first)
    }

    /// Index `doc`.
    pub fn index(&self, doc: &Document) -> SectionIndex {
        let body = doc.body();
        let scope = body.unwrap_or_else(|| doc.root());
        let mut builder = Builder {
            doc,
            scope,
            sections: Vec::new(),
            used: HashSet::new(),
            positions: HashMap::new(),
            owners: HashMap::new(),
        };

        if let Some(body) = body {
            builder.push_node(body, SectionKind::Container, "body".to_string());
        }

        let all = doc.descendants(doc.root());
        for node in &all {
            match doc.tag_name(*node) {
                Some("title") => {
                    let identifier = builder.unique("title".to_string());
                    builder.push_node(*node, SectionKind::Title, identifier);
                },
                Some("meta")
                    if doc
                        .attr(*node, "name")
                        .is_some_and(|n| n.eq_ignore_ascii_case("description")) =>
                {
                    let identifier = builder.unique("meta_description".to_string());
                    builder.push_node(*node, SectionKind::Meta, identifier);
                },
                _ => {},
            }
        }

        let mut stack: Vec<NodeId> = doc.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            let Some(name) = doc.tag_name(node) else {
                continue;
            };

            if doc.heading_level(node).is_some() {
                let class = self.meaningful_class(doc, node);
                let identifier = builder.identifier(node, SectionKind::Heading, class);
                builder.push_node(node, SectionKind::Heading, identifier.clone());
                builder.push_run(node, &identifier);
            } else if CONTAINER_TAGS.contains(&name) {
                let parent = doc.parent(node);
                let top_level = parent == Some(scope)
                    || parent.and_then(|p| doc.tag_name(p)) == Some("main");
                let has_id = doc.attr(node, "id").is_some_and(|id| !id.trim().is_empty());
                let class = self.meaningful_class(doc, node);
                if top_level || has_id || class.is_some() {
                    let kind = if self.is_log(doc, node) {
                        SectionKind::ModificationsLog
                    } else {
                        match name {
                            "header" => SectionKind::Header,
                            "footer" => SectionKind::Footer,
                            _ => SectionKind::Container,
                        }
                    };
                    let identifier = builder.identifier(node, kind, class);
                    builder.push_node(node, kind, identifier);
                    if kind == SectionKind::ModificationsLog {
                        continue;
                    }
                }
            }

            stack.extend(doc.children(node).iter().rev().copied());
        }

        let by_identifier = builder
            .sections
            .iter()
            .enumerate()
            .map(|(index, section)| (section.identifier.clone(), index))
            .collect();
        SectionIndex {
            sections: builder.sections,
            by_identifier,
        }
    }
}

struct Builder<'d> {
    doc: &'d Document,
    scope: NodeId,
    sections: Vec<Section>,
    used: HashSet<String>,
    /// Unnamed candidates seen so far per parent and kind.
    positions: HashMap<(NodeId, SectionKind), usize>,
    /// Identifier of every indexed element.
    owners: HashMap<NodeId, String>,
}

impl Builder<'_> {
    fn unique(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Apply the id / class / position rules. `class` is the element's first
    /// class when it is not a layout utility.
    ///
    /// The position counts only unnamed siblings of the same kind, so named
    /// siblings and nested content never shift it.
    fn identifier(&mut self, node: NodeId, kind: SectionKind, class: Option<&str>) -> String {
        let doc = self.doc;
        let prefix = kind.prefix();
        let id = doc.attr(node, "id").map(str::trim).filter(|id| !id.is_empty());
        let base = match (id, class) {
            (Some(id), _) => format!("{prefix}_{id}"),
            (None, Some(class)) => format!("{prefix}_{class}"),
            (None, None) => {
                let parent = doc.parent(node).unwrap_or(self.scope);
                let position = self.positions.entry((parent, kind)).or_insert(0);
                let index = *position;
                *position += 1;
                match self.owner(node) {
                    Some(owner) => format!("{prefix}_{owner}_{index}"),
                    None => format!("{prefix}_{index}"),
                }
            },
        };
        self.unique(base)
    }

    /// Identifier of the nearest indexed ancestor below the scope.
    fn owner(&self, node: NodeId) -> Option<&str> {
        let mut current = self.doc.parent(node);
        while let Some(ancestor) = current {
            if ancestor == self.scope {
                return None;
            }
            if let Some(identifier) = self.owners.get(&ancestor) {
                return Some(identifier);
            }
            current = self.doc.parent(ancestor);
        }
        None
    }

    fn push_node(&mut self, node: NodeId, kind: SectionKind, identifier: String) {
        let Some(path) = self.doc.path_of(node) else {
            return;
        };
        self.used.insert(identifier.clone());
        self.owners.insert(node, identifier.clone());
        self.sections.push(Section {
            identifier,
            kind,
            content_hash: content_hash(&self.doc.outer_html(node)),
            locator: SectionLocator::Node(path),
        });
    }

    fn push_run(&mut self, heading: NodeId, heading_identifier: &str) {
        let run = heading_run(self.doc, heading);
        if !run.iter().any(|n| self.doc.element(*n).is_some()) {
            return;
        }
        let Some(path) = self.doc.path_of(heading) else {
            return;
        };
        let html: String = run.iter().map(|n| self.doc.outer_html(*n)).collect();
        let identifier = self.unique(format!("{heading_identifier}_content"));
        self.sections.push(Section {
            identifier,
            kind: SectionKind::ContentBlock,
            content_hash: content_hash(&html),
            locator: SectionLocator::Run {
                heading: path,
                len: run.len(),
            },
        });
    }
}

/// Siblings after `heading` up to the next heading of equal or higher rank,
/// without trailing whitespace-only text.
fn heading_run(doc: &Document, heading: NodeId) -> Vec<NodeId> {
    let (Some(level), Some(parent)) = (doc.heading_level(heading), doc.parent(heading)) else {
        return Vec::new();
    };
    let siblings = doc.children(parent);
    let Some(start) = siblings.iter().position(|s| *s == heading).map(|i| i + 1) else {
        return Vec::new();
    };
    let mut end = start;
    while end < siblings.len() && doc.heading_level(siblings[end]).is_none_or(|l| l > level) {
        end += 1;
    }
    while end > start
        && matches!(doc.data(siblings[end - 1]), NodeData::Text(t) if t.trim().is_empty())
    {
        end -= 1;
    }
    siblings[start..end].to_vec()
}

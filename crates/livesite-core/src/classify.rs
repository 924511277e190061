//! Content classification.
//!
//! Generated text arrives in one of four shapes and each shape has its own
//! patch strategy. Classification happens once per cycle; a shape whose
//! markup does not survive parsing is downgraded to the next tier instead of
//! failing the cycle.
//!
//! ```
//! use livesite_core::classify::{classify, ContentKind};
//!
//! let c = classify("<!-- REPLACE contact --><div id=\"contact\">New</div>").unwrap();
//! assert_eq!(c.kind, ContentKind::TaggedFragment { name: "contact".into() });
//!
//! let c = classify("Hello\n\nWorld").unwrap();
//! assert_eq!(c.kind, ContentKind::PlainText);
//! assert_eq!(c.paragraphs, vec!["Hello", "World"]);
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::dom::{Document, NodeData, NodeId};
use crate::{Error, Result};

/// Marker comment naming the section a fragment is meant for.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- *(?:BEGIN|REPLACE|INSERT) +([A-Za-z0-9_-]+) *-->").unwrap()
});

/// Block-level tags that make text a loose fragment.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static BLOCK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:div|section)[\s>/]").unwrap());

/// A response wrapped in a single markdown code fence.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap()
});

/// Blank-line paragraph boundary.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").unwrap());

/// Shape of a generated blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentKind {
    /// A complete page with a root element and a body.
    FullDocument,
    /// Markup carrying a `BEGIN`/`REPLACE`/`INSERT` marker.
    TaggedFragment {
        /// Section name from the marker.
        name: String,
    },
    /// Block-level markup without a marker.
    LooseFragment,
    /// Anything else.
    PlainText,
}

impl ContentKind {
    /// Short name for logs and history.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FullDocument => "full-document",
            Self::TaggedFragment { .. } => "tagged-fragment",
            Self::LooseFragment => "loose-fragment",
            Self::PlainText => "plain-text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaggedFragment { name } => write!(f, "tagged-fragment({name})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A classified blob, with everything the patch strategies need.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Detected shape.
    pub kind: ContentKind,
    /// The blob after unwrapping a surrounding code fence.
    pub content: String,
    /// Parsed markup for every kind except plain text.
    pub parsed: Option<Document>,
    /// Non-empty blank-line separated paragraphs of `content`.
    pub paragraphs: Vec<String>,
}

impl Classification {
    /// Top-level element nodes of the parsed markup. Comments, doctypes and
    /// whitespace are skipped.
    pub fn top_level_elements(&self) -> Vec<NodeId> {
        self.parsed.as_ref().map_or_else(Vec::new, |doc| {
            doc.children(doc.root())
                .iter()
                .copied()
                .filter(|node| matches!(doc.data(*node), NodeData::Element(_)))
                .collect()
        })
    }
}

/// Strip a single surrounding markdown code fence, if present.
pub fn unwrap_code_fence(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |body| body.as_str())
}

/// Split text into trimmed, non-empty blank-line separated paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name carried by the first marker comment in `text`.
pub fn marker_name(text: &str) -> Option<String> {
    MARKER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
}

fn looks_like_document(text: &str) -> bool {
    let head: String = text
        .trim_start()
        .chars()
        .take(9)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

fn has_root_and_body(doc: &Document) -> bool {
    doc.html_root().is_some() && doc.body().is_some()
}

/// Parse a full document and make sure it keeps its root and body through
/// a serialize/parse round trip.
fn parse_full_document(text: &str) -> Option<Document> {
    let doc = Document::parse(text).ok()?;
    if !has_root_and_body(&doc) {
        return None;
    }
    let reparsed = Document::parse(&doc.serialize()).ok()?;
    has_root_and_body(&reparsed).then_some(doc)
}

/// Parse a fragment that must contain at least one element.
fn parse_markup(text: &str) -> Option<Document> {
    let doc = Document::parse_fragment(text).ok()?;
    (doc.element_count() > 0).then_some(doc)
}

/// Classify a generated blob.
///
/// Fails with [`Error::Parse`] only when the text holds no usable paragraph
/// at all.
pub fn classify(raw: &str) -> Result<Classification> {
    let content = unwrap_code_fence(raw).trim().to_string();
    let paragraphs = split_paragraphs(&content);
    if paragraphs.is_empty() {
        return Err(Error::Parse("generated content is empty".into()));
    }

    let mut classification = Classification {
        kind: ContentKind::PlainText,
        content,
        parsed: None,
        paragraphs,
    };

    if looks_like_document(&classification.content) {
        if let Some(doc) = parse_full_document(&classification.content) {
            classification.kind = ContentKind::FullDocument;
            classification.parsed = Some(doc);
            return Ok(classification);
        }
        tracing::warn!("document-like content lacks a root or body; downgrading");
    }

    if let Some(name) = marker_name(&classification.content) {
        if let Some(doc) = parse_markup(&classification.content) {
            classification.kind = ContentKind::TaggedFragment { name };
            classification.parsed = Some(doc);
            return Ok(classification);
        }
        tracing::warn!(marker = %name, "tagged content has no usable markup; downgrading");
    }

    if BLOCK_TAG_RE.is_match(&classification.content) {
        if let Some(doc) = parse_markup(&classification.content) {
            classification.kind = ContentKind::LooseFragment;
            classification.parsed = Some(doc);
            return Ok(classification);
        }
        tracing::warn!("block markup could not be parsed; treating as plain text");
    }

    Ok(classification)
}

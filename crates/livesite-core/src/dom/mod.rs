//! Mutable HTML document tree.
//!
//! [`Document`] owns every node in an arena and hands out [`NodeId`] handles.
//! Handles are only meaningful for the document that produced them and only
//! for the duration of one cycle; anything that has to survive a mutation is
//! stored as a [`NodePath`] and re-resolved against the live tree.
//!
//! Parsing is lenient in the way browsers are: unknown tags are kept,
//! unbalanced end tags are ignored and open elements are closed implicitly.
//! Serialization never fails for a tree built through this module's API.
//!
//! ```rust
//! use livesite_core::dom::Document;
//!
//! let mut doc = Document::parse(r#"<body><div id="contact">Old</div></body>"#)?;
//! let contact = doc.find_by_id("contact").unwrap();
//! doc.set_text(contact, "New")?;
//! assert_eq!(doc.serialize(), r#"<body><div id="contact">New</div></body>"#);
//! # Ok::<(), livesite_core::Error>(())
//! ```

mod parser;
pub mod selector;
mod serialize;

use std::collections::HashSet;

use crate::{Error, Result};

pub use selector::SelectorList;

/// Maximum element nesting accepted by the parser.
pub const MAX_DEPTH: usize = 512;

/// Elements that never have children or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is kept verbatim.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements whose content is text only, with entities decoded.
pub(crate) const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["title", "textarea"];

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Location of a node expressed as child indices from the document root.
///
/// Paths stay valid across serialization round trips of an unchanged tree,
/// which makes them the right thing to keep between two lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Child indices from the root, outermost first.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// Element name plus attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name.
    pub name: String,
    /// Attributes in source order, names lowercase, values decoded.
    pub attrs: Vec<(String, String)>,
}

impl Element {
    /// Create an element with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    /// Value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whitespace separated classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_ascii_whitespace()
    }

    /// Whether the element carries `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// The document root. Exactly one per document.
    Document,
    /// `<!DOCTYPE ...>`, storing the text after the keyword.
    Doctype(String),
    /// An element.
    Element(Element),
    /// Decoded character data.
    Text(String),
    /// Comment body without the delimiters.
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    const fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An HTML document held as an arena of nodes.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
            root: NodeId(0),
        }
    }

    /// Parse a complete document.
    ///
    /// Fails only when the text contains NUL bytes or nests elements deeper
    /// than [`MAX_DEPTH`].
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse(text)
    }

    /// Parse a fragment. The fragment's top-level nodes become the children
    /// of the returned document's root.
    pub fn parse_fragment(text: &str) -> Result<Self> {
        parser::parse(text)
    }

    /// Serialize the whole document back to markup.
    pub fn serialize(&self) -> String {
        serialize::inner(self, self.root)
    }

    /// The document root.
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Payload of a node.
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    /// Parent of a node, `None` for the root and detached nodes.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children of a node in order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Element children of a node in order.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// The element payload of a node, if it is an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Tag name of an element node.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    /// Attribute value of an element node.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    /// Whether an element node carries `class`.
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|el| el.has_class(class))
    }

    /// Heading level (1-6) of an `h1`..`h6` element.
    pub fn heading_level(&self, id: NodeId) -> Option<u8> {
        let name = self.tag_name(id)?;
        let bytes = name.as_bytes();
        if bytes.len() == 2 && bytes[0] == b'h' && (b'1'..=b'6').contains(&bytes[1]) {
            Some(bytes[1] - b'0')
        } else {
            None
        }
    }

    /// Whether the node is connected to the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeData::Text(text) = self.data(id) {
            return text.clone();
        }
        let mut out = String::new();
        for node in self.descendants(id) {
            if let NodeData::Text(text) = self.data(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Markup of a node including its own tags.
    pub fn outer_html(&self, id: NodeId) -> String {
        serialize::outer(self, id)
    }

    /// Markup of a node's children.
    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::inner(self, id)
    }

    /// Number of elements attached to the document.
    pub fn element_count(&self) -> usize {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.element(*id).is_some())
            .count()
    }

    /// First attached element with the given tag name, in document order.
    pub fn first_element_named(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.tag_name(*id) == Some(name))
    }

    /// The `<html>` element, if present.
    pub fn html_root(&self) -> Option<NodeId> {
        self.first_element_named("html")
    }

    /// The `<head>` element, if present.
    pub fn head(&self) -> Option<NodeId> {
        self.first_element_named("head")
    }

    /// The `<body>` element, if present.
    pub fn body(&self) -> Option<NodeId> {
        self.first_element_named("body")
    }

    /// The element with `id="value"`, if present.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.attr(*id, "id") == Some(value))
    }

    /// Elements matching a CSS selector, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.select_within(self.root, selector)
    }

    /// First element matching a CSS selector.
    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.select(selector)?.into_iter().next())
    }

    /// Elements below `scope` matching a CSS selector, in document order.
    pub fn select_within(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let selectors = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|id| selectors.matches(self, *id))
            .collect())
    }

    /// Path of child indices from the root to `id`, if attached.
    pub fn path_of(&self, id: NodeId) -> Option<NodePath> {
        let mut indices = Vec::new();
        let mut current = id;
        while current != self.root {
            let parent = self.parent(current)?;
            let index = self.children(parent).iter().position(|c| *c == current)?;
            indices.push(index);
            current = parent;
        }
        indices.reverse();
        Some(NodePath(indices))
    }

    /// Re-resolve a path against the live tree.
    pub fn resolve(&self, path: &NodePath) -> Option<NodeId> {
        let mut current = self.root;
        for index in &path.0 {
            current = *self.children(current).get(*index)?;
        }
        Some(current)
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node::new(data));
        NodeId(self.nodes.len() - 1)
    }

    /// Create a detached element, optionally holding one text child.
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)], text: Option<&str>) -> NodeId {
        let mut element = Element::new(tag);
        for (key, value) in attrs {
            if element.attr(key).is_none() {
                element
                    .attrs
                    .push(((*key).to_ascii_lowercase(), (*value).to_string()));
            }
        }
        let void = element.is_void();
        let id = self.push(NodeData::Element(element));
        if let Some(text) = text.filter(|t| !t.is_empty() && !void) {
            let text_id = self.push(NodeData::Text(text.to_string()));
            self.attach(id, text_id, None);
        }
        id
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Deep-copy a subtree of `other` into this document, detached.
    pub fn import_subtree(&mut self, other: &Self, node: NodeId) -> NodeId {
        let data = match other.data(node) {
            NodeData::Document => NodeData::Element(Element::new("div")),
            data => data.clone(),
        };
        let top = self.push(data);
        let mut stack = vec![(node, top)];
        while let Some((source, copy)) = stack.pop() {
            for child in other.children(source) {
                let child_copy = self.push(other.data(*child).clone());
                self.attach(copy, child_copy, None);
                stack.push((*child, child_copy));
            }
        }
        top
    }

    /// Deep-copy the top-level nodes of a parsed fragment, detached.
    pub fn import_fragment(&mut self, fragment: &Self) -> Vec<NodeId> {
        fragment
            .children(fragment.root)
            .iter()
            .map(|child| self.import_subtree(fragment, *child))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Mutation
    //
    // Every mutator validates its arguments first and only then touches the
    // tree, so an `Err` always leaves the document exactly as it was.
    // ---------------------------------------------------------------------

    fn check_exists(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!("unknown node {}", id.0)))
        }
    }

    fn check_container(&self, parent: NodeId) -> Result<()> {
        self.check_exists(parent)?;
        match &self.nodes[parent.0].data {
            NodeData::Document => Ok(()),
            NodeData::Element(el) if !el.is_void() => Ok(()),
            NodeData::Element(el) => Err(Error::InvalidOperation(format!(
                "<{}> cannot have children",
                el.name
            ))),
            _ => Err(Error::InvalidOperation(
                "only elements and the document can have children".into(),
            )),
        }
    }

    fn check_insertable(&self, parent: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        let mut seen = HashSet::with_capacity(new_nodes.len());
        for node in new_nodes {
            self.check_exists(*node)?;
            if !seen.insert(*node) {
                return Err(Error::InvalidOperation(format!(
                    "node {} listed twice",
                    node.0
                )));
            }
            if *node == self.root || matches!(self.data(*node), NodeData::Document) {
                return Err(Error::InvalidOperation(
                    "the document root cannot be inserted".into(),
                ));
            }
            if self.parent(*node).is_some() {
                return Err(Error::InvalidOperation(format!(
                    "node {} is still attached; remove it first",
                    node.0
                )));
            }
            if self.is_inclusive_ancestor(*node, parent) {
                return Err(Error::InvalidOperation(
                    "a node cannot be inserted into its own subtree".into(),
                ));
            }
        }
        Ok(())
    }

    fn sibling_slot(&self, reference: NodeId) -> Result<(NodeId, usize)> {
        self.check_exists(reference)?;
        let parent = self.parent(reference).ok_or_else(|| {
            Error::InvalidOperation(format!("node {} has no parent", reference.0))
        })?;
        let index = self
            .children(parent)
            .iter()
            .position(|c| *c == reference)
            .ok_or_else(|| Error::InvalidOperation("corrupt parent link".into()))?;
        Ok((parent, index))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match at {
            Some(index) => children.insert(index, child),
            None => children.push(child),
        }
    }

    fn attach_all(&mut self, parent: NodeId, mut at: usize, new_nodes: &[NodeId]) {
        for node in new_nodes {
            self.attach(parent, *node, Some(at));
            at += 1;
        }
    }

    /// Append detached nodes as the last children of `parent`.
    pub fn append_children(&mut self, parent: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        self.check_container(parent)?;
        self.check_insertable(parent, new_nodes)?;
        let at = self.children(parent).len();
        self.attach_all(parent, at, new_nodes);
        Ok(())
    }

    /// Insert detached nodes as the first children of `parent`.
    pub fn prepend_children(&mut self, parent: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        self.check_container(parent)?;
        self.check_insertable(parent, new_nodes)?;
        self.attach_all(parent, 0, new_nodes);
        Ok(())
    }

    /// Insert detached nodes immediately before `reference`.
    pub fn insert_before(&mut self, reference: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        let (parent, index) = self.sibling_slot(reference)?;
        self.check_insertable(parent, new_nodes)?;
        self.attach_all(parent, index, new_nodes);
        Ok(())
    }

    /// Insert detached nodes immediately after `reference`.
    pub fn insert_after(&mut self, reference: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        let (parent, index) = self.sibling_slot(reference)?;
        self.check_insertable(parent, new_nodes)?;
        self.attach_all(parent, index + 1, new_nodes);
        Ok(())
    }

    /// Replace `target` and its subtree with detached nodes.
    pub fn replace_subtree(&mut self, target: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        let (parent, index) = self.sibling_slot(target)?;
        self.check_insertable(parent, new_nodes)?;
        if new_nodes.contains(&target) {
            return Err(Error::InvalidOperation(
                "a node cannot replace itself".into(),
            ));
        }
        self.nodes[parent.0].children.remove(index);
        self.nodes[target.0].parent = None;
        self.attach_all(parent, index, new_nodes);
        Ok(())
    }

    /// Replace the children of `target` with detached nodes.
    pub fn replace_children(&mut self, target: NodeId, new_nodes: &[NodeId]) -> Result<()> {
        self.check_container(target)?;
        self.check_insertable(target, new_nodes)?;
        self.detach_children(target);
        self.attach_all(target, 0, new_nodes);
        Ok(())
    }

    /// Detach `target` from its parent. The node stays valid but detached.
    pub fn remove_subtree(&mut self, target: NodeId) -> Result<()> {
        let (parent, index) = self.sibling_slot(target)?;
        self.nodes[parent.0].children.remove(index);
        self.nodes[target.0].parent = None;
        Ok(())
    }

    /// Detach every child of `target`.
    pub fn clear_children(&mut self, target: NodeId) -> Result<()> {
        self.check_container(target)?;
        self.detach_children(target);
        Ok(())
    }

    fn detach_children(&mut self, target: NodeId) {
        let old = std::mem::take(&mut self.nodes[target.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replace the children of an element with a single text node.
    pub fn set_text(&mut self, target: NodeId, text: &str) -> Result<()> {
        self.check_container(target)?;
        if target == self.root {
            return Err(Error::InvalidOperation(
                "cannot set text on the document root".into(),
            ));
        }
        self.detach_children(target);
        if !text.is_empty() {
            let text_id = self.create_text(text);
            self.attach(target, text_id, None);
        }
        Ok(())
    }

    /// Set an attribute on an element, replacing any existing value.
    pub fn set_attr(&mut self, target: NodeId, name: &str, value: &str) -> Result<()> {
        self.check_exists(target)?;
        let NodeData::Element(el) = &mut self.nodes[target.0].data else {
            return Err(Error::InvalidOperation("attributes need an element".into()));
        };
        let name = name.to_ascii_lowercase();
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace() || b"\"'>/=".contains(&b)) {
            return Err(Error::InvalidOperation(format!("invalid attribute name `{name}`")));
        }
        match el.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => value.clone_into(existing),
            None => el.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    /// Remove an attribute from an element. Missing attributes are ignored.
    pub fn remove_attr(&mut self, target: NodeId, name: &str) -> Result<()> {
        self.check_exists(target)?;
        let NodeData::Element(el) = &mut self.nodes[target.0].data else {
            return Err(Error::InvalidOperation("attributes need an element".into()));
        };
        el.attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        Ok(())
    }

    /// Replace all attributes of an element.
    pub fn set_attrs(&mut self, target: NodeId, attrs: Vec<(String, String)>) -> Result<()> {
        self.check_exists(target)?;
        let NodeData::Element(el) = &mut self.nodes[target.0].data else {
            return Err(Error::InvalidOperation("attributes need an element".into()));
        };
        el.attrs = attrs;
        Ok(())
    }
}

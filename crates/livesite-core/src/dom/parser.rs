//! Lenient tokenizer and tree builder.
//!
//! The tokenizer scans bytes for ASCII delimiters with `memchr`, so every
//! slice boundary it produces falls on a UTF-8 character boundary.

use html_escape::decode_html_entities;
use memchr::{memchr, memmem};

use super::{
    Document, ESCAPABLE_RAW_TEXT_ELEMENTS, Element, MAX_DEPTH, NodeData, NodeId,
    RAW_TEXT_ELEMENTS,
};
use crate::{Error, Result};

/// Start tags that implicitly close an open `<p>`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "dialog", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hgroup", "hr", "li", "main", "menu", "nav", "ol", "p", "pre", "section", "table",
    "ul",
];

/// Elements that stop the search for an implicitly closed element.
const SCOPE_BOUNDARIES: &[&str] = &[
    "html", "table", "td", "th", "caption", "template", "button", "object",
];

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag(String),
    Comment(&'a str),
    Doctype(String),
}

const fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

const fn ends_tag_name(b: u8) -> bool {
    is_space(b) || b == b'/' || b == b'>'
}

fn valid_attr_name(name: &str) -> bool {
    !name.is_empty() && !name.bytes().any(|b| matches!(b, b'"' | b'\'' | b'<' | b'='))
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        let bytes = self.src.as_bytes();
        let len = bytes.len();
        loop {
            if self.pos >= len {
                return None;
            }
            let rest = &bytes[self.pos..];
            if rest[0] != b'<' {
                return Some(self.text_until_tag(self.pos));
            }

            let next = rest.get(1).copied();
            match next {
                Some(b'!') if rest.starts_with(b"<!--") => return Some(self.comment()),
                Some(b'!' | b'?') => return Some(self.bogus_or_doctype()),
                Some(b'/') => match rest.get(2) {
                    Some(b) if b.is_ascii_alphabetic() => {
                        if let Some(token) = self.end_tag() {
                            return Some(token);
                        }
                    },
                    Some(b'>') => self.pos += 3,
                    Some(_) => return Some(self.bogus_or_doctype()),
                    None => return Some(self.text_until_tag(self.pos)),
                },
                Some(b) if b.is_ascii_alphabetic() => {
                    if let Some(token) = self.start_tag() {
                        return Some(token);
                    }
                },
                _ => return Some(self.text_until_tag(self.pos)),
            }
        }
    }

    /// Text from `start` up to (not including) the next `<` after `start`.
    fn text_until_tag(&mut self, start: usize) -> Token<'a> {
        let bytes = self.src.as_bytes();
        let end = memchr(b'<', &bytes[start + 1..]).map_or(bytes.len(), |i| start + 1 + i);
        self.pos = end;
        Token::Text(&self.src[start..end])
    }

    fn comment(&mut self) -> Token<'a> {
        let bytes = self.src.as_bytes();
        let body_start = self.pos + 4;
        let (body_end, next) = memmem::find(&bytes[body_start..], b"-->")
            .map_or((bytes.len(), bytes.len()), |i| {
                (body_start + i, body_start + i + 3)
            });
        self.pos = next;
        Token::Comment(&self.src[body_start..body_end])
    }

    fn bogus_or_doctype(&mut self) -> Token<'a> {
        let bytes = self.src.as_bytes();
        let is_bang = bytes[self.pos + 1] == b'!';
        let body_start = self.pos + 2;
        let (body_end, next) = memchr(b'>', &bytes[body_start..])
            .map_or((bytes.len(), bytes.len()), |i| (body_start + i, body_start + i + 1));
        self.pos = next;
        let body = &self.src[body_start..body_end];
        let is_doctype = body
            .as_bytes()
            .get(..7)
            .is_some_and(|head| head.eq_ignore_ascii_case(b"doctype"));
        if is_bang && is_doctype {
            Token::Doctype(body[7..].trim().to_string())
        } else {
            Token::Comment(body)
        }
    }

    fn tag_name(&self, start: usize) -> (String, usize) {
        let bytes = self.src.as_bytes();
        let mut i = start;
        while i < bytes.len() && !ends_tag_name(bytes[i]) {
            i += 1;
        }
        (self.src[start..i].to_ascii_lowercase(), i)
    }

    /// `None` when the tag runs into end of input; such tags are dropped.
    fn end_tag(&mut self) -> Option<Token<'a>> {
        let bytes = self.src.as_bytes();
        let (name, after_name) = self.tag_name(self.pos + 2);
        match memchr(b'>', &bytes[after_name..]) {
            Some(i) => {
                self.pos = after_name + i + 1;
                Some(Token::EndTag(name))
            },
            None => {
                self.pos = bytes.len();
                None
            },
        }
    }

    /// `None` when the tag runs into end of input; such tags are dropped.
    fn start_tag(&mut self) -> Option<Token<'a>> {
        let bytes = self.src.as_bytes();
        let len = bytes.len();
        let (name, mut i) = self.tag_name(self.pos + 1);
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            while i < len && is_space(bytes[i]) {
                i += 1;
            }
            if i >= len {
                self.pos = len;
                return None;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                },
                b'/' => {
                    i += 1;
                    if bytes.get(i) == Some(&b'>') {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    continue;
                },
                _ => {},
            }

            let name_start = i;
            i += 1;
            while i < len && !ends_tag_name(bytes[i]) && bytes[i] != b'=' {
                i += 1;
            }
            let attr_name = self.src[name_start..i].to_ascii_lowercase();
            while i < len && is_space(bytes[i]) {
                i += 1;
            }

            let mut value = String::new();
            if bytes.get(i) == Some(&b'=') {
                i += 1;
                while i < len && is_space(bytes[i]) {
                    i += 1;
                }
                match bytes.get(i) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let value_start = i + 1;
                        let value_end = memchr(quote, &bytes[value_start..])
                            .map_or(len, |p| value_start + p);
                        value = decode_html_entities(&self.src[value_start..value_end]).into_owned();
                        i = (value_end + 1).min(len);
                    },
                    Some(_) => {
                        let value_start = i;
                        while i < len && !is_space(bytes[i]) && bytes[i] != b'>' {
                            i += 1;
                        }
                        value = decode_html_entities(&self.src[value_start..i]).into_owned();
                    },
                    None => {},
                }
            }

            if valid_attr_name(&attr_name) && !attrs.iter().any(|(key, _)| *key == attr_name) {
                attrs.push((attr_name, value));
            }
        }

        self.pos = i;
        Some(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }

    /// Consume raw content up to the matching `</name`, leaving the end tag
    /// for the next call to `next_token`.
    fn raw_text(&mut self, name: &str) -> &'a str {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let mut search = start;
        while let Some(offset) = memchr(b'<', &bytes[search..]) {
            let lt = search + offset;
            let name_end = lt + 2 + name.len();
            let is_close = bytes.get(lt + 1) == Some(&b'/')
                && bytes
                    .get(lt + 2..name_end)
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()))
                && bytes.get(name_end).is_none_or(|b| ends_tag_name(*b));
            if is_close {
                self.pos = lt;
                return &self.src[start..lt];
            }
            search = lt + 1;
        }
        self.pos = bytes.len();
        &self.src[start..]
    }
}

struct TreeBuilder {
    doc: Document,
    /// Open elements, with the document root at the bottom.
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        let doc = Document::new();
        let root = doc.root();
        Self {
            doc,
            stack: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.root())
    }

    fn open_name(&self, index: usize) -> &str {
        self.doc.tag_name(self.stack[index]).unwrap_or_default()
    }

    /// Index into the open-element stack of the nearest element named in
    /// `targets`, unless a boundary element is hit first.
    fn find_open(&self, targets: &[&str], boundaries: &[&str]) -> Option<usize> {
        for index in (1..self.stack.len()).rev() {
            let name = self.open_name(index);
            if targets.contains(&name) {
                return Some(index);
            }
            if boundaries.contains(&name) {
                return None;
            }
        }
        None
    }

    fn close_implied(&mut self, name: &str) {
        if CLOSES_P.contains(&name) {
            if let Some(index) = self.find_open(&["p"], SCOPE_BOUNDARIES) {
                self.stack.truncate(index);
            }
        }

        let implied = match name {
            "li" => self.find_open(&["li"], &["ul", "ol", "html", "table", "td", "th"]),
            "dt" | "dd" => self.find_open(&["dt", "dd"], &["dl", "html", "table", "td", "th"]),
            "tr" => self.find_open(&["tr"], &["table", "tbody", "thead", "tfoot", "html"]),
            "td" | "th" => self.find_open(&["td", "th"], &["tr", "table", "html"]),
            "option" | "optgroup" => {
                let top = self.stack.len() - 1;
                (top > 0 && self.open_name(top) == "option").then_some(top)
            },
            _ if HEADINGS.contains(&name) => {
                let top = self.stack.len() - 1;
                (top > 0 && HEADINGS.contains(&self.open_name(top))).then_some(top)
            },
            _ => None,
        };
        if let Some(index) = implied {
            self.stack.truncate(index);
        }
    }

    fn start_tag(&mut self, name: String, attrs: Vec<(String, String)>, self_closing: bool) -> Result<bool> {
        self.close_implied(&name);
        let element = Element { name, attrs };
        let leaf = element.is_void() || self_closing;
        let id = self.doc.push(NodeData::Element(element));
        let parent = self.current();
        self.doc.attach(parent, id, None);
        if leaf {
            return Ok(false);
        }
        if self.stack.len() > MAX_DEPTH {
            return Err(Error::Parse(format!(
                "elements nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.stack.push(id);
        Ok(true)
    }

    fn end_tag(&mut self, name: &str) {
        if let Some(index) = self.find_open(&[name], &[]) {
            self.stack.truncate(index);
        }
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(last) = self.doc.children(parent).last().copied() {
            if let NodeData::Text(existing) = &mut self.doc.nodes[last.0].data {
                existing.push_str(text);
                return;
            }
        }
        let id = self.doc.push(NodeData::Text(text.to_string()));
        self.doc.attach(parent, id, None);
    }

    fn leaf(&mut self, data: NodeData) {
        let parent = self.current();
        let id = self.doc.push(data);
        self.doc.attach(parent, id, None);
    }
}

pub(super) fn parse(text: &str) -> Result<Document> {
    if memchr(0, text.as_bytes()).is_some() {
        return Err(Error::Parse("input contains NUL bytes".into()));
    }

    let mut tokenizer = Tokenizer::new(text);
    let mut builder = TreeBuilder::new();

    while let Some(token) = tokenizer.next_token() {
        match token {
            Token::Text(raw) => builder.text(&decode_html_entities(raw)),
            Token::Comment(body) => builder.leaf(NodeData::Comment(body.to_string())),
            Token::Doctype(body) => builder.leaf(NodeData::Doctype(body)),
            Token::EndTag(name) => builder.end_tag(&name),
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                let raw_kind = if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                    Some(false)
                } else if ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                    Some(true)
                } else {
                    None
                };
                let tag = name.clone();
                let opened = builder.start_tag(name, attrs, self_closing)?;
                if let (true, Some(decode)) = (opened, raw_kind) {
                    let content = tokenizer.raw_text(&tag);
                    if decode {
                        builder.text(&decode_html_entities(content));
                    } else {
                        builder.text(content);
                    }
                }
            },
        }
    }

    Ok(builder.doc)
}

//! A small CSS selector subset.
//!
//! Supported: type selectors, `*`, `#id`, `.class`, `[attr]`, `[attr=value]`
//! (value bare or quoted), `:last-child`, the descendant (whitespace) and
//! child (`>`) combinators, and comma separated groups.

use super::{Document, NodeId};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrMatch {
    Exists(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
    last_child: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One complex selector: compounds joined by combinators, left to right.
/// The combinator stored with a compound links it to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Combinator, Compound)>,
}

/// A parsed, comma separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

fn invalid(source: &str, reason: &str) -> Error {
    Error::Parse(format!("invalid selector `{source}`: {reason}"))
}

const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct Cursor<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
        }
    }

    fn skip_spaces(&mut self) -> bool {
        let mut skipped = false;
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    fn ident(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.chars.peek().copied() {
            if !is_ident_char(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        if out.is_empty() {
            Err(invalid(self.source, "expected a name"))
        } else {
            Ok(out)
        }
    }

    fn attr_value(&mut self) -> Result<String> {
        match self.chars.peek().copied() {
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                let mut out = String::new();
                for c in self.chars.by_ref() {
                    if c == quote {
                        return Ok(out);
                    }
                    out.push(c);
                }
                Err(invalid(self.source, "unterminated string"))
            },
            _ => self.ident(),
        }
    }

    fn compound(&mut self) -> Result<Option<Compound>> {
        let mut compound = Compound::default();
        let mut any = false;
        if let Some(c) = self.chars.peek().copied() {
            if c == '*' {
                self.chars.next();
                any = true;
            } else if is_ident_char(c) {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
                any = true;
            }
        }
        while let Some(c) = self.chars.peek().copied() {
            match c {
                '#' => {
                    self.chars.next();
                    compound.id = Some(self.ident()?);
                },
                '.' => {
                    self.chars.next();
                    compound.classes.push(self.ident()?);
                },
                '[' => {
                    self.chars.next();
                    self.skip_spaces();
                    let name = self.ident()?.to_ascii_lowercase();
                    self.skip_spaces();
                    let matcher = match self.chars.next() {
                        Some(']') => AttrMatch::Exists(name),
                        Some('=') => {
                            self.skip_spaces();
                            let value = self.attr_value()?;
                            self.skip_spaces();
                            if self.chars.next() != Some(']') {
                                return Err(invalid(self.source, "expected `]`"));
                            }
                            AttrMatch::Equals(name, value)
                        },
                        _ => return Err(invalid(self.source, "unsupported attribute matcher")),
                    };
                    compound.attrs.push(matcher);
                },
                ':' => {
                    self.chars.next();
                    let pseudo = self.ident()?;
                    if pseudo != "last-child" {
                        return Err(invalid(self.source, "unsupported pseudo-class"));
                    }
                    compound.last_child = true;
                },
                _ => break,
            }
            any = true;
        }
        Ok(any.then_some(compound))
    }

    fn complex(&mut self) -> Result<Complex> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        self.skip_spaces();
        loop {
            let Some(compound) = self.compound()? else {
                return Err(invalid(self.source, "expected a selector"));
            };
            parts.push((combinator, compound));

            let spaced = self.skip_spaces();
            match self.chars.peek().copied() {
                None | Some(',') => return Ok(Complex { parts }),
                Some('>') => {
                    self.chars.next();
                    self.skip_spaces();
                    combinator = Combinator::Child;
                },
                Some(_) if spaced => combinator = Combinator::Descendant,
                Some(_) => return Err(invalid(self.source, "unexpected character")),
            }
        }
    }
}

impl SelectorList {
    /// Parse a selector list.
    pub fn parse(source: &str) -> Result<Self> {
        let mut cursor = Cursor::new(source);
        let mut selectors = vec![cursor.complex()?];
        while cursor.chars.next() == Some(',') {
            selectors.push(cursor.complex()?);
        }
        Ok(Self { selectors })
    }

    /// Whether the element `node` matches any selector in the list.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.element(node).is_some()
            && self
                .selectors
                .iter()
                .any(|complex| matches_from(doc, &complex.parts, complex.parts.len() - 1, node))
    }
}

fn matches_compound(doc: &Document, compound: &Compound, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if compound.tag.as_deref().is_some_and(|tag| tag != el.name) {
        return false;
    }
    if compound
        .id
        .as_deref()
        .is_some_and(|id| el.attr("id") != Some(id))
    {
        return false;
    }
    if !compound.classes.iter().all(|class| el.has_class(class)) {
        return false;
    }
    let attrs_ok = compound.attrs.iter().all(|matcher| match matcher {
        AttrMatch::Exists(name) => el.attr(name).is_some(),
        AttrMatch::Equals(name, value) => el.attr(name) == Some(value.as_str()),
    });
    if !attrs_ok {
        return false;
    }
    if compound.last_child {
        let is_last = doc
            .parent(node)
            .and_then(|parent| doc.element_children(parent).last().copied())
            == Some(node);
        if !is_last {
            return false;
        }
    }
    true
}

fn matches_from(doc: &Document, parts: &[(Combinator, Compound)], index: usize, node: NodeId) -> bool {
    let (combinator, compound) = &parts[index];
    if !matches_compound(doc, compound, node) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match combinator {
        Combinator::Child => doc
            .parent(node)
            .is_some_and(|parent| matches_from(doc, parts, index - 1, parent)),
        Combinator::Descendant => {
            let mut ancestor = doc.parent(node);
            while let Some(candidate) = ancestor {
                if matches_from(doc, parts, index - 1, candidate) {
                    return true;
                }
                ancestor = doc.parent(candidate);
            }
            false
        },
    }
}

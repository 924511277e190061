//! Markup serialization.
//!
//! Walks the tree with an explicit stack so arbitrarily deep trees built
//! through the mutation API cannot overflow the call stack.

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{Document, NodeData, NodeId, RAW_TEXT_ELEMENTS};

enum Step {
    Open(NodeId),
    Close(NodeId),
}

pub(super) fn outer(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write(doc, id, &mut out);
    out
}

pub(super) fn inner(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(id) {
        write(doc, *child, &mut out);
    }
    out
}

fn write(doc: &Document, start: NodeId, out: &mut String) {
    let mut stack = vec![Step::Open(start)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Close(id) => {
                if let Some(name) = doc.tag_name(id) {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            },
            Step::Open(id) => match doc.data(id) {
                NodeData::Document => {
                    stack.extend(doc.children(id).iter().rev().map(|c| Step::Open(*c)));
                },
                NodeData::Doctype(body) => {
                    out.push_str("<!DOCTYPE");
                    if !body.is_empty() {
                        out.push(' ');
                        out.push_str(&body.replace('>', ""));
                    }
                    out.push('>');
                },
                NodeData::Comment(body) => {
                    out.push_str("<!--");
                    out.push_str(&body.replace("-->", "-- >"));
                    out.push_str("-->");
                },
                NodeData::Text(text) => {
                    let raw_parent = doc
                        .parent(id)
                        .and_then(|p| doc.tag_name(p))
                        .filter(|name| RAW_TEXT_ELEMENTS.contains(name));
                    match raw_parent {
                        Some(name) => out.push_str(&neutralize_end_tag(text, name)),
                        None => out.push_str(&encode_text(text)),
                    }
                },
                NodeData::Element(el) => {
                    out.push('<');
                    out.push_str(&el.name);
                    for (key, value) in &el.attrs {
                        out.push(' ');
                        out.push_str(key);
                        if !value.is_empty() {
                            out.push_str("=\"");
                            out.push_str(&encode_double_quoted_attribute(value));
                            out.push('"');
                        }
                    }
                    out.push('>');
                    if !el.is_void() {
                        stack.push(Step::Close(id));
                        stack.extend(doc.children(id).iter().rev().map(|c| Step::Open(*c)));
                    }
                },
            },
        }
    }
}

/// Break up any `</name` inside raw text so it cannot close the element early.
fn neutralize_end_tag(text: &str, name: &str) -> String {
    let bytes = text.as_bytes();
    let needle_len = name.len() + 2;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut i = 0;
    while i + needle_len <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + needle_len].eq_ignore_ascii_case(name.as_bytes())
        {
            out.push_str(&text[last..=i]);
            out.push('\\');
            last = i + 1;
            i += needle_len;
        } else {
            i += 1;
        }
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_text_end_tag_is_neutralized() {
        assert_eq!(
            neutralize_end_tag("a</script>b</SCRIPT", "script"),
            "a<\\/script>b<\\/SCRIPT"
        );
        assert_eq!(neutralize_end_tag("x < y", "style"), "x < y");
    }

    #[test]
    fn test_boolean_attributes_render_bare() -> crate::Result<()> {
        let doc = Document::parse("<input disabled type=\"checkbox\">")?;
        assert_eq!(doc.serialize(), "<input disabled type=\"checkbox\">");
        Ok(())
    }

    #[test]
    fn test_deep_tree_serializes_without_recursion() -> crate::Result<()> {
        let mut doc = Document::new();
        let mut parent = doc.root();
        for _ in 0..2_000 {
            let child = doc.create_element("div", &[], None);
            doc.append_children(parent, &[child])?;
            parent = child;
        }
        let html = doc.serialize();
        assert!(html.starts_with("<div><div>"));
        assert_eq!(html.len(), 2_000 * "<div></div>".len());
        Ok(())
    }
}

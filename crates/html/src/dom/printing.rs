use core::fmt;

use super::{Document, DomNode, NodeKind};
use crate::HtmlError;
use crate::tree::{Attributes, Element, Node};
use indextree::NodeId;

/// Elements that never have children and are printed without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose text children are printed verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script",
    "style",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "plaintext",
];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// Check that `nodes` print back as themselves when placed under `parent_tag`.
///
/// Raw-text elements hold text only, and it must not contain their end tag.
/// Comments must not contain `-->`.
pub(crate) fn check_printable(parent_tag: &str, nodes: &[Node]) -> Result<(), HtmlError> {
    let unprintable = |reason: String| HtmlError::Unprintable {
        tag: parent_tag.to_owned(),
        reason,
    };
    for node in nodes {
        match node {
            Node::Comment(text) if text.contains("-->") => {
                return Err(unprintable(String::from("comment contains `-->`")));
            }
            Node::Text(text)
                if is_raw_text(parent_tag)
                    && text
                        .to_ascii_lowercase()
                        .contains(&format!("</{parent_tag}")) =>
            {
                return Err(unprintable(format!("text contains `</{parent_tag}`")));
            }
            Node::Element(_) | Node::Comment(_) if is_raw_text(parent_tag) => {
                return Err(unprintable(String::from("only text is allowed")));
            }
            Node::Element(_) | Node::Text(_) | Node::Comment(_) => {}
        }
    }
    Ok(())
}

/// Escape text content. `\r` is written as a character reference because the
/// tokenizer folds bare carriage returns into line feeds.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for char_val in text.chars() {
        match char_val {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(char_val),
        }
    }
    out
}

/// Escape a double-quoted attribute value.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for char_val in value.chars() {
        match char_val {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(char_val),
        }
    }
    out
}

fn write_start_tag(out: &mut String, tag: &str, attributes: &Attributes) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes.iter() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }
    out.push('>');
}

fn write_end_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn write_text(out: &mut String, parent_tag: &str, text: &str) {
    if is_raw_text(parent_tag) {
        out.push_str(text);
    } else {
        out.push_str(&escape_text(text));
    }
}

fn write_comment(out: &mut String, text: &str) {
    out.push_str("<!--");
    out.push_str(text);
    out.push_str("-->");
}

/// Serialize a value-type element.
pub(crate) fn write_element(out: &mut String, element: &Element) {
    write_start_tag(out, element.tag_name(), element.attributes());
    if is_void(element.tag_name()) {
        return;
    }
    write_children(out, element.tag_name(), element.children());
    write_end_tag(out, element.tag_name());
}

/// Serialize value-type children of an element tagged `parent_tag`.
pub(crate) fn write_children(out: &mut String, parent_tag: &str, children: &[Node]) {
    for child in children {
        match child {
            Node::Element(element) => write_element(out, element),
            Node::Text(text) => write_text(out, parent_tag, text),
            Node::Comment(text) => write_comment(out, text),
        }
    }
}

impl Document {
    /// Serialize the whole document.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_children(&mut out, self.root(), "");
        out
    }

    /// Serialize one node (`outerHTML` for elements).
    pub fn node_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, id, "");
        out
    }

    /// Serialize the children of `id` (`innerHTML`).
    pub fn inner_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        let tag = self.tag_name(id).unwrap_or_default();
        self.write_children(&mut out, id, tag);
        out
    }

    fn write_children(&self, out: &mut String, id: NodeId, parent_tag: &str) {
        for child in self.children(id) {
            self.write_node(out, child, parent_tag);
        }
    }

    fn write_node(&self, out: &mut String, id: NodeId, parent_tag: &str) {
        let Some(DomNode { kind, attributes }) = self.node(id) else {
            return;
        };
        match kind {
            NodeKind::Document => self.write_children(out, id, ""),
            NodeKind::Doctype { name } => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Element { tag } => {
                write_start_tag(out, tag, attributes);
                if is_void(tag) {
                    return;
                }
                self.write_children(out, id, tag);
                write_end_tag(out, tag);
            }
            NodeKind::Text { text } => write_text(out, parent_tag, text),
            NodeKind::Comment { text } => write_comment(out, text),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            for _ in 0..depth {
                formatter.write_str("  ")?;
            }
            Ok(())
        }

        fn fmt_node(
            dom: &Document,
            id: NodeId,
            formatter: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            let Some(DomNode { kind, attributes }) = dom.node(id) else {
                return Ok(());
            };
            write_indent(formatter, depth)?;
            match kind {
                NodeKind::Document => writeln!(formatter, "#document")?,
                NodeKind::Doctype { name } => writeln!(formatter, "<!DOCTYPE {name}>")?,
                NodeKind::Element { tag } => {
                    write!(formatter, "<{tag}")?;
                    for (name, value) in attributes.iter() {
                        write!(formatter, " {name}={value:?}")?;
                    }
                    writeln!(formatter, ">")?;
                }
                NodeKind::Text { text } => writeln!(formatter, "{text:?}")?,
                NodeKind::Comment { text } => writeln!(formatter, "<!--{text}-->")?,
            }
            for child in dom.children(id) {
                fmt_node(dom, child, formatter, depth.saturating_add(1))?;
            }
            Ok(())
        }

        writeln!(f, "Document")?;
        fmt_node(self, self.root(), f, 0)
    }
}

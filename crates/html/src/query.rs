//! Selector derivation and resolution over a [`Document`].
//!
//! Derived selectors prefer an id. Without one they fall back to a positional
//! `tag:nth-of-type(n)` chain, which is only valid for the snapshot it was
//! computed from: inserting or removing a sibling before the element between
//! two round trips makes it point elsewhere.

use crate::HtmlError;
use crate::dom::{Document, NodeId};
use crate::tree::{Attributes, Element};
use css_selectors::{ElementAdapter, SelectorList, matches_selector_list, parse_selector_list};

/// Borrowing adapter so the matcher can walk a document.
struct DocumentAdapter<'doc>(&'doc Document);

impl ElementAdapter for DocumentAdapter<'_> {
    type Handle = NodeId;

    fn parent(&self, element: NodeId) -> Option<NodeId> {
        self.0.parent_element(element)
    }

    fn previous_sibling_element(&self, element: NodeId) -> Option<NodeId> {
        self.0.previous_sibling_element(element)
    }

    fn tag_name(&self, element: NodeId) -> &str {
        self.0.tag_name(element).unwrap_or_default()
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        self.0.attribute(element, name)
    }
}

/// True if `value` can be written as `#value` without escaping.
fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let first_ok = match chars.next() {
        Some('-') => chars
            .clone()
            .next()
            .is_some_and(|second| second.is_ascii_alphabetic() || second == '_'),
        Some(first) => first.is_ascii_alphabetic() || first == '_',
        None => false,
    };
    first_ok
        && value
            .chars()
            .all(|current| current.is_ascii_alphanumeric() || current == '-' || current == '_')
}

fn quote_attribute_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_add(2));
    out.push('"');
    for char_val in value.chars() {
        if matches!(char_val, '"' | '\\') {
            out.push('\\');
        }
        out.push(char_val);
    }
    out.push('"');
    out
}

/// `#id`, or `[id="..."]` when the id is not a plain identifier.
pub fn id_selector(id: &str) -> String {
    if is_plain_identifier(id) {
        format!("#{id}")
    } else {
        format!("[id={}]", quote_attribute_value(id))
    }
}

/// `tag[name="value"]...` listing every attribute; not guaranteed unique.
pub fn attribute_selector(tag: &str, attributes: &Attributes) -> String {
    let mut out = String::from(tag);
    for (name, value) in attributes.iter() {
        out.push('[');
        out.push_str(name);
        out.push('=');
        out.push_str(&quote_attribute_value(value));
        out.push(']');
    }
    out
}

/// Selector that picks `node` out of the current document.
///
/// Walks up from `node`, emitting `tag` or `tag:nth-of-type(n)` per level and
/// stopping at the first element that carries an id. A chain that reaches
/// the top of the document ends in `:root`, so it cannot match a deeper
/// element with the same shape. Returns `None` when `node` is not an element.
pub fn unique_selector(document: &Document, node: NodeId) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(id) = current {
        let tag = document.tag_name(id)?;
        if let Some(element_id) = document.attribute(id, "id").filter(|value| !value.is_empty()) {
            segments.push(id_selector(element_id));
            break;
        }
        let mut segment = tag.to_owned();
        let position = position_among_type(document, id, tag);
        if position != 1 {
            segment.push_str(&format!(":nth-of-type({position})"));
        }
        current = document.parent_element(id);
        if current.is_none() {
            segment.push_str(":root");
        }
        segments.push(segment);
    }
    segments.reverse();
    Some(segments.join(" > "))
}

fn position_among_type(document: &Document, node: NodeId, tag: &str) -> usize {
    let mut position = 1_usize;
    let mut sibling = document.previous_sibling_element(node);
    while let Some(previous) = sibling {
        if document.tag_name(previous) == Some(tag) {
            position = position.saturating_add(1);
        }
        sibling = document.previous_sibling_element(previous);
    }
    position
}

/// Non-unique `tag[attr="value"]` selector of `node`.
pub fn selector_of(document: &Document, node: NodeId) -> Option<String> {
    Some(attribute_selector(
        document.tag_name(node)?,
        document.attributes(node)?,
    ))
}

fn parse(selector: &str) -> Result<SelectorList, HtmlError> {
    parse_selector_list(selector).map_err(|source| HtmlError::InvalidSelector {
        selector: selector.to_owned(),
        source,
    })
}

/// Every element matching `selector`, in document order.
///
/// # Errors
/// Returns [`HtmlError::InvalidSelector`] for unsupported syntax.
pub fn resolve_all(document: &Document, selector: &str) -> Result<Vec<NodeId>, HtmlError> {
    let list = parse(selector)?;
    let adapter = DocumentAdapter(document);
    Ok(document
        .elements()
        .filter(|&node| matches_selector_list(&adapter, node, &list))
        .collect())
}

/// First element matching `selector` in document order.
///
/// # Errors
/// Returns [`HtmlError::ElementNotFound`] when nothing matches and
/// [`HtmlError::InvalidSelector`] for unsupported syntax.
pub fn resolve(document: &Document, selector: &str) -> Result<NodeId, HtmlError> {
    let list = parse(selector)?;
    let adapter = DocumentAdapter(document);
    document
        .elements()
        .find(|&node| matches_selector_list(&adapter, node, &list))
        .ok_or_else(|| HtmlError::ElementNotFound(selector.to_owned()))
}

/// Parse `snapshot` and copy out the first element matching `selector`.
///
/// # Errors
/// Returns [`HtmlError::Parse`] for a malformed snapshot, otherwise as [`resolve`].
pub fn resolve_in_markup(snapshot: &str, selector: &str) -> Result<Element, HtmlError> {
    let document = Document::parse(snapshot)?;
    let node = resolve(&document, selector)?;
    document
        .to_element(node)
        .ok_or_else(|| HtmlError::ElementNotFound(selector.to_owned()))
}

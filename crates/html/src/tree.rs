//! Value-type element trees.
//!
//! An [`Element`] owns its children outright; inserting one element into
//! another always clones, so no subtree is ever shared between two trees.

use crate::dom::printing::{check_printable, escape_text, write_children, write_element};
use crate::events::{ArgumentStyle, handler_attribute};
use crate::query::attribute_selector;
use crate::{HtmlError, parser, style};
use core::slice;
use core::sync::atomic::{AtomicU64, Ordering};
use smallvec::SmallVec;

/// Counter backing generated element ids.
static NEXT_GENERATED_ID: AtomicU64 = AtomicU64::new(1);

/// Produce a fresh id of the form `pw-<n>`, unique within this process.
pub(crate) fn generate_id() -> String {
    format!("pw-{}", NEXT_GENERATED_ID.fetch_add(1, Ordering::Relaxed))
}

/// Ordered attribute list. Names are ASCII lowercase and unique; order is
/// insertion order, and replacing a value keeps the original position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes(SmallVec<(String, String), 4>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace `name`.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .0
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            value.clone_into(&mut entry.1);
        } else {
            self.0.push((name.to_ascii_lowercase(), value.to_owned()));
        }
    }

    /// Remove `name`, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .0
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'attrs> FromIterator<(&'attrs str, &'attrs str)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (&'attrs str, &'attrs str)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (name, value) in iter {
            attributes.set(name, value);
        }
        attributes
    }
}

/// A child of an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) | Self::Comment(_) => None,
        }
    }
}

/// Append `node` to `children`, merging adjacent text and dropping empty text,
/// so that a printed tree parses back to the same shape.
pub(crate) fn push_child(children: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text(text) if text.is_empty() => {}
        Node::Text(text) => {
            if let Some(Node::Text(previous)) = children.last_mut() {
                previous.push_str(&text);
            } else {
                children.push(Node::Text(text));
            }
        }
        other => children.push(other),
    }
}

/// Content accepted by `set_content`/`add_content`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// Markup parsed into nodes.
    Markup(String),
    /// Literal text, escaped when printed.
    Text(String),
    /// An element cloned into position.
    Element(Element),
}

impl Content {
    /// Nodes this content stands for.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] when markup content is malformed.
    pub fn to_nodes(&self) -> Result<Vec<Node>, HtmlError> {
        match self {
            Self::Markup(markup) => parser::parse_fragment(markup),
            Self::Text(text) => Ok(vec![Node::Text(text.clone())]),
            Self::Element(element) => Ok(vec![Node::Element(element.clone())]),
        }
    }

    /// Markup sent to the client for this content.
    pub fn to_markup(&self) -> String {
        match self {
            Self::Markup(markup) => markup.clone(),
            Self::Text(text) => escape_text(text),
            Self::Element(element) => element.to_markup(),
        }
    }
}

impl From<&str> for Content {
    fn from(markup: &str) -> Self {
        Self::Markup(markup.to_owned())
    }
}

impl From<String> for Content {
    fn from(markup: String) -> Self {
        Self::Markup(markup)
    }
}

impl From<Element> for Content {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&Element> for Content {
    fn from(element: &Element) -> Self {
        Self::Element(element.clone())
    }
}

/// Filter used by `find_all`-style lookups: tag, class token, `name` and
/// arbitrary attribute equality. Unset fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementQuery {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub name: Option<String>,
    pub attrs: Vec<(String, String)>,
}

impl ElementQuery {
    /// Match every element.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_ascii_lowercase()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_owned());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    pub fn matches(&self, tag: &str, attributes: &Attributes) -> bool {
        if self
            .tag
            .as_deref()
            .is_some_and(|wanted| !wanted.eq_ignore_ascii_case(tag))
        {
            return false;
        }
        if let Some(class) = self.class.as_deref() {
            let has_class = attributes.get("class").is_some_and(|classes| {
                classes.split_ascii_whitespace().any(|token| token == class)
            });
            if !has_class {
                return false;
            }
        }
        if self
            .name
            .as_deref()
            .is_some_and(|wanted| attributes.get("name") != Some(wanted))
        {
            return false;
        }
        self.attrs
            .iter()
            .all(|(name, value)| attributes.get(name) == Some(value.as_str()))
    }
}

/// One HTML element with its attributes and children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Attributes,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element; the tag is lowercased.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn from_parts(tag: String, attributes: Attributes, children: Vec<Node>) -> Self {
        Self {
            tag,
            attributes,
            children,
        }
    }

    /// Parse a fragment and return its first top-level element.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] when the markup is malformed or holds no element.
    pub fn from_markup(html: &str) -> Result<Self, HtmlError> {
        parser::parse_fragment(html)?
            .into_iter()
            .find_map(|node| match node {
                Node::Element(element) => Some(element),
                Node::Text(_) | Node::Comment(_) => None,
            })
            .ok_or_else(|| HtmlError::Parse(String::from("no element found in markup")))
    }

    /// Serialize deterministically, attributes in insertion order.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }

    /// Serialized children (`innerHTML`).
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        write_children(&mut out, &self.tag, &self.children);
        out
    }

    /// Concatenated descendant text (`textContent`).
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.set(name, value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Builder form of [`Self::set_attribute`].
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    pub fn set_id(&mut self, id: &str) {
        self.set_attribute("id", id);
    }

    /// Return the id, generating and storing one first when absent.
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id().filter(|id| !id.is_empty()) {
            return id.to_owned();
        }
        let id = generate_id();
        self.set_id(&id);
        id
    }

    pub fn value(&self) -> Option<&str> {
        self.attribute("value")
    }

    pub fn set_value(&mut self, value: &str) {
        self.set_attribute("value", value);
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements only, skipping text and comments.
    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Replace all children with `content`.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] for malformed markup content and
    /// [`HtmlError::Unprintable`] for content this element cannot hold; the
    /// element is left unchanged.
    pub fn set_content(&mut self, content: impl Into<Content>) -> Result<(), HtmlError> {
        let nodes = content.into().to_nodes()?;
        check_printable(&self.tag, &nodes)?;
        self.children.clear();
        for node in nodes {
            push_child(&mut self.children, node);
        }
        Ok(())
    }

    /// Append `content` after the existing children.
    ///
    /// # Errors
    /// As [`Element::set_content`]; the element is left unchanged.
    pub fn add_content(&mut self, content: impl Into<Content>) -> Result<(), HtmlError> {
        let nodes = content.into().to_nodes()?;
        check_printable(&self.tag, &nodes)?;
        for node in nodes {
            push_child(&mut self.children, node);
        }
        Ok(())
    }

    /// Append a child element (cloned) and return `self` for chaining.
    ///
    /// # Errors
    /// [`HtmlError::Unprintable`] when `self` is a raw-text element such as `script`.
    pub fn with_child(mut self, child: &Self) -> Result<Self, HtmlError> {
        let node = Node::Element(child.clone());
        check_printable(&self.tag, slice::from_ref(&node))?;
        push_child(&mut self.children, node);
        Ok(self)
    }

    /// Append a text node and return `self` for chaining.
    ///
    /// # Errors
    /// [`HtmlError::Unprintable`] when the text would end a raw-text element early.
    pub fn with_text(mut self, text: &str) -> Result<Self, HtmlError> {
        let node = Node::Text(text.to_owned());
        check_printable(&self.tag, slice::from_ref(&node))?;
        push_child(&mut self.children, node);
        Ok(self)
    }

    /// Descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// First descendant whose `id` equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&Self> {
        self.descendants()
            .into_iter()
            .find(|element| element.id() == Some(id))
    }

    /// Every descendant matching `query`, in document order.
    pub fn find_all(&self, query: &ElementQuery) -> Vec<&Self> {
        self.descendants()
            .into_iter()
            .filter(|element| query.matches(&element.tag, &element.attributes))
            .collect()
    }

    /// First descendant carrying the `selected` attribute, e.g. the chosen `<option>`.
    pub fn selected_option(&self) -> Option<&Self> {
        self.descendants()
            .into_iter()
            .find(|element| element.has_attribute("selected"))
    }

    /// Non-unique selector of the form `tag[attr="value"]...`.
    pub fn selector(&self) -> String {
        attribute_selector(&self.tag, &self.attributes)
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        style::property(self.attribute("style")?, name)
    }

    pub fn set_style_property(&mut self, name: &str, value: &str) {
        let updated = style::set_property(self.attribute("style"), name, value);
        self.set_attribute("style", &updated);
    }

    pub fn width(&self) -> Option<String> {
        self.style_property("width")
    }

    pub fn set_width(&mut self, value: &str) {
        self.set_style_property("width", value);
    }

    pub fn height(&self) -> Option<String> {
        self.style_property("height")
    }

    pub fn set_height(&mut self, value: &str) {
        self.set_style_property("height", value);
    }

    /// Set an `on<event>` attribute calling `function` with `args`.
    pub fn on(&mut self, event: &str, function: &str, args: &[&str], style: ArgumentStyle) {
        let (name, value) = handler_attribute(event, function, args, style);
        self.set_attribute(&name, &value);
    }

    pub fn onclick(&mut self, function: &str, args: &[&str], style: ArgumentStyle) {
        self.on("click", function, args, style);
    }

    /// An `<iframe>` that resizes itself to its content once loaded.
    pub fn iframe(src: Option<&str>, borderless: bool) -> Self {
        let mut frame = Self::new("iframe");
        if borderless {
            frame.set_style_property("border", "none");
        }
        frame.set_attribute("marginwidth", "0");
        frame.set_attribute("marginheight", "0");
        frame.set_attribute("align", "center");
        frame.on("load", "_resizeEmbed", &["this"], ArgumentStyle::RAW);
        if let Some(src) = src {
            frame.set_attribute("src", src);
        }
        frame
    }
}

fn collect_text(children: &[Node], out: &mut String) {
    for child in children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
            Node::Comment(_) => {}
        }
    }
}

fn collect_descendants<'tree>(element: &'tree Element, out: &mut Vec<&'tree Element>) {
    for child in element.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

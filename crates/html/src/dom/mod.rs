//! Arena-backed documents rebuilt from client snapshots.
//!
//! Mutation primitives here only change the tree; recording what changed for
//! the client is the caller's job.

pub mod printing;

use crate::tree::{Attributes, Content, Element, ElementQuery, Node, generate_id};
use crate::{HtmlError, parser};
use core::slice;
use indextree::{Arena, Node as ArenaNode};
use printing::check_printable;
pub use indextree::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Document,
    Doctype {
        name: String,
    },
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomNode {
    pub kind: NodeKind,
    pub attributes: Attributes,
}

impl DomNode {
    pub(crate) fn element(tag: String, attributes: Attributes) -> Self {
        Self {
            kind: NodeKind::Element { tag },
            attributes,
        }
    }

    pub(crate) fn text(text: String) -> Self {
        Self {
            kind: NodeKind::Text { text },
            attributes: Attributes::new(),
        }
    }

    pub(crate) fn comment(text: String) -> Self {
        Self {
            kind: NodeKind::Comment { text },
            attributes: Attributes::new(),
        }
    }

    pub(crate) fn doctype(name: String) -> Self {
        Self {
            kind: NodeKind::Doctype { name },
            attributes: Attributes::new(),
        }
    }
}

pub struct Document {
    arena: Arena<DomNode>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Document {
    /// Rebuilds the arena so removed slots are not carried over.
    fn clone(&self) -> Self {
        let mut copy = Self::new();
        for child in self.children(self.root) {
            copy.copy_subtree_from(self, child, copy.root);
        }
        copy
    }
}

impl Document {
    /// An empty document containing only the root node.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        Self { arena, root }
    }

    /// Parse a full snapshot.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] when the markup is malformed.
    pub fn parse(html: &str) -> Result<Self, HtmlError> {
        parser::parse_document(html)
    }

    /// The document node; its children are the top-level nodes.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node data, or `None` for ids that were removed.
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.arena
            .get(id)
            .filter(|node| !node.is_removed())
            .map(ArenaNode::get)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut DomNode> {
        self.arena
            .get_mut(id)
            .filter(|node| !node.is_removed())
            .map(ArenaNode::get_mut)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id)
            .is_some_and(|node| matches!(node.kind, NodeKind::Element { .. }))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Document
            | NodeKind::Doctype { .. }
            | NodeKind::Text { .. }
            | NodeKind::Comment { .. } => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> Option<&Attributes> {
        self.node(id)
            .filter(|node| matches!(node.kind, NodeKind::Element { .. }))
            .map(|node| &node.attributes)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)?.get(name)
    }

    /// Raw parent, which may be the document node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.parent()
    }

    /// Parent if it is an element.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&parent| self.is_element(parent))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(|&child| self.is_element(child))
    }

    pub fn previous_sibling_element(&self, id: NodeId) -> Option<NodeId> {
        id.preceding_siblings(&self.arena)
            .skip(1)
            .find(|&sibling| self.is_element(sibling))
    }

    /// Elements strictly below `scope`, in document order.
    pub fn descendant_elements(&self, scope: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        scope
            .descendants(&self.arena)
            .skip(1)
            .filter(|&node| self.is_element(node))
    }

    /// Every element of the document, in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendant_elements(self.root)
    }

    /// First element whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .find(|&node| self.attribute(node, "id") == Some(id))
    }

    /// Elements below `scope` matching `query`, in document order.
    pub fn find_all(&self, scope: NodeId, query: &ElementQuery) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .filter(|&node| {
                self.node(node).is_some_and(|data| match &data.kind {
                    NodeKind::Element { tag } => query.matches(tag, &data.attributes),
                    NodeKind::Document
                    | NodeKind::Doctype { .. }
                    | NodeKind::Text { .. }
                    | NodeKind::Comment { .. } => false,
                })
            })
            .collect()
    }

    /// Document-wide [`Self::find_all`].
    pub fn elements_matching(&self, query: &ElementQuery) -> Vec<NodeId> {
        self.find_all(self.root, query)
    }

    /// First descendant of `scope` with a `selected` attribute.
    pub fn selected_option(&self, scope: NodeId) -> Option<NodeId> {
        self.descendant_elements(scope)
            .find(|&node| self.attribute(node, "selected").is_some())
    }

    /// Copy an element subtree out of the arena as a value.
    pub fn to_element(&self, id: NodeId) -> Option<Element> {
        match self.to_value_node(id)? {
            Node::Element(element) => Some(element),
            Node::Text(_) | Node::Comment(_) => None,
        }
    }

    /// Top-level nodes as values; doctypes are skipped.
    pub fn to_nodes(&self) -> Vec<Node> {
        self.children(self.root)
            .filter_map(|child| self.to_value_node(child))
            .collect()
    }

    fn to_value_node(&self, id: NodeId) -> Option<Node> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Element { tag } => {
                let children = self
                    .children(id)
                    .filter_map(|child| self.to_value_node(child))
                    .collect();
                Some(Node::Element(Element::from_parts(
                    tag.clone(),
                    node.attributes.clone(),
                    children,
                )))
            }
            NodeKind::Text { text } => Some(Node::Text(text.clone())),
            NodeKind::Comment { text } => Some(Node::Comment(text.clone())),
            NodeKind::Document | NodeKind::Doctype { .. } => None,
        }
    }

    /// Concatenated descendant text of `id`.
    pub fn text(&self, id: NodeId) -> String {
        id.descendants(&self.arena)
            .filter_map(|node| match &self.node(node)?.kind {
                NodeKind::Text { text } => Some(text.as_str()),
                NodeKind::Document
                | NodeKind::Doctype { .. }
                | NodeKind::Element { .. }
                | NodeKind::Comment { .. } => None,
            })
            .collect()
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut DomNode, HtmlError> {
        self.node_mut(id)
            .filter(|node| matches!(node.kind, NodeKind::Element { .. }))
            .ok_or(HtmlError::NotAnElement)
    }

    fn require_element(&self, id: NodeId) -> Result<(), HtmlError> {
        if self.is_element(id) {
            Ok(())
        } else {
            Err(HtmlError::NotAnElement)
        }
    }

    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `id` is not a live element.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), HtmlError> {
        self.element_mut(id)?.attributes.set(name, value);
        Ok(())
    }

    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `id` is not a live element.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>, HtmlError> {
        Ok(self.element_mut(id)?.attributes.remove(name))
    }

    /// Return the element's id, generating a document-unique one when absent.
    ///
    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `id` is not a live element.
    pub fn ensure_id(&mut self, id: NodeId) -> Result<String, HtmlError> {
        self.require_element(id)?;
        if let Some(existing) = self.attribute(id, "id").filter(|value| !value.is_empty()) {
            return Ok(existing.to_owned());
        }
        let mut generated = generate_id();
        while self.element_by_id(&generated).is_some() {
            generated = generate_id();
        }
        self.set_attribute(id, "id", &generated)?;
        Ok(generated)
    }

    /// Replace the children of `id` with `content`.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] for malformed markup,
    /// [`HtmlError::Unprintable`] for content `id` cannot hold, or
    /// [`HtmlError::NotAnElement`] if `id` is not a live element. The tree is
    /// unchanged on error.
    pub fn set_content(&mut self, id: NodeId, content: &Content) -> Result<(), HtmlError> {
        let nodes = self.printable_nodes(id, content)?;
        let old_children: Vec<NodeId> = self.children(id).collect();
        for child in old_children {
            child.remove_subtree(&mut self.arena);
        }
        for node in &nodes {
            self.append_value(id, node);
        }
        Ok(())
    }

    /// Append `content` after the children of `id`.
    ///
    /// # Errors
    /// Returns [`HtmlError::Parse`] for malformed markup,
    /// [`HtmlError::Unprintable`] for content `id` cannot hold, or
    /// [`HtmlError::NotAnElement`] if `id` is not a live element. The tree is
    /// unchanged on error.
    pub fn add_content(&mut self, id: NodeId, content: &Content) -> Result<(), HtmlError> {
        for node in &self.printable_nodes(id, content)? {
            self.append_value(id, node);
        }
        Ok(())
    }

    /// Append a clone of `element` as the last child of `parent`.
    ///
    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `parent` is neither the root nor a
    /// live element, and [`HtmlError::Unprintable`] if `parent` only holds text.
    pub fn append_element(&mut self, parent: NodeId, element: &Element) -> Result<NodeId, HtmlError> {
        let node = Node::Element(element.clone());
        if parent != self.root {
            self.require_element(parent)?;
            let tag = self.tag_name(parent).unwrap_or_default();
            check_printable(tag, slice::from_ref(&node))?;
        }
        let new_id = self.build_detached(&node);
        parent.append(new_id, &mut self.arena);
        Ok(new_id)
    }

    /// Nodes of `content`, checked against the element `id` they go into.
    fn printable_nodes(&self, id: NodeId, content: &Content) -> Result<Vec<Node>, HtmlError> {
        self.require_element(id)?;
        let nodes = content.to_nodes()?;
        check_printable(self.tag_name(id).unwrap_or_default(), &nodes)?;
        Ok(nodes)
    }

    /// Put a clone of `element` where `id` is and drop `id`'s subtree.
    ///
    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `id` is not a live element.
    pub fn replace_with(&mut self, id: NodeId, element: &Element) -> Result<NodeId, HtmlError> {
        self.require_element(id)?;
        let new_id = self.build_detached(&Node::Element(element.clone()));
        id.insert_before(new_id, &mut self.arena);
        id.remove_subtree(&mut self.arena);
        Ok(new_id)
    }

    /// Detach and drop the subtree rooted at `id`.
    ///
    /// # Errors
    /// Returns [`HtmlError::NotAnElement`] if `id` is not a live element.
    pub fn remove(&mut self, id: NodeId) -> Result<(), HtmlError> {
        self.require_element(id)?;
        id.remove_subtree(&mut self.arena);
        Ok(())
    }

    /// Replace the whole document with `other`'s content.
    pub fn replace_document(&mut self, other: &Self) {
        *self = other.clone();
    }

    /// Append a parsed node under `parent`, merging into a preceding text node.
    pub(crate) fn append_node(&mut self, parent: NodeId, node: DomNode) -> NodeId {
        if let NodeKind::Text { text } = &node.kind
            && let Some(last) = self.arena.get(parent).and_then(ArenaNode::last_child)
            && let Some(DomNode {
                kind: NodeKind::Text { text: previous },
                ..
            }) = self.node_mut(last)
        {
            previous.push_str(text);
            return last;
        }
        let new_id = self.arena.new_node(node);
        parent.append(new_id, &mut self.arena);
        new_id
    }

    fn append_value(&mut self, parent: NodeId, node: &Node) {
        match node {
            Node::Text(text) if text.is_empty() => {}
            Node::Text(text) => {
                self.append_node(parent, DomNode::text(text.clone()));
            }
            Node::Comment(_) | Node::Element(_) => {
                let new_id = self.build_detached(node);
                parent.append(new_id, &mut self.arena);
            }
        }
    }

    fn build_detached(&mut self, node: &Node) -> NodeId {
        match node {
            Node::Text(text) => self.arena.new_node(DomNode::text(text.clone())),
            Node::Comment(text) => self.arena.new_node(DomNode::comment(text.clone())),
            Node::Element(element) => {
                let new_id = self.arena.new_node(DomNode::element(
                    element.tag_name().to_owned(),
                    element.attributes().clone(),
                ));
                for child in element.children() {
                    self.append_value(new_id, child);
                }
                new_id
            }
        }
    }

    fn copy_subtree_from(&mut self, source: &Self, source_id: NodeId, parent: NodeId) {
        let Some(node) = source.node(source_id) else {
            return;
        };
        let new_id = self.arena.new_node(node.clone());
        parent.append(new_id, &mut self.arena);
        for child in source.children(source_id) {
            self.copy_subtree_from(source, child, new_id);
        }
    }
}

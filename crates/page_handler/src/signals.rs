//! Mutations of a page tree and the client instructions they produce.
//!
//! Every change a server function makes goes through a [`Mutation`]. Applying
//! it edits the tree and yields at most one [`Instruction`]; the page the
//! mutation was applied to decides whether that instruction is queued for the
//! client (a working page) or dropped (a template page during setup).
//! Element selectors are derived before the tree is touched, so they address
//! the element as the client currently sees it.

use html::events::{ArgumentStyle, handler_attribute};
use html::style::set_property;
use html::{Content, Document, Element, ElementQuery, HtmlError, NodeId, resolve_all, unique_selector};
use protocol::{Instruction, element_ref};
use serde_json::Value;

/// One logical change to a page.
pub trait Mutation {
    /// Change `document` and describe the change for the client.
    ///
    /// # Errors
    /// Fails before touching the tree when the target is not a live element,
    /// a selector does not resolve, or markup content is malformed.
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError>;
}

/// Instructions captured during one dispatch cycle, in call order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalQueue {
    instructions: Vec<Instruction>,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        log::trace!("queued {}", instruction.func);
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

fn selector_for(document: &Document, node: NodeId) -> Result<String, HtmlError> {
    unique_selector(document, node).ok_or(HtmlError::NotAnElement)
}

/// Script defining a client function that forwards its arguments to the server.
pub fn function_stub(name: &str) -> String {
    format!("function {name}(...args) {{ _toPy('{name}', ...args) }}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetAttribute {
    pub node: NodeId,
    pub name: String,
    pub value: String,
}

impl Mutation for SetAttribute {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        let name = self.name.to_ascii_lowercase();
        document.set_attribute(self.node, &name, &self.value)?;
        Ok(Some(Instruction::set_attribute(&selector, &name, &self.value)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveAttribute {
    pub node: NodeId,
    pub name: String,
}

impl Mutation for RemoveAttribute {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        let name = self.name.to_ascii_lowercase();
        document.remove_attribute(self.node, &name)?;
        Ok(Some(Instruction::remove_attribute(&selector, &name)))
    }
}

/// Give the element an id if it has none. Silent when one already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnsureId {
    pub node: NodeId,
}

impl Mutation for EnsureId {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        if document
            .attribute(self.node, "id")
            .is_some_and(|id| !id.is_empty())
        {
            return Ok(None);
        }
        let selector = selector_for(document, self.node)?;
        let id = document.ensure_id(self.node)?;
        Ok(Some(Instruction::set_attribute(&selector, "id", &id)))
    }
}

/// Set one declaration of the inline style; sent as a single `style` update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetStyleProperty {
    pub node: NodeId,
    pub property: String,
    pub value: String,
}

impl Mutation for SetStyleProperty {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        if !document.is_element(self.node) {
            return Err(HtmlError::NotAnElement);
        }
        let style = set_property(
            document.attribute(self.node, "style"),
            &self.property,
            &self.value,
        );
        SetAttribute {
            node: self.node,
            name: String::from("style"),
            value: style,
        }
        .apply(document)
    }
}

/// Install an inline `on<event>` handler calling a server function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetHandler {
    pub node: NodeId,
    pub event: String,
    pub function: String,
    pub args: Vec<String>,
    pub style: ArgumentStyle,
}

impl Mutation for SetHandler {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let (name, value) = handler_attribute(&self.event, &self.function, &args, self.style);
        SetAttribute {
            node: self.node,
            name,
            value,
        }
        .apply(document)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetContent {
    pub node: NodeId,
    pub content: Content,
}

impl Mutation for SetContent {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        document.set_content(self.node, &self.content)?;
        Ok(Some(Instruction::set_content(
            &selector,
            &self.content.to_markup(),
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddContent {
    pub node: NodeId,
    pub content: Content,
}

impl Mutation for AddContent {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        document.add_content(self.node, &self.content)?;
        Ok(Some(Instruction::add_content(
            &selector,
            &self.content.to_markup(),
        )))
    }
}

/// Swap an element for a clone of `element`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceElement {
    pub node: NodeId,
    pub element: Element,
}

impl Mutation for ReplaceElement {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        document.replace_with(self.node, &self.element)?;
        Ok(Some(Instruction::replace_element(
            &selector,
            &self.element.to_markup(),
        )))
    }
}

/// Replace the i-th match of `selector` with the i-th element.
///
/// Matches and elements are paired in order; surplus entries on either side
/// are left out on the server and in the instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceAll {
    pub selector: String,
    pub elements: Vec<Element>,
}

impl Mutation for ReplaceAll {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let matches = resolve_all(document, &self.selector)?;
        let mut markups = Vec::with_capacity(matches.len().min(self.elements.len()));
        for (node, element) in matches.into_iter().zip(&self.elements) {
            // A match nested inside an earlier one is already gone.
            if document.is_element(node) {
                document.replace_with(node, element)?;
            }
            markups.push(element.to_markup());
        }
        Ok(Some(Instruction::replace_elements(&self.selector, markups)))
    }
}

/// Replace the whole document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetDocument {
    pub markup: String,
}

impl Mutation for SetDocument {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let replacement = Document::parse(&self.markup)?;
        document.replace_document(&replacement);
        Ok(Some(Instruction::set_document(&self.markup)))
    }
}

/// Append a `<script>` defining a client stub for a server function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddFunctionStub {
    pub name: String,
}

impl Mutation for AddFunctionStub {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let script = function_stub(&self.name);
        let parent = document
            .elements_matching(&ElementQuery::tag("html"))
            .first()
            .copied()
            .unwrap_or_else(|| document.root());
        document.append_element(parent, &Element::new("script").with_text(&script)?)?;
        Ok(Some(Instruction::add_script(&script)))
    }
}

/// Ask the client for the files picked in a file input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestFiles {
    pub node: NodeId,
    pub with_content: bool,
}

impl Mutation for RequestFiles {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let selector = selector_for(document, self.node)?;
        Ok(Some(Instruction::request_files(&selector, self.with_content)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigate {
    pub url: String,
    pub new_tab: bool,
}

impl Mutation for Navigate {
    fn apply(self, _document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        Ok(Some(Instruction::go_to(&self.url, self.new_tab)))
    }
}

/// Write (`Some`) or delete (`None`) a key in the client's local storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreKey {
    pub key: String,
    pub value: Option<String>,
}

impl Mutation for StoreKey {
    fn apply(self, _document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        Ok(Some(match self.value {
            Some(value) => Instruction::set_key(&self.key, &value),
            None => Instruction::delete_key(&self.key),
        }))
    }
}

/// Argument of a custom client call.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientArg {
    Value(Value),
    /// Sent as an element reference carrying its derived selector.
    Element(NodeId),
}

impl From<Value> for ClientArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for ClientArg {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<NodeId> for ClientArg {
    fn from(node: NodeId) -> Self {
        Self::Element(node)
    }
}

/// Call a script function the page defines itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientCall {
    pub func: String,
    pub args: Vec<ClientArg>,
}

impl Mutation for ClientCall {
    fn apply(self, document: &mut Document) -> Result<Option<Instruction>, HtmlError> {
        let mut args = Vec::with_capacity(self.args.len());
        for arg in self.args {
            args.push(match arg {
                ClientArg::Value(value) => value,
                ClientArg::Element(node) => element_ref(&selector_for(document, node)?),
            });
        }
        Ok(Some(Instruction::custom(&self.func, args)))
    }
}

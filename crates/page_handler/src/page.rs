//! Template pages, per-request working pages, and element handles.
//!
//! A [`Page`] is built once at setup from a static template and owns the
//! page's function registry. Each inbound call gets a [`WorkingPage`]
//! rebuilt from the client's snapshot; mutations applied to it are queued as
//! instructions, while mutations applied to a template are silent.

use crate::registry::{Callable, FunctionRegistry};
use crate::signals::{
    AddContent, AddFunctionStub, ClientArg, ClientCall, EnsureId, Mutation, Navigate,
    RemoveAttribute, ReplaceAll, ReplaceElement, RequestFiles, SetAttribute, SetContent,
    SetDocument, SetHandler, SetStyleProperty, SignalQueue, StoreKey,
};
use html::style::property;
use html::{
    ArgumentStyle, Content, Document, Element, ElementQuery, HtmlError, NodeId, resolve,
    resolve_all, selector_of, unique_selector,
};
use protocol::Instruction;

/// Read access and mutation entry points shared by template and working pages.
pub trait PageTree {
    fn url(&self) -> &str;

    fn document(&self) -> &Document;

    /// Apply `mutation` and route its instruction to this page's sink.
    ///
    /// # Errors
    /// Whatever the mutation reports; the tree is left unchanged then.
    fn apply<M: Mutation>(&mut self, mutation: M) -> Result<(), HtmlError>;

    fn to_markup(&self) -> String {
        self.document().to_markup()
    }

    /// Element with the given `id` attribute.
    fn get_element(&self, id: &str) -> Option<ElementRef<'_>> {
        let document = self.document();
        document
            .element_by_id(id)
            .map(|node| ElementRef { document, node })
    }

    fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
        let document = self.document();
        document
            .is_element(node)
            .then_some(ElementRef { document, node })
    }

    /// First element matching `selector`.
    ///
    /// # Errors
    /// [`HtmlError::ElementNotFound`] or [`HtmlError::InvalidSelector`].
    fn select(&self, selector: &str) -> Result<ElementRef<'_>, HtmlError> {
        let document = self.document();
        resolve(document, selector).map(|node| ElementRef { document, node })
    }

    /// Every element matching `selector`, in document order.
    ///
    /// # Errors
    /// [`HtmlError::InvalidSelector`] for unsupported syntax.
    fn select_all(&self, selector: &str) -> Result<Vec<ElementRef<'_>>, HtmlError> {
        let document = self.document();
        Ok(resolve_all(document, selector)?
            .into_iter()
            .map(|node| ElementRef { document, node })
            .collect())
    }

    /// Elements filtered by tag, class, `name` and other attributes.
    fn get_elements(&self, query: &ElementQuery) -> Vec<ElementRef<'_>> {
        let document = self.document();
        document
            .elements_matching(query)
            .into_iter()
            .map(|node| ElementRef { document, node })
            .collect()
    }

    fn html_element(&self) -> Option<ElementRef<'_>> {
        self.get_elements(&ElementQuery::tag("html")).into_iter().next()
    }

    fn body_element(&self) -> Option<ElementRef<'_>> {
        self.get_elements(&ElementQuery::tag("body")).into_iter().next()
    }

    /// Mutable handle on `node`.
    fn element_mut(&mut self, node: NodeId) -> ElementMut<'_, Self>
    where
        Self: Sized,
    {
        ElementMut { page: self, node }
    }

    /// Mutable handle on the element with the given `id` attribute.
    fn get_element_mut(&mut self, id: &str) -> Option<ElementMut<'_, Self>>
    where
        Self: Sized,
    {
        let node = self.document().element_by_id(id)?;
        Some(ElementMut { page: self, node })
    }

    /// # Errors
    /// [`HtmlError::Parse`] if `markup` is malformed.
    fn set_document(&mut self, markup: &str) -> Result<(), HtmlError> {
        self.apply(SetDocument {
            markup: markup.to_owned(),
        })
    }

    /// Replace the i-th match of `selector` with a clone of `elements[i]`.
    ///
    /// # Errors
    /// [`HtmlError::InvalidSelector`] for unsupported syntax.
    fn replace_all(&mut self, selector: &str, elements: &[Element]) -> Result<(), HtmlError> {
        self.apply(ReplaceAll {
            selector: selector.to_owned(),
            elements: elements.to_vec(),
        })
    }

    /// Define a client stub for the server function `name`.
    ///
    /// # Errors
    /// Only if the document has no usable root.
    fn expose_function(&mut self, name: &str) -> Result<(), HtmlError> {
        self.apply(AddFunctionStub {
            name: name.to_owned(),
        })
    }

    /// # Errors
    /// Never fails; the signature matches the other mutations.
    fn navigate(&mut self, url: &str, new_tab: bool) -> Result<(), HtmlError> {
        self.apply(Navigate {
            url: url.to_owned(),
            new_tab,
        })
    }

    /// Store `value` under `key` in the client's local storage.
    ///
    /// # Errors
    /// Never fails; the signature matches the other mutations.
    fn set_key(&mut self, key: &str, value: &str) -> Result<(), HtmlError> {
        self.apply(StoreKey {
            key: key.to_owned(),
            value: Some(value.to_owned()),
        })
    }

    /// # Errors
    /// Never fails; the signature matches the other mutations.
    fn delete_key(&mut self, key: &str) -> Result<(), HtmlError> {
        self.apply(StoreKey {
            key: key.to_owned(),
            value: None,
        })
    }

    /// Call `func` in the page's own script, passing elements by reference.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if an element argument is not live.
    fn call_client(&mut self, func: &str, args: Vec<ClientArg>) -> Result<(), HtmlError> {
        self.apply(ClientCall {
            func: func.to_owned(),
            args,
        })
    }
}

/// Read-only view of one element of a page.
#[derive(Clone, Copy, Debug)]
pub struct ElementRef<'page> {
    document: &'page Document,
    node: NodeId,
}

impl<'page> ElementRef<'page> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn tag_name(&self) -> &'page str {
        self.document.tag_name(self.node).unwrap_or_default()
    }

    pub fn attribute(&self, name: &str) -> Option<&'page str> {
        self.document.attribute(self.node, name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn id(&self) -> Option<&'page str> {
        self.attribute("id")
    }

    pub fn value(&self) -> Option<&'page str> {
        self.attribute("value")
    }

    pub fn text(&self) -> String {
        self.document.text(self.node)
    }

    pub fn inner_markup(&self) -> String {
        self.document.inner_markup(self.node)
    }

    pub fn to_markup(&self) -> String {
        self.document.node_markup(self.node)
    }

    /// Detached copy of the subtree.
    pub fn to_element(&self) -> Option<Element> {
        self.document.to_element(self.node)
    }

    /// Selector resolving to this element in the current snapshot.
    pub fn unique_selector(&self) -> Option<String> {
        unique_selector(self.document, self.node)
    }

    /// `tag[attr="value"]...`, not necessarily unique.
    pub fn selector(&self) -> Option<String> {
        selector_of(self.document, self.node)
    }

    pub fn parent(&self) -> Option<Self> {
        self.document.parent_element(self.node).map(|node| Self {
            document: self.document,
            node,
        })
    }

    pub fn children(&self) -> Vec<Self> {
        self.document
            .child_elements(self.node)
            .map(|node| Self {
                document: self.document,
                node,
            })
            .collect()
    }

    /// Descendants matching `query`.
    pub fn find_all(&self, query: &ElementQuery) -> Vec<Self> {
        self.document
            .find_all(self.node, query)
            .into_iter()
            .map(|node| Self {
                document: self.document,
                node,
            })
            .collect()
    }

    /// The selected `<option>` of a `<select>`.
    pub fn selected_option(&self) -> Option<Self> {
        self.document.selected_option(self.node).map(|node| Self {
            document: self.document,
            node,
        })
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        property(self.attribute("style")?, name)
    }

    pub fn width(&self) -> Option<String> {
        self.style_property("width")
    }

    pub fn height(&self) -> Option<String> {
        self.style_property("height")
    }
}

/// Mutable handle on one element; every change goes through the page.
pub struct ElementMut<'page, P: PageTree> {
    page: &'page mut P,
    node: NodeId,
}

impl<P: PageTree> ElementMut<'_, P> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn view(&self) -> ElementRef<'_> {
        ElementRef {
            document: self.page.document(),
            node: self.node,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.page.document().attribute(self.node, name)
    }

    pub fn value(&self) -> Option<&str> {
        self.attribute("value")
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<(), HtmlError> {
        self.page.apply(SetAttribute {
            node: self.node,
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn remove_attribute(&mut self, name: &str) -> Result<(), HtmlError> {
        self.page.apply(RemoveAttribute {
            node: self.node,
            name: name.to_owned(),
        })
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_id(&mut self, id: &str) -> Result<(), HtmlError> {
        self.set_attribute("id", id)
    }

    /// Existing id, or a freshly generated one sent to the client.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn ensure_id(&mut self) -> Result<String, HtmlError> {
        self.page.apply(EnsureId { node: self.node })?;
        self.attribute("id")
            .map(str::to_owned)
            .ok_or(HtmlError::NotAnElement)
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_value(&mut self, value: &str) -> Result<(), HtmlError> {
        self.set_attribute("value", value)
    }

    /// Replace the children with markup, literal text or a cloned element.
    ///
    /// # Errors
    /// [`HtmlError::Parse`] for malformed markup, [`HtmlError::NotAnElement`]
    /// if the element is gone.
    pub fn set_content(&mut self, content: impl Into<Content>) -> Result<(), HtmlError> {
        self.page.apply(SetContent {
            node: self.node,
            content: content.into(),
        })
    }

    /// Replace the children with escaped `text`.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_text(&mut self, text: &str) -> Result<(), HtmlError> {
        self.set_content(Content::Text(text.to_owned()))
    }

    /// # Errors
    /// As [`Self::set_content`].
    pub fn add_content(&mut self, content: impl Into<Content>) -> Result<(), HtmlError> {
        self.page.apply(AddContent {
            node: self.node,
            content: content.into(),
        })
    }

    /// Put a clone of `element` in this element's place. The handle is spent.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn replace_with(self, element: &Element) -> Result<(), HtmlError> {
        self.page.apply(ReplaceElement {
            node: self.node,
            element: element.clone(),
        })
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_style_property(&mut self, name: &str, value: &str) -> Result<(), HtmlError> {
        self.page.apply(SetStyleProperty {
            node: self.node,
            property: name.to_owned(),
            value: value.to_owned(),
        })
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_width(&mut self, value: &str) -> Result<(), HtmlError> {
        self.set_style_property("width", value)
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn set_height(&mut self, value: &str) -> Result<(), HtmlError> {
        self.set_style_property("height", value)
    }

    /// Make `event` call the server function `function` with `args`.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn on(
        &mut self,
        event: &str,
        function: &str,
        args: &[&str],
        style: ArgumentStyle,
    ) -> Result<(), HtmlError> {
        self.page.apply(SetHandler {
            node: self.node,
            event: event.to_owned(),
            function: function.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            style,
        })
    }

    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn onclick(
        &mut self,
        function: &str,
        args: &[&str],
        style: ArgumentStyle,
    ) -> Result<(), HtmlError> {
        self.on("click", function, args, style)
    }

    /// Ask the client to report the files picked in this file input.
    ///
    /// The answer is a separate `files` message; its files are handed to the
    /// next call that takes this element or accepts files.
    ///
    /// # Errors
    /// [`HtmlError::NotAnElement`] if the element is gone.
    pub fn request_files(&mut self, with_content: bool) -> Result<(), HtmlError> {
        self.page.apply(RequestFiles {
            node: self.node,
            with_content,
        })
    }
}

/// Setup-time page: template tree plus its function registry.
#[derive(Clone, Debug)]
pub struct Page {
    url: String,
    title: Option<String>,
    document: Document,
    functions: FunctionRegistry,
}

impl Page {
    /// An empty `<html></html>` page at `url`.
    ///
    /// # Errors
    /// Never fails for the built-in template; kept fallible like [`Self::from_markup`].
    pub fn new(url: &str) -> Result<Self, HtmlError> {
        Self::from_markup("<html></html>", url)
    }

    /// Page from template markup. Markup without an `<html>` element is
    /// wrapped in one.
    ///
    /// # Errors
    /// [`HtmlError::Parse`] for malformed markup.
    pub fn from_markup(markup: &str, url: &str) -> Result<Self, HtmlError> {
        let mut document = Document::parse(markup)?;
        if document.elements_matching(&ElementQuery::tag("html")).is_empty() {
            document = Document::parse(&format!("<html>{markup}</html>"))?;
        }
        Ok(Self {
            url: url.to_owned(),
            title: None,
            document,
            functions: FunctionRegistry::new(),
        })
    }

    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Register `callable` and add its client stub to the template.
    ///
    /// # Errors
    /// Only if the stub cannot be attached to the template.
    pub fn add_function(&mut self, callable: Callable) -> Result<(), HtmlError> {
        let name = callable.name().to_owned();
        if self.functions.register(callable) {
            self.expose_function(&name)?;
        }
        Ok(())
    }

    /// Working copy for one call, rebuilt from the client's `snapshot`.
    /// An empty snapshot falls back to the template tree.
    ///
    /// # Errors
    /// [`HtmlError::Parse`] for a malformed snapshot.
    pub fn working_copy(&self, snapshot: &str, uid: Option<&str>) -> Result<WorkingPage, HtmlError> {
        let document = if snapshot.trim().is_empty() {
            self.document.clone()
        } else {
            Document::parse(snapshot)?
        };
        Ok(WorkingPage {
            url: self.url.clone(),
            title: self.title.clone(),
            uid: uid.map(str::to_owned),
            document,
            queue: SignalQueue::new(),
        })
    }
}

impl PageTree for Page {
    fn url(&self) -> &str {
        &self.url
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn apply<M: Mutation>(&mut self, mutation: M) -> Result<(), HtmlError> {
        if let Some(instruction) = mutation.apply(&mut self.document)? {
            log::trace!("template {} dropped {}", self.url, instruction.func);
        }
        Ok(())
    }
}

/// Per-call page whose mutations are queued for the client.
#[derive(Debug)]
pub struct WorkingPage {
    url: String,
    title: Option<String>,
    uid: Option<String>,
    document: Document,
    queue: SignalQueue,
}

impl WorkingPage {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Desktop window the call came from.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn queue(&self) -> &SignalQueue {
        &self.queue
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) {
        self.queue.push(instruction);
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.queue.into_instructions()
    }
}

impl PageTree for WorkingPage {
    fn url(&self) -> &str {
        &self.url
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn apply<M: Mutation>(&mut self, mutation: M) -> Result<(), HtmlError> {
        if let Some(instruction) = mutation.apply(&mut self.document)? {
            self.queue.push(instruction);
        }
        Ok(())
    }
}

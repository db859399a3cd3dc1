//! Outbound replay instructions.

use crate::{MSG_NUM, ProtocolError, ops};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// What an instruction acts on. Not part of the wire format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    Page,
    Element,
}

/// One client replay command: `{"func": .., "args": [..], "kwargs": {..}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(skip)]
    pub target: Target,
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// `{"type": "element", "selector": ..}`, how elements travel as arguments.
pub fn element_ref(selector: &str) -> Value {
    json!({ "type": "element", "selector": selector })
}

/// The selector of an element reference, or `None` for any other value.
pub fn element_ref_selector(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.get("type").and_then(Value::as_str) != Some("element") {
        return None;
    }
    object.get("selector").and_then(Value::as_str)
}

impl Instruction {
    pub fn new(target: Target, func: &str) -> Self {
        Self {
            target,
            func: func.to_owned(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    #[must_use]
    pub fn with_kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    fn on_element(func: &str, selector: &str) -> Self {
        Self::new(Target::Element, func).with_kwarg("selector", selector)
    }

    pub fn set_attribute(selector: &str, name: &str, value: &str) -> Self {
        Self::on_element(ops::SET_ATTR, selector)
            .with_kwarg("name", name)
            .with_kwarg("value", value)
    }

    pub fn remove_attribute(selector: &str, name: &str) -> Self {
        Self::on_element(ops::DEL_ATTR, selector).with_kwarg("name", name)
    }

    pub fn set_content(selector: &str, content: &str) -> Self {
        Self::on_element(ops::SET_CONTENT, selector).with_kwarg("content", content)
    }

    pub fn add_content(selector: &str, content: &str) -> Self {
        Self::on_element(ops::ADD_CONTENT, selector).with_kwarg("content", content)
    }

    /// Swap the element's outer markup for `element`.
    pub fn replace_element(selector: &str, element: &str) -> Self {
        Self::on_element(ops::REPLACE_ELEMENT, selector).with_kwarg("element", element)
    }

    /// Replace the i-th match of `selectors` with the i-th entry of `elements`.
    pub fn replace_elements(selectors: &str, elements: Vec<String>) -> Self {
        Self::new(Target::Element, ops::REPLACE_ELEMENTS)
            .with_kwarg("selectors", selectors)
            .with_kwarg("elements", elements)
    }

    /// Ask the client for the files picked in a file input.
    pub fn request_files(selector: &str, with_content: bool) -> Self {
        Self::on_element(ops::GET_FILES, selector).with_kwarg("with_content", with_content)
    }

    /// Ask the client to stream an uploaded file back in chunks.
    pub fn save_file(file_id: &str, binary: bool) -> Self {
        Self::new(Target::Page, ops::SAVE_FILE)
            .with_kwarg("file-id", file_id)
            .with_kwarg("binary", binary)
    }

    pub fn set_document(doc: &str) -> Self {
        Self::new(Target::Page, ops::SET_DOC).with_kwarg("doc", doc)
    }

    pub fn add_script(script: &str) -> Self {
        Self::new(Target::Page, ops::ADD_SCRIPT).with_kwarg("script", script)
    }

    /// Open `url` in this tab, or a new one when `new` is set.
    pub fn go_to(url: &str, new: bool) -> Self {
        Self::new(Target::Page, ops::GO_TO)
            .with_kwarg("url", url)
            .with_kwarg("new", new)
    }

    pub fn set_key(key: &str, value: &str) -> Self {
        Self::new(Target::Page, ops::SET_KEY)
            .with_kwarg("key", key)
            .with_kwarg("value", value)
    }

    pub fn delete_key(key: &str) -> Self {
        Self::new(Target::Page, ops::DEL_KEY).with_kwarg("key", key)
    }

    /// Call a script function defined by the page itself.
    pub fn custom(func: &str, args: Vec<Value>) -> Self {
        Self {
            args,
            ..Self::new(Target::Page, func)
        }
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// The `selector` kwarg of an element instruction.
    pub fn selector(&self) -> Option<&str> {
        self.kwarg("selector").and_then(Value::as_str)
    }

    pub fn msg_num(&self) -> Option<u64> {
        self.kwarg(MSG_NUM).and_then(Value::as_u64)
    }

    /// Record the session message counter this instruction is sent under.
    pub fn stamp(&mut self, msg_num: u64) {
        self.kwargs.insert(MSG_NUM.to_owned(), Value::from(msg_num));
    }

    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

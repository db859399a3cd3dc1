use crate::HtmlError;
use crate::dom::printing::is_void;
use crate::dom::{Document, DomNode};
use crate::tree::Attributes;
use core::cell::RefCell;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{Doctype, Tag, TagKind, Token, TokenSink, TokenSinkResult};
use indextree::NodeId;
use log::debug;

/// Token sink that builds a [`Document`] exactly as written.
///
/// No tree-construction fixups are applied: nothing is implied, moved or
/// reparented, so printing the result gives back the input structure.
#[derive(Default)]
pub(crate) struct SnapshotSink {
    state: RefCell<SinkState>,
}

#[derive(Default)]
struct SinkState {
    document: Document,
    /// Stack of open elements with their tag names.
    open: Vec<(NodeId, String)>,
    /// First structural error; later tokens are ignored once set.
    error: Option<String>,
}

impl SinkState {
    fn current_parent(&self) -> NodeId {
        self.open
            .last()
            .map_or_else(|| self.document.root(), |(id, _)| *id)
    }

    fn start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        let attributes: Attributes = tag
            .attrs
            .iter()
            .map(|attr| (&*attr.name.local, &*attr.value))
            .collect();
        let parent = self.current_parent();
        let id = self
            .document
            .append_node(parent, DomNode::element(name.clone(), attributes));
        if tag.self_closing || is_void(&name) {
            return TokenSinkResult::Continue;
        }
        let result = match name.as_str() {
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "textarea" | "title" => TokenSinkResult::RawData(RawKind::Rcdata),
            "plaintext" => TokenSinkResult::Plaintext,
            _ => TokenSinkResult::Continue,
        };
        self.open.push((id, name));
        result
    }

    /// Close the innermost open element named `name`, along with anything
    /// opened inside it.
    fn end_tag(&mut self, name: &str) {
        if let Some(index) = self.open.iter().rposition(|(_, open)| open == name) {
            self.open.truncate(index);
        } else {
            self.error = Some(format!("end tag </{name}> closes no open element"));
        }
    }

    fn text(&mut self, text: &str) {
        let parent = self.current_parent();
        self.document
            .append_node(parent, DomNode::text(text.to_owned()));
    }

    fn comment(&mut self, text: &str) {
        let parent = self.current_parent();
        self.document
            .append_node(parent, DomNode::comment(text.to_owned()));
    }

    fn doctype(&mut self, doctype: &Doctype) {
        let name = doctype
            .name
            .as_ref()
            .map_or_else(|| String::from("html"), ToString::to_string);
        let parent = self.current_parent();
        self.document.append_node(parent, DomNode::doctype(name));
    }
}

/// Tokenizer states that mean input ended in the middle of a tag.
const TAG_STATES: [&str; 9] = [
    "TagOpen",
    "EndTagOpen",
    "TagName",
    "BeforeAttributeName",
    "AttributeName",
    "AfterAttributeName",
    "AttributeValue",
    "AfterAttributeValueQuoted",
    "SelfClosingStartTag",
];

/// Matches the tokenizer's `Saw EOF in state <State>` diagnostic for tag states.
fn is_eof_inside_tag(message: &str) -> bool {
    message
        .strip_prefix("Saw EOF in state ")
        .is_some_and(|state| TAG_STATES.iter().any(|tag_state| state.starts_with(tag_state)))
}

impl SnapshotSink {
    /// Take the built document, or the first structural error.
    pub(crate) fn finish(&self) -> Result<Document, HtmlError> {
        let state = self.state.take();
        if let Some(error) = state.error {
            return Err(HtmlError::Parse(error));
        }
        if !state.open.is_empty() {
            debug!(
                "closing {} element(s) left open at end of markup",
                state.open.len()
            );
        }
        Ok(state.document)
    }
}

impl TokenSink for SnapshotSink {
    type Handle = ();

    fn process_token(&self, token: Token, line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        if state.error.is_some() {
            return TokenSinkResult::Continue;
        }
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return state.start_tag(&tag),
                TagKind::EndTag => state.end_tag(&tag.name),
            },
            Token::CharacterTokens(text) => state.text(&text),
            Token::NullCharacterToken => state.text("\u{FFFD}"),
            Token::CommentToken(text) => state.comment(&text),
            Token::DoctypeToken(doctype) => state.doctype(&doctype),
            Token::EOFToken => {}
            Token::ParseError(message) if is_eof_inside_tag(&message) => {
                state.error = Some(format!("unterminated tag on line {line_number}"));
            }
            Token::ParseError(message) => {
                debug!("markup diagnostic on line {line_number}: {message}");
            }
        }
        TokenSinkResult::Continue
    }
}

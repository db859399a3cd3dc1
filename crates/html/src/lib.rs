//! Element trees for server-driven pages.
//!
//! Two representations live here:
//! - [`Element`]/[`Node`]: value-type trees with clone semantics, used for
//!   building content and for standalone parsing.
//! - [`Document`]: an arena tree reconstructed from a client snapshot, which
//!   knows parents and siblings and therefore can derive and resolve selectors.

#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod dom;
pub mod events;
pub mod parser;
pub mod query;
pub mod style;
pub mod tree;

use css_selectors::SelectorError;
use thiserror::Error;

pub use dom::{Document, NodeId, NodeKind};
pub use events::ArgumentStyle;
pub use query::{
    attribute_selector, id_selector, resolve, resolve_all, resolve_in_markup, selector_of,
    unique_selector,
};
pub use tree::{Attributes, Content, Element, ElementQuery, Node};

/// Errors raised by markup parsing, tree access and selector resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HtmlError {
    /// The markup could not be turned into a tree.
    #[error("malformed markup: {0}")]
    Parse(String),
    /// A selector matched nothing in the document.
    #[error("no element matches selector `{0}`")]
    ElementNotFound(String),
    /// A selector uses syntax outside the supported subset.
    #[error("invalid selector `{selector}`: {source}")]
    InvalidSelector {
        selector: String,
        #[source]
        source: SelectorError,
    },
    /// The node handle does not refer to a live element.
    #[error("node is not an element")]
    NotAnElement,
    /// Content that would print as different markup, such as `</script>`
    /// inside a script.
    #[error("content cannot be printed inside <{tag}>: {reason}")]
    Unprintable { tag: String, reason: String },
}

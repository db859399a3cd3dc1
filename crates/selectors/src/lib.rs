//! Selector text parsing and matching over an arbitrary element tree.
//! Grammar follows <https://www.w3.org/TR/selectors-3/>.
//!
//! This crate implements the subset needed to address elements inside a page
//! snapshot:
//! - Type, universal, class, id, `[attr]` and `[attr=value]` selectors
//! - `:nth-of-type(n)`, `:nth-child(n)`, `:first-child` and `:first-of-type`
//! - `:root`, an element without a parent element
//! - Combinators: descendant, child, adjacent sibling, general sibling
//! - Comma separated selector lists
//!
//! Matching is tree agnostic: implement [`ElementAdapter`] for your DOM layer.

mod matcher;
mod parser;

use thiserror::Error;

pub use matcher::{matches_complex, matches_compound, matches_selector_list};
pub use parser::{parse_complex_selector, parse_selector_list};

/// Read access to an element tree, as much as matching needs.
pub trait ElementAdapter {
    type Handle: Copy + Eq;

    /// `None` at the top element; the document node does not count.
    fn parent(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Previous sibling element, skipping text and comment nodes.
    fn previous_sibling_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Lowercase tag name.
    fn tag_name(&self, element: Self::Handle) -> &str;

    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;

    #[inline]
    fn element_id(&self, element: Self::Handle) -> Option<&str> {
        self.attr(element, "id")
    }

    /// Whitespace-separated token match on `class`.
    #[inline]
    fn has_class(&self, element: Self::Handle, class: &str) -> bool {
        self.attr(element, "class").is_some_and(|classes| {
            classes
                .split_ascii_whitespace()
                .any(|token| token == class)
        })
    }
}

/// One simple selector of the supported subset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Type(String),
    Class(String),
    IdSelector(String),
    AttrEquals { name: String, value: String },
    AttrExists(String),
    NthOfType(usize),
    NthChild(usize),
    /// `:root`
    Root,
    /// `*`
    Universal,
}

/// Simple selectors that must all hold for one element.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

impl CompoundSelector {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.simples.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

/// Compounds joined left to right; each entry of `rest` carries the
/// combinator linking it to the compound before it.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

/// `a, b, c`: matches when any item matches.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

/// Errors raised while parsing selector text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The selector (or one item of a list) contained nothing to match.
    #[error("empty selector")]
    Empty,
    /// A character that cannot start any supported selector token.
    #[error("unexpected character {found:?} at offset {position}")]
    Unexpected { position: usize, found: char },
    /// A combinator with no compound on one of its sides.
    #[error("dangling combinator at offset {position}")]
    DanglingCombinator { position: usize },
    /// An attribute selector that is not closed with `]`.
    #[error("unterminated attribute selector starting at offset {position}")]
    UnterminatedAttribute { position: usize },
    /// A pseudo-class outside of the supported subset.
    #[error("unsupported pseudo-class :{0}")]
    UnsupportedPseudo(String),
}

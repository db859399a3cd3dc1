//! Selector parsing.
//! See <https://www.w3.org/TR/selectors-3/>

use crate::{
    Combinator, ComplexSelector, CompoundSelector, SelectorError, SelectorList, SimpleSelector,
};
use core::mem::take;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Internal tokenizer token kinds.
pub enum Tok {
    /// A combinator token like child/adjacent/general sibling.
    Combinator(Combinator),
    /// Whitespace that implies a descendant combinator.
    DescendantWS,
    /// Separator between the items of a selector list.
    Comma,
    /// A simple selector token (type, class, id, attribute, pseudo-class, universal).
    Simple(SimpleSelector),
}

/// Tokenizer over a selector string.
pub struct SelectorTokenizer {
    /// Selector characters; escapes and non-ASCII identifiers need char access.
    input_chars: Vec<char>,
    /// Current cursor index into `input_chars`.
    index: usize,
}

impl SelectorTokenizer {
    /// Construct a tokenizer from input.
    #[inline]
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input_chars: input.chars().collect(),
            index: 0,
        }
    }

    /// Return the next selector token, if any.
    ///
    /// # Errors
    /// Returns a [`SelectorError`] when the input holds syntax outside the supported subset.
    #[inline]
    pub(crate) fn next(&mut self) -> Result<Option<Tok>, SelectorError> {
        if self.skip_whitespace_descendant() && self.peek().is_some() {
            return Ok(Some(Tok::DescendantWS));
        }
        let Some(current) = self.peek() else {
            return Ok(None);
        };
        let token = match current {
            '*' => {
                self.bump();
                Tok::Simple(SimpleSelector::Universal)
            }
            '.' => {
                self.bump();
                Tok::Simple(SimpleSelector::Class(self.require_ident()?))
            }
            '#' => {
                self.bump();
                Tok::Simple(SimpleSelector::IdSelector(self.require_ident()?))
            }
            '[' => self.consume_attr()?,
            ':' => self.consume_pseudo()?,
            '>' => {
                self.bump();
                Tok::Combinator(Combinator::Child)
            }
            '+' => {
                self.bump();
                Tok::Combinator(Combinator::AdjacentSibling)
            }
            '~' => {
                self.bump();
                Tok::Combinator(Combinator::GeneralSibling)
            }
            ',' => {
                self.bump();
                Tok::Comma
            }
            _ => {
                let ident = self.require_ident()?;
                Tok::Simple(SimpleSelector::Type(ident.to_ascii_lowercase()))
            }
        };
        Ok(Some(token))
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.input_chars.get(self.index).copied()
    }

    #[inline]
    fn bump(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    /// Skip whitespace; returns true when a descendant combinator may be implied.
    #[inline]
    fn skip_whitespace_descendant(&mut self) -> bool {
        let start = self.index;
        self.skip_spaces();
        self.index > start
    }

    /// Skip whitespace without producing a token.
    #[inline]
    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consume an identifier made of alphanumerics, '-', '_', non-ASCII and escaped characters.
    /// Case is preserved; only type selectors and attribute names are folded by the caller.
    fn consume_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(current) = self.peek() {
            if current.is_alphanumeric() || current == '-' || current == '_' || !current.is_ascii()
            {
                ident.push(current);
                self.bump();
            } else if current == '\\' {
                self.bump();
                self.consume_escape(&mut ident);
            } else {
                break;
            }
        }
        ident
    }

    /// Decode the escape following a backslash: up to six hex digits plus one
    /// optional whitespace, or any single character taken literally.
    fn consume_escape(&mut self, out: &mut String) {
        let mut hex = String::new();
        while hex.len() < 6 {
            let Some(digit) = self.peek().filter(char::is_ascii_hexdigit) else {
                break;
            };
            hex.push(digit);
            self.bump();
        }
        if hex.is_empty() {
            if let Some(literal) = self.peek() {
                out.push(literal);
                self.bump();
            }
            return;
        }
        let decoded = u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        out.push(decoded);
        if self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Like [`Self::consume_ident`] but fails on an empty identifier.
    fn require_ident(&mut self) -> Result<String, SelectorError> {
        let position = self.index;
        let ident = self.consume_ident();
        if ident.is_empty() {
            return Err(self.unexpected_at(position));
        }
        Ok(ident)
    }

    fn unexpected_at(&self, position: usize) -> SelectorError {
        self.input_chars.get(position).map_or(SelectorError::Empty, |&found| {
            SelectorError::Unexpected { position, found }
        })
    }

    /// Parse an attribute selector, supporting `[name]` and `[name=value]` (quoted or unquoted).
    fn consume_attr(&mut self) -> Result<Tok, SelectorError> {
        let start = self.index;
        // skip '['
        self.bump();
        self.skip_spaces();
        let name = self.require_ident()?.to_ascii_lowercase();
        self.skip_spaces();
        let token = match self.peek() {
            Some(']') => Tok::Simple(SimpleSelector::AttrExists(name)),
            Some('=') => {
                self.bump();
                self.skip_spaces();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        self.consume_quoted_attr_value(quote, start)?
                    }
                    _ => self.consume_unquoted_attr_value(),
                };
                self.skip_spaces();
                Tok::Simple(SimpleSelector::AttrEquals { name, value })
            }
            Some(_) => return Err(self.unexpected_at(self.index)),
            None => return Err(SelectorError::UnterminatedAttribute { position: start }),
        };
        if self.peek() != Some(']') {
            return Err(SelectorError::UnterminatedAttribute { position: start });
        }
        self.bump();
        Ok(token)
    }

    /// Consume an unquoted attribute value until whitespace or a closing bracket.
    fn consume_unquoted_attr_value(&mut self) -> String {
        let mut value = String::new();
        while let Some(current) = self.peek() {
            if current.is_whitespace() || current == ']' {
                break;
            }
            if current == '\\' {
                self.bump();
                self.consume_escape(&mut value);
            } else {
                value.push(current);
                self.bump();
            }
        }
        value
    }

    /// Consume a quoted attribute value until the matching quote character.
    fn consume_quoted_attr_value(
        &mut self,
        quote: char,
        start: usize,
    ) -> Result<String, SelectorError> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(SelectorError::UnterminatedAttribute { position: start }),
                Some(current) if current == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump();
                    self.consume_escape(&mut value);
                }
                Some(current) => {
                    value.push(current);
                    self.bump();
                }
            }
        }
    }

    /// Parse a pseudo-class from the supported positional subset.
    fn consume_pseudo(&mut self) -> Result<Tok, SelectorError> {
        // skip ':'
        self.bump();
        if self.peek() == Some(':') {
            self.bump();
            return Err(SelectorError::UnsupportedPseudo(format!(
                ":{}",
                self.consume_ident()
            )));
        }
        let name = self.require_ident()?.to_ascii_lowercase();
        let simple = match name.as_str() {
            "first-child" => SimpleSelector::NthChild(1),
            "first-of-type" => SimpleSelector::NthOfType(1),
            "root" => SimpleSelector::Root,
            "nth-child" => SimpleSelector::NthChild(self.consume_index_argument()?),
            "nth-of-type" => SimpleSelector::NthOfType(self.consume_index_argument()?),
            _ => return Err(SelectorError::UnsupportedPseudo(name)),
        };
        Ok(Tok::Simple(simple))
    }

    /// Parse `(n)` where n is a positive integer.
    fn consume_index_argument(&mut self) -> Result<usize, SelectorError> {
        if self.peek() != Some('(') {
            return Err(self.unexpected_at(self.index));
        }
        self.bump();
        self.skip_spaces();
        let digits_start = self.index;
        let mut digits = String::new();
        while let Some(digit) = self.peek().filter(char::is_ascii_digit) {
            digits.push(digit);
            self.bump();
        }
        let index = digits
            .parse::<usize>()
            .ok()
            .filter(|&parsed| parsed > 0)
            .ok_or_else(|| self.unexpected_at(digits_start))?;
        self.skip_spaces();
        if self.peek() != Some(')') {
            return Err(self.unexpected_at(self.index));
        }
        self.bump();
        Ok(index)
    }
}

/// Accumulates compounds and combinators for one complex selector.
#[derive(Default)]
struct ComplexBuilder {
    /// Left-most compound once closed.
    first: Option<CompoundSelector>,
    /// Closed compounds to the right of `first`.
    rest: Vec<(Combinator, CompoundSelector)>,
    /// Compound currently being filled.
    current: CompoundSelector,
    /// Combinator that links `current` to the previously closed compound.
    link: Option<Combinator>,
    /// Combinator seen after `current`, waiting for the next compound.
    pending: Option<Combinator>,
    /// Position of the last explicit combinator, for error reporting.
    pending_position: usize,
}

impl ComplexBuilder {
    fn push_simple(&mut self, simple: SimpleSelector) {
        if let Some(combinator) = self.pending.take() {
            self.close_current();
            self.link = Some(combinator);
        }
        self.current.simples.push(simple);
    }

    fn close_current(&mut self) {
        let compound = take(&mut self.current);
        match self.link.take() {
            Some(combinator) => self.rest.push((combinator, compound)),
            None => self.first = Some(compound),
        }
    }

    fn push_whitespace(&mut self) {
        if !self.current.is_empty() && self.pending.is_none() {
            self.pending = Some(Combinator::Descendant);
        }
    }

    fn push_combinator(
        &mut self,
        combinator: Combinator,
        position: usize,
    ) -> Result<(), SelectorError> {
        let explicit_pending = self
            .pending
            .is_some_and(|pending| pending != Combinator::Descendant);
        if self.current.is_empty() || explicit_pending {
            return Err(SelectorError::DanglingCombinator { position });
        }
        self.pending = Some(combinator);
        self.pending_position = position;
        Ok(())
    }

    fn finish(mut self) -> Result<ComplexSelector, SelectorError> {
        match self.pending {
            Some(Combinator::Descendant) | None => {}
            Some(_) => {
                return Err(SelectorError::DanglingCombinator {
                    position: self.pending_position,
                });
            }
        }
        if self.current.is_empty() {
            return Err(SelectorError::Empty);
        }
        self.close_current();
        Ok(ComplexSelector {
            first: self.first.unwrap_or_default(),
            rest: self.rest,
        })
    }
}

/// Parse a selector list from selector text.
///
/// # Errors
/// Returns a [`SelectorError`] when any item is empty or uses unsupported syntax.
pub fn parse_selector_list(input: &str) -> Result<SelectorList, SelectorError> {
    let mut tokens = SelectorTokenizer::new(input);
    let mut list = SelectorList::default();
    let mut builder = ComplexBuilder::default();
    loop {
        let position = tokens.index;
        match tokens.next()? {
            None => break,
            Some(Tok::Comma) => list.selectors.push(take(&mut builder).finish()?),
            Some(Tok::DescendantWS) => builder.push_whitespace(),
            Some(Tok::Combinator(combinator)) => builder.push_combinator(combinator, position)?,
            Some(Tok::Simple(simple)) => builder.push_simple(simple),
        }
    }
    list.selectors.push(builder.finish()?);
    Ok(list)
}

/// Parse one complex selector; a comma separated list is rejected.
///
/// # Errors
/// Returns a [`SelectorError`] for empty input, lists, or unsupported syntax.
pub fn parse_complex_selector(input: &str) -> Result<ComplexSelector, SelectorError> {
    let mut list = parse_selector_list(input)?;
    if list.selectors.len() > 1 {
        let position = input.chars().position(|current| current == ',').unwrap_or(0);
        return Err(SelectorError::Unexpected {
            position,
            found: ',',
        });
    }
    list.selectors.pop().ok_or(SelectorError::Empty)
}

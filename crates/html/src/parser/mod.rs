//! Markup parsing on top of the html5ever tokenizer.
//!
//! The tree builder is deliberately not used: it would insert `<html>`,
//! `<head>` and `<tbody>` and move misplaced nodes, which breaks the
//! guarantee that parsing printed markup gives back the same tree.

mod sink;

use crate::HtmlError;
use crate::dom::Document;
use crate::tree::Node;
use html5ever::tendril::StrTendril;
use html5ever::TokenizerResult;
use html5ever::tokenizer::{BufferQueue, Tokenizer, TokenizerOpts};
use sink::SnapshotSink;

/// Parse a full document snapshot.
///
/// # Errors
/// Returns [`HtmlError::Parse`] when an end tag closes no open element or the
/// markup ends inside a tag.
pub fn parse_document(html: &str) -> Result<Document, HtmlError> {
    let opts = TokenizerOpts {
        exact_errors: false,
        ..TokenizerOpts::default()
    };
    let tokenizer = Tokenizer::new(SnapshotSink::default(), opts);
    let queue = BufferQueue::default();
    queue.push_back(StrTendril::from_slice(html));
    loop {
        if matches!(tokenizer.feed(&queue), TokenizerResult::Done) {
            break;
        }
    }
    tokenizer.end();
    tokenizer.sink.finish()
}

/// Parse a fragment into its top-level nodes. Doctypes are dropped.
///
/// # Errors
/// Returns [`HtmlError::Parse`] when an end tag closes no open element.
pub fn parse_fragment(html: &str) -> Result<Vec<Node>, HtmlError> {
    Ok(parse_document(html)?.to_nodes())
}

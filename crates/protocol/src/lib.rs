//! JSON wire format spoken between a page's client script and the server.
//!
//! Inbound traffic is a [`Message`] tagged by its `type` field. Outbound
//! traffic is a stream of [`Instruction`]s that the client replays in order.

#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod instruction;
pub mod ops;
pub mod wire;

use thiserror::Error;

pub use instruction::{Instruction, Target, element_ref, element_ref_selector};
pub use wire::{ChunkData, FileChunk, FileMetadata, FilesBatch, Message, PageCall, parse_message};

/// Kwarg carrying the per-session message counter.
pub const MSG_NUM: &str = "msg-num";

/// Errors raised while decoding inbound or encoding outbound messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or JSON that does not fit the message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The message object has no string `type` field.
    #[error("message has no `type` field")]
    MissingType,
    /// The `type` field names no known message kind.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
}

//! Inbound messages and file transfer payloads.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → server message, discriminated by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// A server function call carrying the page snapshot.
    #[serde(rename = "page")]
    Page(PageCall),
    /// Metadata of files picked in a file input.
    #[serde(rename = "files")]
    Files(FilesBatch),
    /// One chunk of a file being streamed to the server.
    #[serde(rename = "save files")]
    SaveFiles(FileChunk),
}

impl Message {
    /// The per-session counter the message answers, if any.
    pub fn msg_num(&self) -> Option<u64> {
        match self {
            Self::Page(call) => call.msg_num,
            Self::Files(batch) => batch.msg_num,
            Self::SaveFiles(chunk) => chunk.msg_num,
        }
    }

    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode one inbound message.
///
/// # Errors
/// [`ProtocolError::Malformed`] for invalid JSON or a bad shape,
/// [`ProtocolError::MissingType`] / [`ProtocolError::UnknownType`] when the
/// `type` field is absent or unrecognised.
pub fn parse_message(raw: &str) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    match value.get("type").and_then(Value::as_str) {
        None => Err(ProtocolError::MissingType),
        Some("page" | "files" | "save files") => Ok(serde_json::from_value(value)?),
        Some(other) => Err(ProtocolError::UnknownType(other.to_owned())),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PageCall {
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    /// Set by the client when some argument is an element reference.
    #[serde(default)]
    pub selector_to_element: bool,
    #[serde(default)]
    pub url: Option<String>,
    /// Snapshot of the client document.
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_num: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesBatch {
    #[serde(alias = "data", default)]
    pub files: Vec<FileMetadata>,
    #[serde(rename = "msg-num", default, skip_serializing_if = "Option::is_none")]
    pub msg_num: Option<u64>,
}

/// What the client reports about one picked file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileMetadata {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub file_type: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: u64,
    /// Selector of the file input the file was picked in.
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub file_id: String,
    /// Inline text content, when requested with the metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Chunk payload: text for text transfers, a byte array for binary ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkData {
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ChunkData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// One piece of a streamed file. `end` closes the transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileChunk {
    #[serde(default)]
    pub data: ChunkData,
    #[serde(default)]
    pub end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_num: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl FileChunk {
    /// Wire form, including the `"type": "save files"` tag.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Message::SaveFiles(self.clone()).to_json()
    }
}

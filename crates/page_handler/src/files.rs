//! Uploaded files, chunked transfer assembly, and outbound chunking.

use bytes::{Bytes, BytesMut};
use core::time::Duration;
use protocol::{ChunkData, FileChunk, FileMetadata};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no open transfer `{0}`")]
    UnknownTransfer(String),
    #[error("transfer `{0}` is already open")]
    AlreadyOpen(String),
    /// The transfer was aborted when it grew past the configured limit.
    #[error("transfer `{file_id}` exceeds the {limit} byte limit")]
    TooLarge { file_id: String, limit: usize },
    #[error("file name `{0}` cannot be used on disk")]
    InvalidName(String),
    #[error("could not write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A file the client picked in a file input, as announced by a `files` message.
///
/// Only metadata is known (plus inline text when requested); the content
/// arrives separately through a save transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    metadata: FileMetadata,
    msg_num: Option<u64>,
}

impl UploadedFile {
    pub fn new(metadata: FileMetadata, msg_num: Option<u64>) -> Self {
        Self { metadata, msg_num }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Size declared by the client.
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// MIME type.
    pub fn file_type(&self) -> &str {
        &self.metadata.file_type
    }

    /// Milliseconds since the Unix epoch.
    pub fn last_modified(&self) -> u64 {
        self.metadata.last_modified
    }

    /// Selector of the file input, as derived by the client.
    pub fn selector(&self) -> &str {
        &self.metadata.selector
    }

    pub fn file_id(&self) -> &str {
        &self.metadata.file_id
    }

    pub fn content(&self) -> Option<&str> {
        self.metadata.content.as_deref()
    }

    /// The `files` message this file arrived with.
    pub fn msg_num(&self) -> Option<u64> {
        self.msg_num
    }
}

#[derive(Debug)]
struct Transfer {
    metadata: FileMetadata,
    buffer: BytesMut,
    binary: bool,
    /// When the transfer was opened or last received a chunk.
    touched: Instant,
}

/// Open transfers keyed by file id. Chunks apply in arrival order.
#[derive(Debug)]
pub struct FileAssembler {
    transfers: HashMap<String, Transfer>,
    max_bytes: usize,
}

impl FileAssembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            transfers: HashMap::new(),
            max_bytes,
        }
    }

    /// # Errors
    /// [`TransferError::AlreadyOpen`] if `file_id` is already being assembled.
    pub fn begin(&mut self, file_id: &str, metadata: FileMetadata) -> Result<(), TransferError> {
        if self.transfers.contains_key(file_id) {
            return Err(TransferError::AlreadyOpen(file_id.to_owned()));
        }
        log::debug!("transfer {file_id} opened for {}", metadata.name);
        self.transfers.insert(
            file_id.to_owned(),
            Transfer {
                metadata,
                buffer: BytesMut::new(),
                binary: false,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    /// Append one chunk, returning the bytes assembled so far.
    ///
    /// # Errors
    /// [`TransferError::UnknownTransfer`] for an id that is not open;
    /// [`TransferError::TooLarge`] when the limit is crossed, which also
    /// aborts the transfer.
    pub fn append(&mut self, file_id: &str, data: &ChunkData) -> Result<usize, TransferError> {
        let limit = self.max_bytes;
        let transfer = self
            .transfers
            .get_mut(file_id)
            .ok_or_else(|| TransferError::UnknownTransfer(file_id.to_owned()))?;
        let total = transfer.buffer.len().saturating_add(data.len());
        if total > limit {
            self.transfers.remove(file_id);
            log::warn!("transfer {file_id} aborted past {limit} bytes");
            return Err(TransferError::TooLarge {
                file_id: file_id.to_owned(),
                limit,
            });
        }
        transfer.binary |= matches!(data, ChunkData::Bytes(_));
        transfer.buffer.extend_from_slice(data.as_bytes());
        transfer.touched = Instant::now();
        Ok(total)
    }

    /// Close the transfer and hand out the assembled file.
    ///
    /// # Errors
    /// [`TransferError::UnknownTransfer`] if `file_id` was never begun.
    pub fn end(&mut self, file_id: &str) -> Result<AssembledFile, TransferError> {
        let transfer = self
            .transfers
            .remove(file_id)
            .ok_or_else(|| TransferError::UnknownTransfer(file_id.to_owned()))?;
        log::debug!(
            "transfer {file_id} complete, {} bytes",
            transfer.buffer.len()
        );
        Ok(AssembledFile {
            metadata: transfer.metadata,
            content: transfer.buffer.freeze(),
            binary: transfer.binary,
        })
    }

    /// Drop an open transfer. Returns whether it existed.
    pub fn abort(&mut self, file_id: &str) -> bool {
        self.transfers.remove(file_id).is_some()
    }

    /// Ids of open transfers that received nothing for at least `ttl` before `now`.
    pub fn idle(&self, now: Instant, ttl: Duration) -> Vec<String> {
        self.transfers
            .iter()
            .filter(|(_, transfer)| now.saturating_duration_since(transfer.touched) >= ttl)
            .map(|(file_id, _)| file_id.clone())
            .collect()
    }

    pub fn is_open(&self, file_id: &str) -> bool {
        self.transfers.contains_key(file_id)
    }

    pub fn open_count(&self) -> usize {
        self.transfers.len()
    }

    /// The id of the only open transfer, if exactly one is open.
    pub fn single_active(&self) -> Option<&str> {
        let mut ids = self.transfers.keys();
        match (ids.next(), ids.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }
}

/// A completely received file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledFile {
    metadata: FileMetadata,
    content: Bytes,
    binary: bool,
}

impl AssembledFile {
    pub fn new(metadata: FileMetadata, content: impl Into<Bytes>, binary: bool) -> Self {
        Self {
            metadata,
            content: content.into(),
            binary,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    /// Content as text, unless binary chunks were received or it is not UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        if self.binary {
            return None;
        }
        core::str::from_utf8(&self.content).ok()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// # Errors
    /// Propagates write errors from `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.content)?;
        writer.flush()
    }

    /// Write the content into `dir` under the file's base name.
    ///
    /// # Errors
    /// [`TransferError::InvalidName`] when the name has no usable final
    /// component, [`TransferError::Io`] when writing fails.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, TransferError> {
        let file_name = Path::new(&self.metadata.name)
            .file_name()
            .ok_or_else(|| TransferError::InvalidName(self.metadata.name.clone()))?;
        let path = dir.join(file_name);
        fs::write(&path, &self.content).map_err(|source| TransferError::Io {
            path: path.clone(),
            source,
        })?;
        log::info!("saved {} ({} bytes)", path.display(), self.content.len());
        Ok(path)
    }

    /// Lazily split into payloads of at most `size` bytes, followed by an
    /// empty `end=true` marker. Text is never split inside a character.
    pub fn chunks(&self, size: usize) -> Chunks<'_> {
        Chunks {
            file: self,
            text: self.as_text(),
            offset: 0,
            size: size.max(1),
            finished: false,
        }
    }
}

/// Iterator returned by [`AssembledFile::chunks`].
#[derive(Debug)]
pub struct Chunks<'file> {
    file: &'file AssembledFile,
    text: Option<&'file str>,
    offset: usize,
    size: usize,
    finished: bool,
}

impl Chunks<'_> {
    fn payload(&self, data: ChunkData, end: bool) -> FileChunk {
        let file_id = &self.file.metadata.file_id;
        FileChunk {
            data,
            end,
            msg_num: None,
            file_id: (!file_id.is_empty()).then(|| file_id.clone()),
        }
    }

    fn next_boundary(&self, len: usize) -> usize {
        let mut end = self.offset.saturating_add(self.size).min(len);
        if let Some(text) = self.text {
            while end > self.offset && !text.is_char_boundary(end) {
                end -= 1;
            }
            if end == self.offset {
                end = self.offset.saturating_add(1);
                while end < len && !text.is_char_boundary(end) {
                    end += 1;
                }
            }
        }
        end
    }
}

impl Iterator for Chunks<'_> {
    type Item = FileChunk;

    fn next(&mut self) -> Option<FileChunk> {
        if self.finished {
            return None;
        }
        let len = self.file.content.len();
        if self.offset >= len {
            self.finished = true;
            let empty = if self.text.is_some() {
                ChunkData::Text(String::new())
            } else {
                ChunkData::Bytes(Vec::new())
            };
            return Some(self.payload(empty, true));
        }
        let end = self.next_boundary(len);
        let data = match self.text {
            Some(text) => ChunkData::Text(text.get(self.offset..end).unwrap_or_default().to_owned()),
            None => ChunkData::Bytes(
                self.file
                    .content
                    .get(self.offset..end)
                    .unwrap_or_default()
                    .to_vec(),
            ),
        };
        self.offset = end;
        Some(self.payload(data, false))
    }
}

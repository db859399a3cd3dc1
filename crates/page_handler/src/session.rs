//! Per-client state: message counter, user variables, pending uploads and
//! save transfers.

use crate::DispatchError;
use crate::config::AppConfig;
use crate::files::{AssembledFile, FileAssembler, TransferError, UploadedFile};
use core::fmt;
use core::time::Duration;
use protocol::{FileChunk, FilesBatch, Instruction, ops};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tokio::sync::oneshot;

/// Per-session variables, seeded from the app defaults.
pub type UserVars = Map<String, Value>;

/// Runs once a save transfer completes, with the session it arrived on.
pub type SaveCallback = Box<dyn FnOnce(AssembledFile, &mut Session) + Send>;

#[derive(Debug)]
struct PendingBatch {
    files: Vec<UploadedFile>,
    received: Instant,
}

/// Who gets a file once its transfer completes.
enum SaveTarget {
    Channel(oneshot::Sender<AssembledFile>),
    Callback(SaveCallback),
}

impl fmt::Debug for SaveTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(_) => formatter.write_str("Channel"),
            Self::Callback(_) => formatter.write_str("Callback"),
        }
    }
}

/// Where a save chunk ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub file_id: String,
    /// The chunk closed the transfer and the file was handed out.
    pub complete: bool,
}

/// State owned by one connection (or one desktop window).
///
/// Nothing here is shared between sessions.
#[derive(Debug)]
pub struct Session {
    uid: Option<String>,
    msg_num: u64,
    vars: UserVars,
    /// Whether `vars` was seeded from the app defaults yet.
    seeded: bool,
    pending: Vec<PendingBatch>,
    assembler: FileAssembler,
    saves: HashMap<String, SaveTarget>,
    /// Message number a `_saveFile` went out under, to its file id.
    transfers: HashMap<u64, String>,
    max_pending_files: usize,
    pending_ttl: Duration,
    transfer_ttl: Duration,
}

impl Session {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            uid: None,
            msg_num: 0,
            vars: Map::new(),
            seeded: false,
            pending: Vec::new(),
            assembler: FileAssembler::new(config.max_transfer_bytes),
            saves: HashMap::new(),
            transfers: HashMap::new(),
            max_pending_files: config.max_pending_files,
            pending_ttl: config.pending_ttl(),
            transfer_ttl: config.transfer_ttl(),
        }
    }

    /// A session bound to a desktop window.
    pub fn for_window(config: &AppConfig, uid: &str) -> Self {
        Self {
            uid: Some(uid.to_owned()),
            ..Self::new(config)
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Fill in `defaults` the first time this is called. Values already set on
    /// the session are kept.
    pub fn seed_user_vars(&mut self, defaults: &UserVars) {
        if self.seeded {
            return;
        }
        self.seeded = true;
        log::debug!("session variables created from {} default(s)", defaults.len());
        for (name, value) in defaults {
            self.vars
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Variables of this session.
    pub fn user_vars(&self) -> &UserVars {
        &self.vars
    }

    pub fn user_vars_mut(&mut self) -> &mut UserVars {
        &mut self.vars
    }

    /// Number of the last message sent.
    pub fn msg_num(&self) -> u64 {
        self.msg_num
    }

    /// Stamp outgoing instructions with consecutive message numbers.
    pub fn flush(&mut self, instructions: Vec<Instruction>) -> Vec<Instruction> {
        instructions
            .into_iter()
            .map(|mut instruction| {
                self.msg_num = self.msg_num.saturating_add(1);
                instruction.stamp(self.msg_num);
                if instruction.func == ops::SAVE_FILE
                    && let Some(file_id) = instruction.kwarg("file-id").and_then(Value::as_str)
                {
                    self.transfers.insert(self.msg_num, file_id.to_owned());
                }
                log::debug!("SENT {} #{}", instruction.func, self.msg_num);
                instruction
            })
            .collect()
    }

    /// Buffer the files of a `files` message until a page call consumes them.
    ///
    /// # Errors
    /// [`DispatchError::TooManyPendingFiles`] when the batch would exceed the
    /// per-session limit; nothing is buffered then.
    pub fn register_files(&mut self, batch: FilesBatch) -> Result<usize, DispatchError> {
        let count = batch.files.len();
        if self.pending_file_count().saturating_add(count) > self.max_pending_files {
            return Err(DispatchError::TooManyPendingFiles {
                limit: self.max_pending_files,
            });
        }
        let msg_num = batch.msg_num;
        self.pending.push(PendingBatch {
            files: batch
                .files
                .into_iter()
                .map(|metadata| UploadedFile::new(metadata, msg_num))
                .collect(),
            received: Instant::now(),
        });
        Ok(count)
    }

    pub fn pending_file_count(&self) -> usize {
        self.pending.iter().map(|batch| batch.files.len()).sum()
    }

    /// Files announced by the `files` message numbered `msg_num`.
    pub fn pending_files(&self, msg_num: u64) -> Vec<&UploadedFile> {
        self.pending
            .iter()
            .flat_map(|batch| &batch.files)
            .filter(|file| file.msg_num() == Some(msg_num))
            .collect()
    }

    /// Remove and return the pending files `keep` selects, oldest first.
    pub fn take_files_where<F>(&mut self, mut keep: F) -> Vec<UploadedFile>
    where
        F: FnMut(&UploadedFile) -> bool,
    {
        let mut taken = Vec::new();
        for batch in &mut self.pending {
            let (selected, rest): (Vec<_>, Vec<_>) =
                batch.files.drain(..).partition(&mut keep);
            taken.extend(selected);
            batch.files = rest;
        }
        self.pending.retain(|batch| !batch.files.is_empty());
        taken
    }

    pub fn take_all_files(&mut self) -> Vec<UploadedFile> {
        self.take_files_where(|_| true)
    }

    /// Drop pending batches older than the configured lifetime, and abandon
    /// save transfers idle for longer than theirs. Waiting receivers see the
    /// channel close.
    /// Returns the number of files and transfers discarded.
    pub fn discard_stale(&mut self, now: Instant) -> usize {
        let ttl = self.pending_ttl;
        let before = self.pending_file_count();
        self.pending
            .retain(|batch| now.saturating_duration_since(batch.received) < ttl);
        let discarded = before.saturating_sub(self.pending_file_count());
        if discarded > 0 {
            log::debug!("discarded {discarded} stale uploaded files");
        }
        let idle = self.assembler.idle(now, self.transfer_ttl);
        for file_id in &idle {
            log::warn!("save transfer {file_id} abandoned after {:?} idle", self.transfer_ttl);
            self.forget_transfer(file_id);
        }
        discarded.saturating_add(idle.len())
    }

    /// Open a transfer for `file` and return where the assembled file will land.
    ///
    /// # Errors
    /// [`TransferError::AlreadyOpen`] if a save for this file is in progress.
    pub fn request_save(
        &mut self,
        file: &UploadedFile,
    ) -> Result<oneshot::Receiver<AssembledFile>, TransferError> {
        let (sender, receiver) = oneshot::channel();
        self.open_save(file, SaveTarget::Channel(sender))?;
        Ok(receiver)
    }

    /// Open a transfer for `file` and run `on_complete` when its last chunk
    /// arrives. Nothing runs if the transfer is aborted or expires.
    ///
    /// # Errors
    /// [`TransferError::AlreadyOpen`] if a save for this file is in progress.
    pub fn request_save_with<F>(
        &mut self,
        file: &UploadedFile,
        on_complete: F,
    ) -> Result<(), TransferError>
    where
        F: FnOnce(AssembledFile, &mut Self) + Send + 'static,
    {
        self.open_save(file, SaveTarget::Callback(Box::new(on_complete)))
    }

    fn open_save(&mut self, file: &UploadedFile, target: SaveTarget) -> Result<(), TransferError> {
        self.assembler.begin(file.file_id(), file.metadata().clone())?;
        self.saves.insert(file.file_id().to_owned(), target);
        Ok(())
    }

    /// Feed one `save files` chunk to its transfer.
    ///
    /// The transfer is the chunk's explicit `file-id`, else the one whose
    /// `_saveFile` went out under the chunk's `msg-num`, else the only open one.
    ///
    /// # Errors
    /// [`TransferError::UnknownTransfer`] if no transfer can be found;
    /// [`TransferError::TooLarge`] aborts the transfer and its receiver.
    pub fn receive_chunk(&mut self, chunk: FileChunk) -> Result<ChunkReceipt, TransferError> {
        let file_id = self.transfer_for(&chunk)?;
        if let Err(err) = self.assembler.append(&file_id, &chunk.data) {
            self.forget_transfer(&file_id);
            return Err(err);
        }
        if !chunk.end {
            return Ok(ChunkReceipt {
                file_id,
                complete: false,
            });
        }
        let file = self.assembler.end(&file_id)?;
        let target = self.saves.remove(&file_id);
        self.forget_transfer(&file_id);
        match target {
            Some(SaveTarget::Channel(sender)) => {
                if sender.send(file).is_err() {
                    log::debug!("nobody is waiting for transfer {file_id}");
                }
            }
            Some(SaveTarget::Callback(on_complete)) => {
                let ran = panic::catch_unwind(AssertUnwindSafe(|| on_complete(file, self)));
                if ran.is_err() {
                    log::error!("completion handler of transfer {file_id} panicked");
                }
            }
            None => log::debug!("transfer {file_id} completed with no recipient"),
        }
        Ok(ChunkReceipt {
            file_id,
            complete: true,
        })
    }

    pub fn open_transfers(&self) -> usize {
        self.assembler.open_count()
    }

    fn transfer_for(&self, chunk: &FileChunk) -> Result<String, TransferError> {
        if let Some(file_id) = &chunk.file_id {
            return Ok(file_id.clone());
        }
        chunk
            .msg_num
            .and_then(|msg_num| self.transfers.get(&msg_num).cloned())
            .or_else(|| self.assembler.single_active().map(str::to_owned))
            .ok_or_else(|| {
                TransferError::UnknownTransfer(
                    chunk
                        .msg_num
                        .map_or_else(|| String::from("<unaddressed>"), |num| format!("#{num}")),
                )
            })
    }

    fn forget_transfer(&mut self, file_id: &str) {
        self.assembler.abort(file_id);
        self.saves.remove(file_id);
        self.transfers.retain(|_, id| id != file_id);
    }
}

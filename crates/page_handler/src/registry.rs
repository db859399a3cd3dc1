//! Server functions callable from the page, and what they receive.

use crate::app::App;
use crate::files::{AssembledFile, TransferError, UploadedFile};
use crate::page::WorkingPage;
use crate::session::{Session, UserVars};
use core::fmt;
use html::NodeId;
use protocol::Instruction;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Signature of a server function.
pub type Handler = dyn Fn(&mut CallContext<'_>, CallArgs) -> anyhow::Result<()> + Send + Sync;

/// One resolved argument.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    /// A plain JSON value, passed through as sent.
    Value(Value),
    /// An element reference resolved against the snapshot, with any
    /// uploaded files that were picked in it.
    Element {
        node: NodeId,
        files: Vec<UploadedFile>,
    },
    /// Pending uploads handed to a function that accepts files.
    Files(Vec<UploadedFile>),
}

impl CallArg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Element { .. } | Self::Files(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Numbers, or strings that parse as numbers (form values arrive as text).
    pub fn as_f64(&self) -> Option<f64> {
        let value = self.as_value()?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
    }

    pub fn element(&self) -> Option<NodeId> {
        match self {
            Self::Element { node, .. } => Some(*node),
            Self::Value(_) | Self::Files(_) => None,
        }
    }

    pub fn files(&self) -> &[UploadedFile] {
        match self {
            Self::Element { files, .. } | Self::Files(files) => files,
            Self::Value(_) => &[],
        }
    }
}

/// Arguments of one call: bound and runtime positionals, then named ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<CallArg>,
    named: BTreeMap<String, CallArg>,
}

impl CallArgs {
    pub fn new(positional: Vec<CallArg>, named: BTreeMap<String, CallArg>) -> Self {
        Self { positional, named }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CallArg> {
        self.positional.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallArg> {
        self.positional.iter()
    }

    pub fn named(&self, name: &str) -> Option<&CallArg> {
        self.named.get(name)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(CallArg::as_str)
    }

    pub fn f64(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(CallArg::as_f64)
    }

    pub fn element(&self, index: usize) -> Option<NodeId> {
        self.get(index).and_then(CallArg::element)
    }

    /// The trailing file list given to functions that accept files.
    pub fn files(&self) -> &[UploadedFile] {
        match self.positional.last() {
            Some(CallArg::Files(files)) => files,
            _ => &[],
        }
    }
}

/// A registered server function with its calling convention.
#[derive(Clone)]
pub struct Callable {
    name: String,
    handler: Arc<Handler>,
    arity: Option<usize>,
    accepts_files: bool,
    leading: Vec<Value>,
    trailing: Vec<Value>,
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("accepts_files", &self.accepts_files)
            .field("leading", &self.leading)
            .field("trailing", &self.trailing)
            .finish_non_exhaustive()
    }
}

impl Callable {
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, CallArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_owned(),
            handler: Arc::new(handler),
            arity: None,
            accepts_files: false,
            leading: Vec::new(),
            trailing: Vec::new(),
        }
    }

    /// Require exactly `arity` positional arguments, bound ones included.
    #[must_use]
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Receive pending uploaded files as a trailing [`CallArg::Files`].
    #[must_use]
    pub fn accepting_files(mut self) -> Self {
        self.accepts_files = true;
        self
    }

    /// Arguments placed before the ones sent by the client.
    #[must_use]
    pub fn bind_leading(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.leading.extend(args);
        self
    }

    /// Arguments placed after the ones sent by the client.
    #[must_use]
    pub fn bind_trailing(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.trailing.extend(args);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn accepts_files(&self) -> bool {
        self.accepts_files
    }

    pub fn leading(&self) -> &[Value] {
        &self.leading
    }

    pub fn trailing(&self) -> &[Value] {
        &self.trailing
    }

    pub(crate) fn invoke(&self, context: &mut CallContext<'_>, args: CallArgs) -> anyhow::Result<()> {
        (self.handler)(context, args)
    }
}

/// Name → callable map, populated at setup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Callable>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callable`, replacing any function of the same name.
    /// Returns `true` if the name was new.
    pub fn register(&mut self, callable: Callable) -> bool {
        let name = callable.name().to_owned();
        if name.starts_with('_') {
            log::warn!(
                "function `{name}` starts with '_' and may collide with client routines"
            );
        }
        let replaced = self.functions.insert(name.clone(), callable).is_some();
        if replaced {
            log::warn!("function `{name}` was already registered and has been replaced");
        }
        !replaced
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// What a server function sees while it runs: the working page of the
/// current call, the session it belongs to, and the app.
pub struct CallContext<'cycle> {
    app: &'cycle App,
    session: &'cycle mut Session,
    page: &'cycle mut WorkingPage,
}

impl<'cycle> CallContext<'cycle> {
    pub(crate) fn new(
        app: &'cycle App,
        session: &'cycle mut Session,
        page: &'cycle mut WorkingPage,
    ) -> Self {
        Self { app, session, page }
    }

    pub fn app(&self) -> &App {
        self.app
    }

    /// The page of this call; mutations on it are sent to the client.
    pub fn page(&mut self) -> &mut WorkingPage {
        self.page
    }

    pub fn uid(&self) -> Option<&str> {
        self.page.uid()
    }

    pub fn pending_file_count(&self) -> usize {
        self.session.pending_file_count()
    }

    /// Variables of the calling session. They persist between calls from the
    /// same client and start from the app defaults.
    pub fn user_vars(&self) -> &UserVars {
        self.session.user_vars()
    }

    pub fn user_vars_mut(&mut self) -> &mut UserVars {
        self.session.user_vars_mut()
    }

    /// Ask the client to stream `file` back. The receiver yields the
    /// assembled file once the final chunk arrives in a later message.
    ///
    /// The chunks are applied by the same session this call is running on,
    /// so the receiver can only complete after this function returns. Hand it
    /// to another task, or use [`CallContext::save_file_with`].
    ///
    /// # Errors
    /// [`TransferError::AlreadyOpen`] if this file is already being saved.
    pub fn save_file(
        &mut self,
        file: &UploadedFile,
        binary: bool,
    ) -> Result<oneshot::Receiver<AssembledFile>, TransferError> {
        let receiver = self.session.request_save(file)?;
        self.page
            .emit(Instruction::save_file(file.file_id(), binary));
        Ok(receiver)
    }

    /// Ask the client to stream `file` back and run `on_complete` with it,
    /// and with the session, when the final chunk arrives.
    ///
    /// # Errors
    /// [`TransferError::AlreadyOpen`] if this file is already being saved.
    pub fn save_file_with<F>(
        &mut self,
        file: &UploadedFile,
        binary: bool,
        on_complete: F,
    ) -> Result<(), TransferError>
    where
        F: FnOnce(AssembledFile, &mut Session) + Send + 'static,
    {
        self.session.request_save_with(file, on_complete)?;
        self.page
            .emit(Instruction::save_file(file.file_id(), binary));
        Ok(())
    }
}

//! One dispatch cycle: inbound message in, ordered instructions out.

use crate::DispatchError;
use crate::app::App;
use crate::page::{PageTree as _, WorkingPage};
use crate::registry::{CallArg, CallArgs, CallContext, Callable};
use crate::session::{ChunkReceipt, Session};
use core::any::Any;
use html::{Document, resolve};
use protocol::{Instruction, Message, PageCall, element_ref_selector, parse_message};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::info_span;

/// Why a cycle stopped before invoking anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The message, snapshot or call shape was unusable.
    BadFormat,
    /// An element argument did not resolve in the snapshot.
    UnresolvedRef,
}

/// Progress of a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    TreeReconstructed,
    ArgsResolved,
    Invoked,
    InstructionsFlushed,
    Done,
    Rejected(Rejection),
}

impl Stage {
    fn advance(&mut self, next: Self) {
        log::trace!("cycle {self:?} -> {next:?}");
        *self = next;
    }
}

/// What a successfully dispatched message produced.
#[derive(Debug)]
pub enum Outcome {
    /// A server function ran. `failure` holds its error or panic message;
    /// the instructions it queued before failing are still included.
    Called {
        function: String,
        instructions: Vec<Instruction>,
        failure: Option<String>,
    },
    /// A `files` message buffered this many placeholders.
    FilesRegistered { count: usize },
    /// A `save files` chunk was applied.
    ChunkAccepted(ChunkReceipt),
}

impl Outcome {
    /// Instructions to send back, in the order they were queued.
    pub fn into_instructions(self) -> Vec<Instruction> {
        match self {
            Self::Called { instructions, .. } => instructions,
            Self::FilesRegistered { .. } | Self::ChunkAccepted(_) => Vec::new(),
        }
    }
}

/// Process one raw inbound message against `app` for `session`.
///
/// # Errors
/// Anything that stops the cycle before a function runs: a refused or
/// malformed message, no page, an unknown function, an unresolved element
/// argument, an arity mismatch, or a rejected file transfer. Failures inside
/// the function itself are reported in [`Outcome::Called`] instead.
pub fn dispatch(app: &App, session: &mut Session, raw: &str) -> Result<Outcome, DispatchError> {
    let _span = info_span!("dispatch.cycle").entered();
    let started = Instant::now();
    let mut stage = Stage::Received;
    log::debug!("RECEIVED {raw}");

    let result = run_cycle(app, session, raw, &mut stage);
    match &result {
        Ok(_) => stage.advance(Stage::Done),
        Err(err) => stage.advance(Stage::Rejected(err.rejection())),
    }
    if app.config().log_timings {
        log::info!("dispatch cycle took {:?}", started.elapsed());
    }
    result
}

/// [`dispatch`] for transports: never fails, errors are logged and answered
/// with no instructions.
pub fn handle_message(app: &App, session: &mut Session, raw: &str) -> Vec<Instruction> {
    match dispatch(app, session, raw) {
        Ok(outcome) => outcome.into_instructions(),
        Err(err) => {
            log::error!("dropped message ({:?}): {err}", err.rejection());
            Vec::new()
        }
    }
}

fn run_cycle(
    app: &App,
    session: &mut Session,
    raw: &str,
    stage: &mut Stage,
) -> Result<Outcome, DispatchError> {
    if !app.accepts(raw) {
        return Err(DispatchError::Rejected);
    }
    session.seed_user_vars(app.default_vars());
    let message = parse_message(raw)?;
    stage.advance(Stage::Parsed);
    match message {
        Message::Page(call) => call_function(app, session, call, stage),
        Message::Files(batch) => {
            let count = session.register_files(batch)?;
            log::debug!("{count} uploaded files pending");
            Ok(Outcome::FilesRegistered { count })
        }
        Message::SaveFiles(chunk) => Ok(Outcome::ChunkAccepted(session.receive_chunk(chunk)?)),
    }
}

fn call_function(
    app: &App,
    session: &mut Session,
    call: PageCall,
    stage: &mut Stage,
) -> Result<Outcome, DispatchError> {
    let uid = call.uid.as_deref().or_else(|| session.uid()).map(str::to_owned);
    let template = app.route(call.url.as_deref(), uid.as_deref()).ok_or_else(|| {
        DispatchError::UnknownPage(call.url.clone().unwrap_or_default())
    })?;
    let mut page = template.working_copy(&call.html, uid.as_deref())?;
    stage.advance(Stage::TreeReconstructed);

    let callable = app
        .function(template, &call.func)
        .ok_or_else(|| DispatchError::UnknownFunction(call.func.clone()))?;
    let args = resolve_args(callable, &call, &page, session)?;
    stage.advance(Stage::ArgsResolved);

    log::info!("calling {} from {}", call.func, page.url());
    let failure = invoke(app, session, &mut page, callable, args);
    stage.advance(Stage::Invoked);

    let instructions = session.flush(page.into_instructions());
    stage.advance(Stage::InstructionsFlushed);
    Ok(Outcome::Called {
        function: call.func,
        instructions,
        failure,
    })
}

fn resolve_value(
    document: &Document,
    value: &Value,
    by_reference: bool,
) -> Result<CallArg, DispatchError> {
    if by_reference && let Some(selector) = element_ref_selector(value) {
        let node = resolve(document, selector)?;
        return Ok(CallArg::Element {
            node,
            files: Vec::new(),
        });
    }
    Ok(CallArg::Value(value.clone()))
}

/// Give an element argument the pending files picked in that element.
fn attach_files(document: &Document, session: &mut Session, arg: &mut CallArg) {
    if let CallArg::Element { node, files } = arg {
        let target = *node;
        *files = session.take_files_where(|file| {
            resolve(document, file.selector()).is_ok_and(|found| found == target)
        });
    }
}

fn resolve_args(
    callable: &Callable,
    call: &PageCall,
    page: &WorkingPage,
    session: &mut Session,
) -> Result<CallArgs, DispatchError> {
    let document = page.document();
    let by_reference = call.selector_to_element;

    let mut positional = Vec::with_capacity(
        callable
            .leading()
            .len()
            .saturating_add(call.args.len())
            .saturating_add(callable.trailing().len()),
    );
    positional.extend(callable.leading().iter().cloned().map(CallArg::Value));
    for value in &call.args {
        positional.push(resolve_value(document, value, by_reference)?);
    }
    positional.extend(callable.trailing().iter().cloned().map(CallArg::Value));

    let mut named = BTreeMap::new();
    for (name, value) in call.kwargs.iter().flatten() {
        named.insert(name.clone(), resolve_value(document, value, by_reference)?);
    }

    if let Some(expected) = callable.arity()
        && expected != positional.len()
    {
        return Err(DispatchError::ArityMismatch {
            function: callable.name().to_owned(),
            expected,
            found: positional.len(),
        });
    }

    for arg in positional.iter_mut().chain(named.values_mut()) {
        attach_files(document, session, arg);
    }
    if callable.accepts_files() {
        positional.push(CallArg::Files(session.take_all_files()));
    }
    Ok(CallArgs::new(positional, named))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("panic with a non-string payload"))
}

/// Run the function; its error or panic is logged and returned as text.
fn invoke(
    app: &App,
    session: &mut Session,
    page: &mut WorkingPage,
    callable: &Callable,
    args: CallArgs,
) -> Option<String> {
    let mut context = CallContext::new(app, session, page);
    let result = panic::catch_unwind(AssertUnwindSafe(|| callable.invoke(&mut context, args)));
    let failure = match result {
        Ok(Ok(())) => return None,
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(&*payload)),
    };
    log::error!("function `{}` failed: {failure}", callable.name());
    Some(failure)
}

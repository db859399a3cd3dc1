//! Server side of a page whose client only reports events and replays
//! instructions.
//!
//! An [`App`] holds the template [`Page`]s and the server functions the
//! client may call. Each inbound message goes through [`dispatch`]: the
//! client's snapshot becomes a [`WorkingPage`], the named function runs
//! against it, and every mutation it makes comes back as an ordered list
//! of [`protocol::Instruction`]s for the client.

#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod app;
pub mod config;
pub mod files;
pub mod page;
pub mod registry;
pub mod router;
pub mod session;
pub mod signals;
pub mod transport;

use html::HtmlError;
use protocol::ProtocolError;
use thiserror::Error;

pub use app::App;
pub use config::AppConfig;
pub use files::{AssembledFile, FileAssembler, TransferError, UploadedFile};
pub use page::{ElementMut, ElementRef, Page, PageTree, WorkingPage};
pub use registry::{CallArg, CallArgs, CallContext, Callable, FunctionRegistry};
pub use router::{Outcome, Rejection, Stage, dispatch, handle_message};
pub use session::{ChunkReceipt, SaveCallback, Session, UserVars};
pub use signals::{ClientArg, Mutation, SignalQueue};
pub use transport::{Bridge, serve};

/// Why a dispatch cycle ended without running a function.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The app's data-validation hook refused the raw message.
    #[error("message rejected by data validation")]
    Rejected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The snapshot or a content argument could not be parsed.
    #[error(transparent)]
    Html(HtmlError),
    /// No page is registered at all.
    #[error("no page for `{0}`")]
    UnknownPage(String),
    #[error("no function named `{0}`")]
    UnknownFunction(String),
    /// An element argument does not resolve in the snapshot.
    #[error("no element matches selector `{0}`")]
    ElementNotFound(String),
    #[error("`{function}` takes {expected} arguments but got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("more than {limit} uploaded files are pending")]
    TooManyPendingFiles { limit: usize },
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl From<HtmlError> for DispatchError {
    fn from(err: HtmlError) -> Self {
        match err {
            HtmlError::ElementNotFound(selector) => Self::ElementNotFound(selector),
            other @ (HtmlError::Parse(_)
            | HtmlError::InvalidSelector { .. }
            | HtmlError::NotAnElement
            | HtmlError::Unprintable { .. }) => Self::Html(other),
        }
    }
}

impl DispatchError {
    /// Rejection stage a cycle ending in this error is reported under.
    pub const fn rejection(&self) -> Rejection {
        match self {
            Self::ElementNotFound(_) => Rejection::UnresolvedRef,
            Self::Rejected
            | Self::Protocol(_)
            | Self::Html(_)
            | Self::UnknownPage(_)
            | Self::UnknownFunction(_)
            | Self::ArityMismatch { .. }
            | Self::TooManyPendingFiles { .. }
            | Self::Transfer(_) => Rejection::BadFormat,
        }
    }
}

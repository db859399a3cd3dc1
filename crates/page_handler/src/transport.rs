//! Glue between dispatch and whatever carries the messages.
//!
//! [`serve`] drives one connection from a pair of channels; [`Bridge`] is the
//! synchronous entry point for desktop windows, one session per window uid.

use crate::app::App;
use crate::router::handle_message;
use crate::session::Session;
use anyhow::{Context as _, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task;

/// Dispatch every message from `inbound` and send the resulting
/// instructions, as JSON, to `outbound` in order.
///
/// Returns when `inbound` is closed or the receiving side of `outbound`
/// goes away.
///
/// # Errors
/// If a dispatch task cannot be joined or an instruction fails to encode.
pub async fn serve(
    app: Arc<App>,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
) -> anyhow::Result<()> {
    let mut session = Session::new(app.config());
    while let Some(raw) = inbound.recv().await {
        session.discard_stale(Instant::now());
        let cycle_app = Arc::clone(&app);
        let (returned, instructions) = task::spawn_blocking(move || {
            let instructions = handle_message(&cycle_app, &mut session, &raw);
            (session, instructions)
        })
        .await
        .context("dispatch task did not complete")?;
        session = returned;

        for instruction in instructions {
            let json = instruction.to_json()?;
            if outbound.send(json).await.is_err() {
                log::debug!("outbound channel closed, stopping");
                return Ok(());
            }
        }
    }
    log::debug!("inbound channel closed after message #{}", session.msg_num());
    Ok(())
}

/// Desktop entry point: windows call in with their uid and get the
/// instructions back directly.
///
/// Each window has its own session lock, so a slow function in one window
/// never holds up another.
pub struct Bridge {
    app: Arc<App>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Bridge {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn session(&self, uid: &str) -> anyhow::Result<Arc<Mutex<Session>>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|err| anyhow!("session table poisoned: {err}"))?;
        let session = sessions.entry(uid.to_owned()).or_insert_with(|| {
            log::debug!("window {uid} opened a session");
            Arc::new(Mutex::new(Session::for_window(self.app.config(), uid)))
        });
        Ok(Arc::clone(session))
    }

    /// Dispatch `raw` for the window `uid` and return the encoded instructions.
    ///
    /// Calls from the same window run one at a time.
    ///
    /// # Errors
    /// If a session lock is poisoned or an instruction fails to encode.
    pub fn communicate(&self, uid: &str, raw: &str) -> anyhow::Result<Vec<String>> {
        let shared = self.session(uid)?;
        let mut session = shared
            .lock()
            .map_err(|err| anyhow!("session of window {uid} poisoned: {err}"))?;
        session.discard_stale(Instant::now());
        let mut encoded = Vec::new();
        for instruction in handle_message(&self.app, &mut session, raw) {
            encoded.push(instruction.to_json()?);
        }
        Ok(encoded)
    }

    /// Forget the session of a closed window. Returns whether it existed.
    /// A call still running for that window finishes on the old session.
    ///
    /// # Errors
    /// If the session table is poisoned.
    pub fn close_window(&self, uid: &str) -> anyhow::Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|err| anyhow!("session table poisoned: {err}"))?;
        Ok(sessions.remove(uid).is_some())
    }
}

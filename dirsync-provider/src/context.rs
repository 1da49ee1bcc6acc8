//! Per-database context state (spec §3 "Context", §4.2).

use crate::csn::Csn;
use crate::session::Session;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

#[derive(Debug, Default)]
struct CsnState {
    current: Option<Csn>,
    /// Whether the context CSN has been learned yet (spec §4.4 "cold
    /// start"). `current` can be `None` while `learned` is `false`; once
    /// learned it only ever advances.
    learned: bool,
}

/// Process-wide (per-database) replication state (spec §3 "Context").
///
/// Holds the two mutexes the spec calls out explicitly: `csn_mutex` here is
/// `csn_state` (a short-held `RwLock`, never held across store I/O) and
/// `sessions_mutex` is `sessions` (held only around synchronous scope/filter
/// tests per the Rust lock mapping in spec §5).
pub struct Context {
    csn_state: RwLock<CsnState>,
    sessions: RwLock<Vec<Arc<Session>>>,
    /// Serializes the CSN Finder's cold-start search (spec §4.4: "only one
    /// caller may populate the context CSN"). Held across the backend
    /// search, unlike `csn_state`, so it is a separate async-aware lock.
    cold_start_gate: AsyncMutex<()>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            csn_state: RwLock::new(CsnState::default()),
            sessions: RwLock::new(Vec::new()),
            cold_start_gate: AsyncMutex::new(()),
        }
    }

    /// Acquire the cold-start critical section (spec §4.4). The guard must
    /// be held for the duration of the cold-start search; dropping it
    /// releases the next caller.
    pub async fn cold_start_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.cold_start_gate.lock().await
    }

    /// The current context CSN, if learned yet (spec §4.2
    /// `get_context_csn`).
    pub fn get_context_csn(&self) -> Option<Csn> {
        self.csn_state.read().current.clone()
    }

    pub fn is_learned(&self) -> bool {
        self.csn_state.read().learned
    }

    /// Conditionally advance the context CSN to `max(current, candidate)`
    /// (spec §4.2 `try_advance_context_csn`, invariant 1: monotonically
    /// non-decreasing).
    pub fn try_advance_context_csn(&self, candidate: Csn) -> Csn {
        let mut state = self.csn_state.write();
        let advanced = match &state.current {
            Some(current) if *current >= candidate => current.clone(),
            _ => {
                debug!(csn = %candidate, "context CSN advanced");
                candidate
            }
        };
        state.current = Some(advanced.clone());
        state.learned = true;
        advanced
    }

    /// Used only by the cold-start path in the CSN Finder (spec §4.4): sets
    /// the context CSN directly rather than taking a `max`, because at cold
    /// start there is no prior value to compare against. Still
    /// mutex-protected so only one caller can populate it.
    pub fn learn_context_csn(&self, csn: Csn) {
        let mut state = self.csn_state.write();
        if !state.learned {
            debug!(csn = %csn, "context CSN learned (cold start)");
            state.current = Some(csn);
            state.learned = true;
        }
    }

    /// Register a newly created persistent session (spec §4.5).
    pub fn register_session(&self, session: Arc<Session>) {
        debug!(session_id = %session.session_id, "session registered");
        self.sessions.write().push(session);
    }

    /// Remove a session from the context's list by id (spec §4.5
    /// "Destruction filters the session out of the list").
    pub fn drop_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let idx = sessions.iter().position(|s| s.session_id == session_id)?;
        let session = sessions.remove(idx);
        debug!(session_id, "session dropped");
        Some(session)
    }

    /// Snapshot of the current session list, in registration order (spec
    /// §4.6 "per-session ordering follows session-list traversal order,
    /// which is the registration order").
    ///
    /// Returns owned `Arc` clones rather than taking a callback so callers
    /// may `.await` while processing a session without holding the list
    /// lock (spec §5 Rust lock mapping).
    pub fn session_snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

//! Persistent search sessions and their lifecycle (spec §3 "Persistent
//! Session", §4.5 "Session Registry").

use crate::emitter::Notification;
use crate::error::{Result, SyncProvError};
use crate::types::{EntryIdentity, NormalizedDn, QueuedResult, Scope};
use dirsync_core::id::{EntryId, EntryUuid};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Parameters needed to create a [`Session`] (spec §3 "Persistent
/// Session": "normalized search base, ... session id and request id ...,
/// the parsed filter and its string form").
pub struct SessionParams {
    pub session_id: String,
    pub request_id: String,
    pub base: NormalizedDn,
    pub scope: Scope,
    pub filter_string: String,
    pub channel_capacity: usize,
    pub max_backlog: usize,
}

#[derive(Debug)]
struct SessionInner {
    /// The `REFRESHING` flag word (spec §3). `true` while the session is in
    /// the refresh phase and notifications are queued rather than sent.
    refreshing: bool,
    backlog: VecDeque<QueuedResult>,
    /// The base entry identity stamped by the Base Validator on its first
    /// call (spec §4.3); `None` means the base has not been validated yet.
    base_identity: Option<EntryIdentity>,
}

/// Server-side state for one refresh-and-persist consumer (spec §3).
///
/// The `backlog_mutex` from the spec is `inner`; it guards the backlog and
/// the `REFRESHING` flag together, as required by the drain race notes in
/// spec §9.
pub struct Session {
    pub session_id: String,
    pub request_id: String,
    pub base: NormalizedDn,
    pub scope: Scope,
    pub filter_string: String,
    max_backlog: usize,
    inner: Mutex<SessionInner>,
    tx: mpsc::Sender<Notification>,
}

impl Session {
    /// Create a session plus the receiving half a hosting application
    /// drains to deliver live notifications to its transport (spec §4.7
    /// "sent as a live search entry").
    pub fn new(params: SessionParams) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(params.channel_capacity.max(1));
        let session = Self {
            session_id: params.session_id,
            request_id: params.request_id,
            base: params.base,
            scope: params.scope,
            filter_string: params.filter_string,
            max_backlog: params.max_backlog,
            inner: Mutex::new(SessionInner {
                refreshing: true,
                backlog: VecDeque::new(),
                base_identity: None,
            }),
            tx,
        };
        (session, rx)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refreshing
    }

    /// The base entry identity recorded by the Base Validator, if any
    /// (spec §4.3).
    pub fn base_identity(&self) -> Option<EntryIdentity> {
        self.inner.lock().base_identity.clone()
    }

    /// Stamp the session with its base identity on first validation, or
    /// return it for comparison on subsequent calls (spec §4.3: "On
    /// success with no prior identity recorded (first call), it stamps the
    /// session ... On subsequent calls, it compares both").
    pub fn stamp_or_get_base_identity(&self, observed: EntryIdentity) -> EntryIdentity {
        let mut inner = self.inner.lock();
        match &inner.base_identity {
            Some(existing) => existing.clone(),
            None => {
                inner.base_identity = Some(observed.clone());
                observed
            }
        }
    }

    /// Queue `result` if still refreshing, returning `true` if it was
    /// queued (caller must not also deliver it live). Enforces the backlog
    /// bound from spec §10 "Session lag / too-slow-consumer handling".
    /// Used by the Response Emitter to decide queue-vs-send (spec §4.7).
    pub fn refreshing_enqueue_if_needed(&self, result: QueuedResult) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.refreshing {
            if inner.backlog.len() >= self.max_backlog {
                warn!(session_id = %self.session_id, len = inner.backlog.len(), "session backlog overflow");
                return Err(SyncProvError::BacklogOverflow {
                    session_id: self.session_id.clone(),
                    len: inner.backlog.len(),
                });
            }
            inner.backlog.push_back(result);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Deliver a notification live, over the bounded channel (spec §5
    /// "Rust lock mapping": a full channel is backpressure, not an error,
    /// up to the session's own lag policy).
    pub async fn send_live(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification).await.map_err(|_| SyncProvError::SessionGone {
            session_id: self.session_id.clone(),
        })
    }

    /// Refresh→persist transition (spec §4.9): atomically snapshot the
    /// backlog, clear `REFRESHING`, and hand the snapshot to the caller to
    /// drain outside the lock.
    pub fn begin_drain(&self) -> VecDeque<QueuedResult> {
        let mut inner = self.inner.lock();
        let backlog = std::mem::take(&mut inner.backlog);
        inner.refreshing = false;
        debug!(session_id = %self.session_id, drained = backlog.len(), "refresh->persist transition");
        backlog
    }
}

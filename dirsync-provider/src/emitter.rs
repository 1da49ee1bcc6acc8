//! Response Emitter (spec §4.7): builds sync state/done controls and sync
//! info messages, and decides queue-vs-send for each notification.

use crate::csn::{Cookie, CookieCodec, Csn};
use crate::error::{Result, SyncProvError};
use crate::session::Session;
use crate::store::{DnLookup, Entry, EntryStore};
use crate::types::{NormalizedDn, NotifyMode, QueuedResult};
use dirsync_core::id::EntryUuid;
use tracing::debug;

/// The `state` field of a synchronization state control (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Present,
    Add,
    Modify,
    Delete,
}

/// Attached to each search-entry/search-reference of a sync-bound search
/// (spec §6 "Synchronization state control").
#[derive(Debug, Clone)]
pub struct SyncStateControl {
    pub state: SyncState,
    pub entry_uuid: EntryUuid,
    pub cookie: Option<String>,
}

/// Attached to the terminal response of a refresh-only search (spec §6
/// "Synchronization done control").
#[derive(Debug, Clone)]
pub struct SyncDoneControl {
    pub cookie: Option<String>,
    pub refresh_deletes: bool,
}

/// One of the refresh-and-persist intermediate messages (spec §6
/// "Synchronization info intermediate message").
#[derive(Debug, Clone)]
pub enum SyncInfoMessage {
    NewCookie(String),
    RefreshDelete { cookie: Option<String>, refresh_done: bool },
    RefreshPresent { cookie: Option<String>, refresh_done: bool },
    SyncIdSet {
        cookie: Option<String>,
        refresh_deletes: bool,
        uuids: Vec<EntryUuid>,
    },
}

/// A fully resolved notification, ready to queue or deliver (spec §4.7).
///
/// `entry` is `None` for deletions, which are emitted as a synthetic entry
/// carrying only DN and UUID (spec §4.7).
#[derive(Debug, Clone)]
pub struct Notification {
    pub state: SyncState,
    pub uuid: EntryUuid,
    pub ndn: NormalizedDn,
    pub cookie: Option<Cookie>,
    pub entry: Option<Entry>,
    pub is_referral: bool,
}

fn state_for(mode: NotifyMode) -> SyncState {
    match mode {
        NotifyMode::Add => SyncState::Add,
        NotifyMode::Modify | NotifyMode::ReferenceOfSame => SyncState::Modify,
        NotifyMode::Delete => SyncState::Delete,
    }
}

/// Resolve a [`QueuedResult`] into a deliverable [`Notification`], fetching
/// the current entry for non-delete modes (spec §4.9: "fetching the
/// current entry for non-delete modes"). If the entry has since been
/// deleted, the mode degrades to DELETE (spec §4.9).
pub async fn build_notification(store: &dyn EntryStore, result: &QueuedResult) -> Result<Notification> {
    let cookie = Some(Cookie::from_csn(result.csn.clone()));

    if matches!(result.mode, NotifyMode::Delete) {
        return Ok(Notification {
            state: SyncState::Delete,
            uuid: result.uuid,
            ndn: result.ndn.clone(),
            cookie,
            entry: None,
            is_referral: result.is_referral,
        });
    }

    match store.dn_to_entry(&result.ndn).await.map_err(SyncProvError::Core)? {
        DnLookup::Found(entry) => Ok(Notification {
            state: state_for(result.mode),
            uuid: result.uuid,
            ndn: result.ndn.clone(),
            cookie,
            entry: Some(entry),
            is_referral: result.is_referral,
        }),
        DnLookup::MatchedParent(_) | DnLookup::NotFound => {
            debug!(uuid = %result.uuid, "entry gone by delivery time, degrading to DELETE");
            Ok(Notification {
                state: SyncState::Delete,
                uuid: result.uuid,
                ndn: result.ndn.clone(),
                cookie,
                entry: None,
                is_referral: result.is_referral,
            })
        }
    }
}

/// Queue `result` on `session`'s backlog if still refreshing, otherwise
/// resolve and deliver it live (spec §4.7: "checks the session's
/// `REFRESHING` flag under the session mutex; if still refreshing, the
/// notification is moved onto the backlog ... without sending").
pub async fn emit(store: &dyn EntryStore, session: &Session, result: QueuedResult) -> Result<()> {
    if session.refreshing_enqueue_if_needed(result.clone())? {
        return Ok(());
    }
    let notification = build_notification(store, &result).await?;
    session.send_live(notification).await
}

/// Refresh→persist drain (spec §4.9): snapshot already taken by
/// [`Session::begin_drain`]; this resolves and delivers each queued result
/// in FIFO order.
pub async fn drain_backlog(store: &dyn EntryStore, session: &Session) -> Result<()> {
    let backlog = session.begin_drain();
    for result in backlog {
        let notification = build_notification(store, &result).await?;
        session.send_live(notification).await?;
    }
    Ok(())
}

/// Build the sync state control for a notification (spec §6).
pub fn to_state_control(notification: &Notification, codec: &CookieCodec) -> Result<SyncStateControl> {
    let cookie = match &notification.cookie {
        Some(c) => Some(codec.encode(c).map_err(SyncProvError::Core)?),
        None => None,
    };
    Ok(SyncStateControl {
        state: notification.state,
        entry_uuid: notification.uuid,
        cookie,
    })
}

/// Build the sync done control terminating a refresh-only search (spec §6,
/// §4.8 step 6).
pub fn done_control(
    context_csn: &Csn,
    session_id: Option<&str>,
    request_id: Option<&str>,
    codec: &CookieCodec,
    refresh_deletes: bool,
) -> Result<SyncDoneControl> {
    let cookie = Cookie {
        csn: Some(context_csn.clone()),
        session_id: session_id.map(String::from),
        request_id: request_id.map(String::from),
    };
    Ok(SyncDoneControl {
        cookie: Some(codec.encode(&cookie).map_err(SyncProvError::Core)?),
        refresh_deletes,
    })
}

//! Match Engine (spec §4.6): called twice per write, once before the
//! mutation (`saveit=true`) and once after (`saveit=false`), to decide
//! which sessions see the write and as what notification mode.

use crate::base_validator::validate_base;
use crate::context::Context;
use crate::emitter;
use crate::error::{Result, SyncProvError};
use crate::interceptor::terminate_invalidated;
use crate::store::{evaluate_filter, Entry, EntryStore, Filter};
use crate::types::{NormalizedDn, NotifyMode, OpCookie, QueuedResult, WriteKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pre-pass (spec §4.6 steps 1-2): capture the affected entry's pre-state
/// and record which sessions already match it.
///
/// Held under the session-list snapshot for its whole duration, including
/// the per-session filter tests and Base Validator calls (spec §5: "The
/// Match Engine is an exception: it holds `sessions_mutex` while
/// performing filter tests and pre/post entry fetches").
pub async fn pre_pass(store: &dyn EntryStore, ctx: &Context, entry: &Entry) -> Result<OpCookie> {
    let mut cookie = OpCookie::new(
        NormalizedDn(entry.dn.clone()),
        entry.ndn.clone(),
        entry.uuid,
        entry.is_referral,
    );

    for session in ctx.session_snapshot() {
        let base_entry = match validate_base(store, &session).await {
            Ok(base_entry) => base_entry,
            Err(SyncProvError::BaseInvalidated { .. }) => {
                terminate_invalidated(ctx, &session.session_id);
                continue;
            }
            Err(e) => return Err(e),
        };
        let _ = base_entry;

        if !session.scope.matches(&session.base, &entry.ndn) {
            continue;
        }
        let filter = Filter::Original(session.filter_string.clone());
        if evaluate_filter(store, entry, &filter).await.map_err(SyncProvError::Core)?.is_true() {
            cookie.matched_before.insert(session.session_id.clone());
        }
    }

    debug!(uuid = %entry.uuid, matched_before = cookie.matched_before.len(), "match engine pre-pass");
    Ok(cookie)
}

/// Post-pass (spec §4.6 steps 1-5): after commit, decide ADD/MODIFY/DELETE
/// per session and deliver via the Response Emitter.
///
/// `new_entry` is `None` for a delete operation, in which case only the
/// "matched-before" set drives DELETE emissions (spec §4.6 step 5).
pub async fn post_pass(
    store: &dyn EntryStore,
    ctx: &Context,
    write_kind: WriteKind,
    cookie: &OpCookie,
    new_entry: Option<&Entry>,
) -> Result<()> {
    let commit_csn = cookie
        .commit_csn
        .clone()
        .ok_or_else(|| SyncProvError::Core(dirsync_core::CoreError::internal("post-pass without commit CSN")))?;

    for session in ctx.session_snapshot() {
        let matched_before = cookie.matched_before.contains(&session.session_id);

        if write_kind == WriteKind::Delete || new_entry.is_none() {
            if matched_before {
                deliver_or_log(store, &session, NotifyMode::Delete, cookie, &cookie.pre_ndn, &commit_csn).await;
            }
            continue;
        }

        let new_entry = new_entry.expect("checked above");
        let base_entry = match validate_base(store, &session).await {
            Ok(base_entry) => base_entry,
            Err(SyncProvError::BaseInvalidated { .. }) => {
                terminate_invalidated(ctx, &session.session_id);
                continue;
            }
            Err(e) => return Err(e),
        };
        let _ = base_entry;

        let in_scope = session.scope.matches(&session.base, &new_entry.ndn);
        let filter = Filter::Original(session.filter_string.clone());
        let filter_true = in_scope
            && evaluate_filter(store, new_entry, &filter)
                .await
                .map_err(SyncProvError::Core)?
                .is_true();

        if filter_true {
            let mode = if matched_before { NotifyMode::Modify } else { NotifyMode::Add };
            deliver_or_log(store, &session, mode, cookie, &new_entry.ndn, &commit_csn).await;
        } else if matched_before {
            deliver_or_log(store, &session, NotifyMode::Delete, cookie, &cookie.pre_ndn, &commit_csn).await;
        }
    }

    Ok(())
}

/// Deliver to a single session, logging and swallowing the error rather than
/// propagating it: a backlog overflow or vanished session is scoped to that
/// session alone (spec §7) and must not stop delivery to the sessions still
/// left in this write's snapshot.
async fn deliver_or_log(
    store: &dyn EntryStore,
    session: &Arc<crate::session::Session>,
    mode: NotifyMode,
    cookie: &OpCookie,
    ndn: &NormalizedDn,
    commit_csn: &crate::csn::Csn,
) {
    if let Err(e) = deliver(store, session, mode, cookie, ndn, commit_csn).await {
        warn!(session_id = %session.session_id, error = %e, "per-session delivery failed");
    }
}

async fn deliver(
    store: &dyn EntryStore,
    session: &Arc<crate::session::Session>,
    mode: NotifyMode,
    cookie: &OpCookie,
    ndn: &NormalizedDn,
    commit_csn: &crate::csn::Csn,
) -> Result<()> {
    let result = QueuedResult {
        mode,
        uuid: cookie.uuid,
        pre_move_dn: Some(cookie.pre_ndn.clone()),
        ndn: ndn.clone(),
        csn: commit_csn.clone(),
        is_referral: cookie.is_referral,
    };
    emitter::emit(store, session, result).await
}

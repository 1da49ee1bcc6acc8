//! Write Interceptor (spec §4.9 commit path, §4.10 abandon/cancel).
//!
//! Wraps a write transaction with the Match Engine's pre- and post-pass
//! and advances the context CSN once the write commits.

use crate::context::Context;
use crate::error::{Result, SyncProvError};
use crate::match_engine::{post_pass, pre_pass};
use crate::store::{Entry, EntryStore};
use crate::types::{OpCookie, WriteKind};
use tracing::info;

/// Begin a write transaction: pre-pass (spec §4.6 steps 1-2) against the
/// entry's pre-mutation state.
pub async fn before_write(store: &dyn EntryStore, ctx: &Context, entry: &Entry) -> Result<OpCookie> {
    pre_pass(store, ctx, entry).await
}

/// Complete a write transaction once it has committed: advance the
/// context CSN from the commit CSN (spec §4.9 "then advance the context
/// CSN from the commit CSN"), then run the Match Engine's post-pass.
///
/// `new_entry` is the post-mutation state, `None` for a delete.
pub async fn after_write(
    store: &dyn EntryStore,
    ctx: &Context,
    write_kind: WriteKind,
    mut cookie: OpCookie,
    commit_csn: crate::csn::Csn,
    new_entry: Option<&Entry>,
) -> Result<()> {
    let advanced = ctx.try_advance_context_csn(commit_csn);
    cookie.commit_csn = Some(advanced);
    post_pass(store, ctx, write_kind, &cookie, new_entry).await
}

/// Abandon or cancel a persistent search (spec §4.10): remove the session
/// from the context and signal whether the caller should report
/// `LDAP_CANCELLED` (cancel) or nothing (abandon, which is silent by
/// protocol convention).
pub fn abandon_or_cancel(ctx: &Context, session_id: &str, is_cancel: bool) -> Result<()> {
    match ctx.drop_session(session_id) {
        Some(_session) => {
            info!(session_id, is_cancel, "persistent search session terminated");
            Ok(())
        }
        None => Err(SyncProvError::SessionGone {
            session_id: session_id.to_string(),
        }),
    }
}

/// Terminate a session whose base was invalidated mid-write (spec §4.3,
/// §4.6: "skip the session (and schedule termination)").
pub fn terminate_invalidated(ctx: &Context, session_id: &str) {
    if let Some(session) = ctx.drop_session(session_id) {
        info!(session_id = %session.session_id, "session terminated: base invalidated");
    }
}

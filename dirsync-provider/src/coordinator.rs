//! Search Coordinator (spec §4.8): entry point for a search bearing a
//! synchronization request control.

use crate::base_validator::validate_base;
use crate::context::Context;
use crate::csn::{Cookie, CookieCodec};
use crate::csn_finder::{find_csn, find_present, FindCsnOutcome};
use crate::emitter::{self, SyncDoneControl, SyncInfoMessage, SyncStateControl};
use crate::error::{Result, SyncProvError};
use crate::session::{Session, SessionParams};
use crate::store::{DnLookup, Entry, EntryStore, Filter, SearchEvent};
use crate::types::{NormalizedDn, Scope, SyncMode};
use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Incoming search, reduced to the fields the Search Coordinator needs
/// (spec §6 "Synchronization request control"). Parsing the wire control
/// itself is the hosting application's job; this is the already-validated
/// structural contract.
pub struct SearchRequest {
    pub base: NormalizedDn,
    pub scope: Scope,
    pub filter_string: String,
    pub mode: SyncMode,
    pub cookie: Cookie,
    /// True if the request also asked for alias dereferencing during the
    /// search (spec §4.8 step 1: rejected outright).
    pub deref_during_search: bool,
    /// The synchronization request control's `reloadHint` (spec §6, §10
    /// "reloadHint acknowledgement"). Only meaningful when `cookie.csn` is
    /// `None`: a full reload never has "nothing to deliver" semantics, and
    /// since the CSN-presence shortcut in step 3 only fires for a cookie
    /// that carries a CSN, an absent cookie already takes the full refresh
    /// path regardless of this flag. Carried through for callers that want
    /// to log or audit the consumer's intent.
    pub reload_hint: bool,
    pub session_id: String,
    pub request_id: String,
}

/// One item streamed back to the caller for a sync-bound search.
#[derive(Debug)]
pub enum CoordinatorEvent {
    Entry { control: SyncStateControl, entry: Entry },
    Reference { control: SyncStateControl, entry: Entry },
    Info(SyncInfoMessage),
    Done(SyncDoneControl),
}

pub type CoordinatorStream = Pin<Box<dyn Stream<Item = Result<CoordinatorEvent>> + Send>>;

/// A registered persistent session plus the receiving half of its live
/// notification channel (spec §4.7 "sent as a live search entry"). The
/// caller owns draining this to its own transport for as long as the
/// session lives.
pub struct SessionHandle {
    pub session: Arc<Session>,
    pub notifications: tokio::sync::mpsc::Receiver<crate::emitter::Notification>,
}

/// Drive a sync-bound search to completion (spec §4.8).
///
/// Returns the event stream and, for `refresh-and-persist`, the registered
/// session plus its live-notification receiver.
#[instrument(skip(store, ctx, codec, req), fields(base = %req.base.as_str(), session_id = %req.session_id))]
pub async fn run_search(
    store: Arc<dyn EntryStore>,
    ctx: Arc<Context>,
    codec: CookieCodec,
    limits: dirsync_core::config::Limits,
    req: SearchRequest,
) -> Result<(CoordinatorStream, Option<SessionHandle>)> {
    if req.deref_during_search {
        return Err(SyncProvError::Core(dirsync_core::CoreError::protocol(
            "derefAliases during search is not supported for a sync-bound search",
        )));
    }

    let persist = req.mode == SyncMode::RefreshAndPersist;

    let handle = if persist {
        let (session, rx) = Session::new(SessionParams {
            session_id: req.session_id.clone(),
            request_id: req.request_id.clone(),
            base: req.base.clone(),
            scope: req.scope,
            filter_string: req.filter_string.clone(),
            channel_capacity: limits.session_channel_capacity,
            max_backlog: limits.max_backlog,
        });
        validate_base(store.as_ref(), &session).await?;
        let session = Arc::new(session);
        ctx.register_session(session.clone());
        info!(session_id = %req.session_id, "persistent search session registered");
        Some(SessionHandle { session, notifications: rx })
    } else {
        None
    };
    let session = handle.as_ref().map(|h| h.session.clone());

    let mut id_set_upper_bound: Option<crate::csn::Csn> = None;
    let shortcut = match &req.cookie.csn {
        Some(cookie_csn) => {
            let outcome = find_csn(store.as_ref(), &ctx, &req.base, req.scope, cookie_csn).await?;
            match outcome {
                FindCsnOutcome::NotPresent => {
                    debug!("stale cookie CSN not found; refreshing from empty (permissive, spec §9 open question a)");
                    false
                }
                FindCsnOutcome::Present => {
                    let context_csn = ctx.get_context_csn().expect("FIND_CSN learns the context CSN");
                    let shortcut = &context_csn == cookie_csn;
                    if !shortcut {
                        // Context has moved past the cookie: run FIND_PRESENT so the
                        // consumer can reconcile entries it already knows about
                        // against what is still present (spec §4.4 FIND_PRESENT).
                        id_set_upper_bound = Some(cookie_csn.clone());
                    }
                    shortcut
                }
            }
        }
        None => false,
    };

    let context_csn = ctx
        .get_context_csn()
        .ok_or_else(|| SyncProvError::Core(dirsync_core::CoreError::internal("context CSN not established before search")))?;

    let cookie_csn = if shortcut { None } else { req.cookie.csn.clone() };
    let filter = Filter::with_csn_range(context_csn.clone(), cookie_csn.clone(), Some(req.filter_string.clone()));
    let base = req.base.clone();
    let scope = req.scope;
    let skip_csn = req.cookie.csn.clone();
    let codec_for_stream = codec.clone();
    let session_for_stream = session.clone();
    let store_for_stream = store.clone();
    let session_id = req.session_id.clone();
    let request_id = req.request_id.clone();
    let id_set_batch_size = limits.id_set_batch_size;

    let stream: CoordinatorStream = Box::pin(try_stream! {
        if let Some(upper_bound) = &id_set_upper_bound {
            let batches = find_present(store_for_stream.as_ref(), &base, scope, upper_bound, id_set_batch_size).await?;
            for uuids in batches {
                yield CoordinatorEvent::Info(SyncInfoMessage::SyncIdSet {
                    cookie: None,
                    refresh_deletes: false,
                    uuids,
                });
            }
        }

        if !shortcut {
            let mut backend = store_for_stream
                .backend_search(&base, scope, &filter)
                .await
                .map_err(SyncProvError::Core)?;

            while let Some(event) = backend.next().await {
                match event.map_err(SyncProvError::Core)? {
                    SearchEvent::Entry(entry) => {
                        if Some(&entry.csn) == skip_csn.as_ref() {
                            continue;
                        }
                        let notification = crate::emitter::Notification {
                            state: crate::emitter::SyncState::Add,
                            uuid: entry.uuid,
                            ndn: entry.ndn.clone(),
                            cookie: Some(Cookie::from_csn(entry.csn.clone())),
                            entry: Some(entry.clone()),
                            is_referral: entry.is_referral,
                        };
                        let control = emitter::to_state_control(&notification, &codec_for_stream)?;
                        if entry.is_referral {
                            yield CoordinatorEvent::Reference { control, entry };
                        } else {
                            yield CoordinatorEvent::Entry { control, entry };
                        }
                    }
                    SearchEvent::Reference(entry) => {
                        let notification = crate::emitter::Notification {
                            state: crate::emitter::SyncState::Add,
                            uuid: entry.uuid,
                            ndn: entry.ndn.clone(),
                            cookie: Some(Cookie::from_csn(entry.csn.clone())),
                            entry: Some(entry.clone()),
                            is_referral: true,
                        };
                        let control = emitter::to_state_control(&notification, &codec_for_stream)?;
                        yield CoordinatorEvent::Reference { control, entry };
                    }
                    SearchEvent::Done => break,
                }
            }
        }

        if persist {
            yield CoordinatorEvent::Info(SyncInfoMessage::RefreshPresent {
                cookie: Some(codec_for_stream.encode(&Cookie {
                    csn: Some(context_csn.clone()),
                    session_id: Some(session_id.clone()),
                    request_id: Some(request_id.clone()),
                }).map_err(SyncProvError::Core)?),
                refresh_done: true,
            });
        } else {
            yield CoordinatorEvent::Done(emitter::done_control(
                &context_csn,
                Some(&session_id),
                Some(&request_id),
                &codec_for_stream,
                false,
            )?);
        }

        if let Some(session) = &session_for_stream {
            emitter::drain_backlog(store_for_stream.as_ref(), session).await?;
        }
    });

    Ok((stream, handle))
}

//! CSN Finder (spec §4.4): validates a consumer's cookie CSN against the
//! store and enumerates present entries for refresh.

use crate::context::Context;
use crate::csn::Csn;
use crate::error::{Result, SyncProvError};
use crate::store::{EntryStore, Filter, SearchEvent};
use crate::types::{NormalizedDn, Scope};
use dirsync_core::id::EntryUuid;
use futures::StreamExt;
use tracing::debug;

/// Outcome of [`find_csn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindCsnOutcome {
    /// The cookie's CSN is still representable; the consumer may refresh
    /// from it.
    Present,
    /// The cookie's CSN can no longer be found; the consumer must reload
    /// from empty (spec §7 `STALE_COOKIE`).
    NotPresent,
}

/// Validate `cookie_csn` against the store, learning the context CSN on
/// cold start (spec §4.4 `FIND_CSN`).
pub async fn find_csn(
    store: &dyn EntryStore,
    ctx: &Context,
    base: &NormalizedDn,
    scope: Scope,
    cookie_csn: &Csn,
) -> Result<FindCsnOutcome> {
    if !ctx.is_learned() {
        let _guard = ctx.cold_start_guard().await;
        // Re-check: another caller may have learned it while we waited.
        if !ctx.is_learned() {
            return cold_start_find_csn(store, ctx, base, scope, cookie_csn).await;
        }
    }

    let context_csn = ctx.get_context_csn().expect("learned implies context CSN set");
    let filter = Filter::CsnLe(cookie_csn.clone());
    let mut stream = store
        .backend_search(base, scope, &filter)
        .await
        .map_err(SyncProvError::Core)?;

    let mut found = false;
    while let Some(event) = stream.next().await {
        match event.map_err(SyncProvError::Core)? {
            SearchEvent::Entry(entry) if &entry.csn == cookie_csn => {
                found = true;
                break;
            }
            SearchEvent::Entry(_) | SearchEvent::Reference(_) => {}
            SearchEvent::Done => break,
        }
    }

    debug!(context_csn = %context_csn, cookie_csn = %cookie_csn, found, "FIND_CSN (warm)");
    Ok(if found { FindCsnOutcome::Present } else { FindCsnOutcome::NotPresent })
}

async fn cold_start_find_csn(
    store: &dyn EntryStore,
    ctx: &Context,
    base: &NormalizedDn,
    scope: Scope,
    cookie_csn: &Csn,
) -> Result<FindCsnOutcome> {
    let filter = Filter::CsnGe(cookie_csn.clone());
    let mut stream = store
        .backend_search(base, scope, &filter)
        .await
        .map_err(SyncProvError::Core)?;

    let mut max_seen: Option<Csn> = None;
    let mut found_cookie_csn = false;
    while let Some(event) = stream.next().await {
        match event.map_err(SyncProvError::Core)? {
            SearchEvent::Entry(entry) | SearchEvent::Reference(entry) => {
                if &entry.csn == cookie_csn {
                    found_cookie_csn = true;
                }
                max_seen = Some(match max_seen {
                    Some(current) if current >= entry.csn => current,
                    _ => entry.csn,
                });
            }
            SearchEvent::Done => break,
        }
    }

    if let Some(max) = max_seen {
        ctx.learn_context_csn(max);
    } else {
        // Nothing in the store at or above the cookie: the cookie's CSN
        // itself is the highest we know of.
        ctx.learn_context_csn(cookie_csn.clone());
    }

    debug!(cookie_csn = %cookie_csn, found_cookie_csn, "FIND_CSN (cold start)");
    Ok(if found_cookie_csn {
        FindCsnOutcome::Present
    } else {
        FindCsnOutcome::NotPresent
    })
}

/// Enumerate UUIDs of entries with CSN ≤ `upper_bound`, batched for
/// `sync-id-set` intermediate messages (spec §4.4 `FIND_PRESENT`).
pub async fn find_present(
    store: &dyn EntryStore,
    base: &NormalizedDn,
    scope: Scope,
    upper_bound: &Csn,
    batch_size: usize,
) -> Result<Vec<Vec<EntryUuid>>> {
    let filter = Filter::CsnLe(upper_bound.clone());
    let mut stream = store
        .backend_search(base, scope, &filter)
        .await
        .map_err(SyncProvError::Core)?;

    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size.max(1));
    while let Some(event) = stream.next().await {
        match event.map_err(SyncProvError::Core)? {
            SearchEvent::Entry(entry) | SearchEvent::Reference(entry) => {
                current.push(entry.uuid);
                if current.len() >= batch_size.max(1) {
                    batches.push(std::mem::take(&mut current));
                }
            }
            SearchEvent::Done => break,
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DnLookup, Entry, SearchStream, TriState};
    use async_trait::async_trait;
    use dirsync_core::error::Result as CoreResult;
    use dirsync_core::id::EntryId;
    use futures::stream;
    use std::collections::HashMap;

    struct FakeStore {
        entries: Vec<Entry>,
    }

    fn entry(csn: u8) -> Entry {
        Entry {
            id: EntryId(csn as u64),
            uuid: EntryUuid::new(),
            dn: format!("cn={csn},dc=x"),
            ndn: NormalizedDn(format!("cn={csn},dc=x")),
            csn: Csn::from_bytes(vec![csn]),
            is_referral: false,
            attrs: HashMap::new(),
        }
    }

    #[async_trait]
    impl EntryStore for FakeStore {
        async fn dn_to_entry(&self, _ndn: &NormalizedDn) -> CoreResult<DnLookup> {
            Ok(DnLookup::NotFound)
        }

        async fn entry_get_rw(&self, _ndn: &NormalizedDn) -> CoreResult<Option<Entry>> {
            Ok(None)
        }

        async fn entry_release(&self, _entry: Entry) -> CoreResult<()> {
            Ok(())
        }

        async fn backend_search(&self, _base: &NormalizedDn, _scope: Scope, filter: &Filter) -> CoreResult<SearchStream> {
            let matching: Vec<_> = self
                .entries
                .iter()
                .filter(|e| match filter {
                    Filter::CsnGe(csn) => &e.csn >= csn,
                    Filter::CsnLe(csn) => &e.csn <= csn,
                    _ => true,
                })
                .cloned()
                .map(|e| Ok(SearchEvent::Entry(e)))
                .collect();
            Ok(Box::pin(stream::iter(matching)))
        }

        async fn test_filter(&self, _entry: &Entry, _filter: &str) -> CoreResult<TriState> {
            Ok(TriState::True)
        }

        async fn access_allowed(&self, _entry: &Entry, _descriptor: &str) -> CoreResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn cold_start_learns_max_and_validates_present_cookie() {
        let store = FakeStore {
            entries: vec![entry(1), entry(2), entry(3)],
        };
        let ctx = Context::new();
        let base = NormalizedDn("dc=x".into());
        let outcome = find_csn(&store, &ctx, &base, Scope::Subtree, &Csn::from_bytes(vec![2]))
            .await
            .unwrap();
        assert_eq!(outcome, FindCsnOutcome::Present);
        assert_eq!(ctx.get_context_csn(), Some(Csn::from_bytes(vec![3])));
    }

    #[tokio::test]
    async fn cold_start_detects_stale_cookie() {
        let store = FakeStore {
            entries: vec![entry(5), entry(6)],
        };
        let ctx = Context::new();
        let base = NormalizedDn("dc=x".into());
        let outcome = find_csn(&store, &ctx, &base, Scope::Subtree, &Csn::from_bytes(vec![2]))
            .await
            .unwrap();
        assert_eq!(outcome, FindCsnOutcome::NotPresent);
    }

    #[tokio::test]
    async fn find_present_batches_uuids() {
        let store = FakeStore {
            entries: vec![entry(1), entry(2), entry(3), entry(4)],
        };
        let base = NormalizedDn("dc=x".into());
        let batches = find_present(&store, &base, Scope::Subtree, &Csn::from_bytes(vec![4]), 2)
            .await
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
    }
}

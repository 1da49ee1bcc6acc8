//! End-to-end scenarios driving the coordinator and interceptor together
//! against an in-memory store, one per row of the scenario table.

use async_trait::async_trait;
use dirsync_core::error::Result as CoreResult;
use dirsync_core::id::{EntryId, EntryUuid};
use dirsync_provider::context::Context;
use dirsync_provider::coordinator::{run_search, CoordinatorEvent, SearchRequest};
use dirsync_provider::csn::{Cookie, CookieCodec, Csn};
use dirsync_provider::interceptor::{after_write, before_write};
use dirsync_provider::store::{DnLookup, Entry, EntryStore, Filter, SearchEvent, SearchStream, TriState};
use dirsync_provider::types::{NormalizedDn, Scope, SyncMode, WriteKind};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct MemStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemStore {
    fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, ndn: &str, csn: u8) -> Entry {
        let entry = Entry {
            id: EntryId(csn as u64),
            uuid: EntryUuid::new(),
            dn: ndn.to_string(),
            ndn: NormalizedDn(ndn.to_string()),
            csn: Csn::from_bytes(vec![csn]),
            is_referral: false,
            attrs: HashMap::new(),
        };
        self.entries.lock().insert(ndn.to_string(), entry.clone());
        entry
    }

    fn remove(&self, ndn: &str) {
        self.entries.lock().remove(ndn);
    }

    /// Advance an existing entry's CSN in place, preserving its identity
    /// (uuid/entry-id) — unlike `insert`, which always mints a fresh uuid.
    fn bump(&self, ndn: &str, csn: u8) -> Entry {
        let mut map = self.entries.lock();
        let mut entry = map.get(ndn).expect("entry exists").clone();
        entry.csn = Csn::from_bytes(vec![csn]);
        map.insert(ndn.to_string(), entry.clone());
        entry
    }
}

fn csn_from_filter(filter: &Filter) -> (Option<Csn>, Option<Csn>) {
    match filter {
        Filter::CsnLe(c) => (None, Some(c.clone())),
        Filter::CsnGe(c) => (Some(c.clone()), None),
        Filter::And(terms) => {
            let mut lo = None;
            let mut hi = None;
            for term in terms {
                let (l, h) = csn_from_filter(term);
                lo = lo.or(l);
                hi = hi.or(h);
            }
            (lo, hi)
        }
        Filter::Original(_) => (None, None),
    }
}

#[async_trait]
impl EntryStore for MemStore {
    async fn dn_to_entry(&self, ndn: &NormalizedDn) -> CoreResult<DnLookup> {
        match self.entries.lock().get(ndn.as_str()) {
            Some(e) => Ok(DnLookup::Found(e.clone())),
            None => Ok(DnLookup::NotFound),
        }
    }

    async fn entry_get_rw(&self, ndn: &NormalizedDn) -> CoreResult<Option<Entry>> {
        Ok(self.entries.lock().get(ndn.as_str()).cloned())
    }

    async fn entry_release(&self, _entry: Entry) -> CoreResult<()> {
        Ok(())
    }

    async fn backend_search(&self, base: &NormalizedDn, scope: Scope, filter: &Filter) -> CoreResult<SearchStream> {
        let (lo, hi) = csn_from_filter(filter);
        let matching: Vec<_> = self
            .entries
            .lock()
            .values()
            .filter(|e| scope.matches(base, &e.ndn))
            .filter(|e| lo.as_ref().is_none_or(|lo| &e.csn >= lo))
            .filter(|e| hi.as_ref().is_none_or(|hi| &e.csn <= hi))
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

fn limits() -> dirsync_core::config::Limits {
    dirsync_core::config::Limits::default()
}

async fn run(
    store: &Arc<MemStore>,
    ctx: &Arc<Context>,
    base: &str,
    mode: SyncMode,
    cookie: Cookie,
) -> (Vec<CoordinatorEvent>, Option<dirsync_provider::coordinator::SessionHandle>) {
    let store_dyn: Arc<dyn EntryStore> = store.clone();
    let req = SearchRequest {
        base: NormalizedDn(base.to_string()),
        scope: Scope::Subtree,
        filter_string: "(objectClass=*)".to_string(),
        mode,
        cookie,
        deref_during_search: false,
        reload_hint: false,
        session_id: "0".to_string(),
        request_id: "1".to_string(),
    };
    let (mut stream, session) = run_search(store_dyn, ctx.clone(), CookieCodec::new(128), limits(), req)
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    (events, session)
}

#[tokio::test]
async fn scenario_1_empty_db_refresh_only() {
    let store = Arc::new(MemStore::new());
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![]));

    let (events, session) = run(&store, &ctx, "dc=x", SyncMode::RefreshOnly, Cookie::default()).await;
    assert!(session.is_none());
    assert_eq!(events.len(), 1);
    match &events[0] {
        CoordinatorEvent::Done(done) => assert!(!done.refresh_deletes),
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_2_refresh_only_resends_newer_entry() {
    let store = Arc::new(MemStore::new());
    store.insert("dc=x", 0);
    let a = store.insert("cn=a,dc=x", 1);
    let b = store.insert("cn=b,dc=x", 2);
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![2]));

    let (events, _session) = run(&store, &ctx, "dc=x", SyncMode::RefreshOnly, Cookie::from_csn(Csn::from_bytes(vec![1]))).await;

    let entries: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CoordinatorEvent::Entry { entry, .. } => Some(entry.uuid),
            _ => None,
        })
        .collect();
    assert_eq!(entries, vec![b.uuid]);
    assert_ne!(entries[0], a.uuid);
    assert!(matches!(events.last(), Some(CoordinatorEvent::Done(_))));
}

#[tokio::test]
async fn scenario_3_persistent_search_sees_new_entry() {
    let store = Arc::new(MemStore::new());
    store.insert("dc=x", 0);
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![0]));

    let (_events, handle) = run(&store, &ctx, "dc=x", SyncMode::RefreshAndPersist, Cookie::default()).await;
    let mut handle = handle.expect("persist mode registers a session");

    let new_entry = Entry {
        id: EntryId(1),
        uuid: EntryUuid::new(),
        dn: "cn=new,dc=x".into(),
        ndn: NormalizedDn("cn=new,dc=x".into()),
        csn: Csn::from_bytes(vec![1]),
        is_referral: false,
        attrs: HashMap::new(),
    };
    let cookie = before_write(store.as_ref(), &ctx, &new_entry).await.unwrap();
    store.entries.lock().insert("cn=new,dc=x".into(), new_entry.clone());
    after_write(store.as_ref(), &ctx, WriteKind::Add, cookie, Csn::from_bytes(vec![1]), Some(&new_entry))
        .await
        .unwrap();

    let notification = handle.notifications.try_recv().expect("write delivered live");
    assert_eq!(notification.uuid, new_entry.uuid);
    assert_eq!(notification.state, dirsync_provider::emitter::SyncState::Add);
}

#[tokio::test]
async fn scenario_4_refresh_phase_writes_land_in_backlog_then_drain_in_order() {
    let store = Arc::new(MemStore::new());
    store.insert("dc=x", 0);
    let target = store.insert("cn=a,dc=x", 1);
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![1]));

    let store_dyn: Arc<dyn EntryStore> = store.clone();
    let req = SearchRequest {
        base: NormalizedDn("dc=x".to_string()),
        scope: Scope::Subtree,
        filter_string: "(objectClass=*)".to_string(),
        mode: SyncMode::RefreshAndPersist,
        cookie: Cookie::from_csn(Csn::from_bytes(vec![1])),
        deref_during_search: false,
        reload_hint: false,
        session_id: "0".to_string(),
        request_id: "1".to_string(),
    };
    let (mut stream, handle) = run_search(store_dyn, ctx.clone(), CookieCodec::new(128), limits(), req)
        .await
        .unwrap();
    let mut handle = handle.expect("persist mode registers a session");
    assert!(handle.session.is_refreshing());

    // Cookie CSN equals the context CSN, so FIND_CSN takes the shortcut
    // and the stream body never touches backend_search; only these two
    // writes populate the backlog.
    let modified = store.bump("cn=a,dc=x", 2);
    let pre_modify = before_write(store.as_ref(), &ctx, &target).await.unwrap();
    after_write(store.as_ref(), &ctx, WriteKind::Modify, pre_modify, Csn::from_bytes(vec![2]), Some(&modified))
        .await
        .unwrap();

    let pre_delete = before_write(store.as_ref(), &ctx, &modified).await.unwrap();
    store.remove("cn=a,dc=x");
    after_write(store.as_ref(), &ctx, WriteKind::Delete, pre_delete, Csn::from_bytes(vec![3]), None)
        .await
        .unwrap();

    assert!(
        handle.notifications.try_recv().is_err(),
        "writes queue while refreshing, not delivered live"
    );

    let mut saw_refresh_present = false;
    while let Some(event) = stream.next().await {
        if let CoordinatorEvent::Info(dirsync_provider::emitter::SyncInfoMessage::RefreshPresent { .. }) = event.unwrap() {
            saw_refresh_present = true;
        }
    }
    assert!(saw_refresh_present);
    assert!(!handle.session.is_refreshing());

    let first = handle.notifications.try_recv().expect("modify notification delivered");
    assert_eq!(first.state, dirsync_provider::emitter::SyncState::Modify);
    assert_eq!(first.uuid, target.uuid);

    let second = handle.notifications.try_recv().expect("delete notification delivered");
    assert_eq!(second.state, dirsync_provider::emitter::SyncState::Delete);
    assert_eq!(second.uuid, target.uuid);

    assert!(handle.notifications.try_recv().is_err(), "backlog empty after drain");
}

#[tokio::test]
async fn scenario_5_rename_of_base_invalidates_session() {
    let store = Arc::new(MemStore::new());
    store.insert("ou=a,dc=x", 0);
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![0]));

    let (_events, handle) = run(&store, &ctx, "ou=a,dc=x", SyncMode::RefreshAndPersist, Cookie::default()).await;
    let handle = handle.unwrap();
    assert_eq!(ctx.session_count(), 1);

    store.remove("ou=a,dc=x");
    store.insert("ou=a,dc=y", 1);

    let result = dirsync_provider::base_validator::validate_base(store.as_ref(), &handle.session).await;
    assert!(result.is_err());

    // Driving an unrelated write through the interceptor must also actually
    // terminate the invalidated session, not just report the error from a
    // direct `validate_base` call.
    let old_entry = store.entries.lock().get("ou=a,dc=y").unwrap().clone();
    let cookie = before_write(store.as_ref(), &ctx, &old_entry).await.unwrap();
    let new_entry = store.bump("ou=a,dc=y", 2);
    after_write(store.as_ref(), &ctx, WriteKind::Modify, cookie, new_entry.csn.clone(), Some(&new_entry))
        .await
        .unwrap();
    assert_eq!(ctx.session_count(), 0, "invalidated session must be dropped from the context");
}

#[tokio::test]
async fn scenario_6_cookie_equals_context_csn_shortcuts_refresh() {
    let store = Arc::new(MemStore::new());
    store.insert("dc=x", 0);
    store.insert("cn=a,dc=x", 99);
    let ctx = Arc::new(Context::new());
    ctx.learn_context_csn(Csn::from_bytes(vec![99]));

    let (events, session) = run(
        &store,
        &ctx,
        "dc=x",
        SyncMode::RefreshAndPersist,
        Cookie::from_csn(Csn::from_bytes(vec![99])),
    )
    .await;

    assert!(session.is_some());
    assert!(events.iter().all(|e| !matches!(e, CoordinatorEvent::Entry { .. })));
}

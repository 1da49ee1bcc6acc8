//! The external entry store contract (spec §6 "Store interface consumed").
//!
//! Everything in this module is a collaborator contract, not an
//! implementation: the underlying directory backend, access control,
//! schema, and the parent filter evaluator are explicitly out of scope
//! (spec §1). A hosting application implements [`EntryStore`] over its own
//! backend; this crate only calls it.

use crate::csn::Csn;
use crate::types::{EntryIdentity, NormalizedDn, Scope};
use async_trait::async_trait;
use dirsync_core::error::Result;
use dirsync_core::id::{EntryId, EntryUuid};
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// A directory entry as seen by the replication provider: enough to drive
/// scope/filter tests and build a sync state control, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub uuid: EntryUuid,
    pub dn: String,
    pub ndn: NormalizedDn,
    pub csn: Csn,
    /// True if this entry is a referral and must be emitted as a search
    /// reference rather than a search entry (spec §4.7).
    pub is_referral: bool,
    pub attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl Entry {
    pub fn identity(&self) -> EntryIdentity {
        EntryIdentity {
            ndn: self.ndn.clone(),
            uuid: self.uuid,
            id: self.id,
        }
    }

    /// Find an attribute by descriptor (spec §6 `attr_find`). Pure lookup
    /// on the already-fetched entry; does not round-trip to the store.
    pub fn attr_find(&self, descriptor: &str) -> Option<&[Vec<u8>]> {
        self.attrs.get(descriptor).map(Vec::as_slice)
    }
}

/// Outcome of resolving a DN to an entry (spec §6 `dn_to_entry`).
#[derive(Debug, Clone)]
pub enum DnLookup {
    Found(Entry),
    /// The DN does not exist, but an ancestor does; carries that ancestor's
    /// normalized DN (used by the Base Validator to report a clean
    /// not-found rather than a partial match).
    MatchedParent(NormalizedDn),
    NotFound,
}

/// A filter tree as rewritten by the Search Coordinator (spec §4.8:
/// `AND(entryCSN <= context-CSN, [entryCSN >= cookie-CSN], original-filter)`).
///
/// `Original` wraps the consumer's filter in its own string syntax, which
/// this crate never parses; evaluating it is delegated to
/// [`EntryStore::test_filter`].
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    CsnGe(Csn),
    CsnLe(Csn),
    Original(String),
}

impl Filter {
    /// Build the CSN-range-extended filter the Search Coordinator runs
    /// against the backend (spec §4.8 step 4).
    pub fn with_csn_range(context_csn: Csn, cookie_csn: Option<Csn>, original: Option<String>) -> Self {
        let mut terms = vec![Filter::CsnLe(context_csn)];
        if let Some(csn) = cookie_csn {
            terms.push(Filter::CsnGe(csn));
        }
        if let Some(original) = original {
            terms.push(Filter::Original(original));
        }
        Filter::And(terms)
    }
}

/// Three-valued filter evaluation result (spec §6: `TRUE|FALSE|UNDEFINED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    True,
    False,
    Undefined,
}

impl TriState {
    pub fn is_true(self) -> bool {
        matches!(self, TriState::True)
    }
}

/// One item streamed out of [`EntryStore::backend_search`] (spec §6:
/// "streams REP_SEARCH/REP_SEARCHREF/REP_RESULT").
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Entry(Entry),
    Reference(Entry),
    /// Terminal event; carries nothing extra today, but keeps the stream
    /// shape symmetric with the framework's REP_RESULT callback.
    Done,
}

pub type SearchStream = Pin<Box<dyn Stream<Item = Result<SearchEvent>> + Send>>;

/// The collaborator contract this crate consumes but never implements
/// (spec §6).
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Resolve a normalized DN to its entry (spec §6 `dn_to_entry`).
    async fn dn_to_entry(&self, ndn: &NormalizedDn) -> Result<DnLookup>;

    /// Fetch an entry for read/write under the store's own locking,
    /// conceptually paired with [`EntryStore::entry_release`] (spec §6
    /// `entry_get_rw`/`entry_release`).
    async fn entry_get_rw(&self, ndn: &NormalizedDn) -> Result<Option<Entry>>;

    /// Release an entry obtained from [`EntryStore::entry_get_rw`].
    async fn entry_release(&self, entry: Entry) -> Result<()>;

    /// Run a search against the backend, extended with the CSN-range
    /// filter the Search Coordinator built (spec §6 `backend_search`).
    async fn backend_search(&self, base: &NormalizedDn, scope: Scope, filter: &Filter) -> Result<SearchStream>;

    /// Evaluate the consumer-supplied filter sub-tree against an entry
    /// (spec §6 `test_filter`). CSN range terms are evaluated by this
    /// crate directly against [`Entry::csn`]; only [`Filter::Original`]
    /// reaches this method.
    async fn test_filter(&self, entry: &Entry, filter: &str) -> Result<TriState>;

    /// Access-control check for an attribute of an entry (spec §6
    /// `access_allowed`, `ACL_AUTH`).
    async fn access_allowed(&self, entry: &Entry, descriptor: &str) -> Result<bool>;
}

/// Evaluate a (possibly CSN-range-extended) filter against an entry,
/// resolving CSN comparisons directly and delegating only
/// [`Filter::Original`] sub-trees to the store (spec §4.8, §6).
pub async fn evaluate_filter(store: &dyn EntryStore, entry: &Entry, filter: &Filter) -> Result<TriState> {
    match filter {
        Filter::CsnGe(csn) => Ok(bool_to_tri(&entry.csn >= csn)),
        Filter::CsnLe(csn) => Ok(bool_to_tri(&entry.csn <= csn)),
        Filter::Original(s) => store.test_filter(entry, s).await,
        Filter::And(terms) => {
            let mut saw_undefined = false;
            for term in terms {
                match Box::pin(evaluate_filter(store, entry, term)).await? {
                    TriState::False => return Ok(TriState::False),
                    TriState::Undefined => saw_undefined = true,
                    TriState::True => {}
                }
            }
            Ok(if saw_undefined { TriState::Undefined } else { TriState::True })
        }
    }
}

fn bool_to_tri(b: bool) -> TriState {
    if b { TriState::True } else { TriState::False }
}

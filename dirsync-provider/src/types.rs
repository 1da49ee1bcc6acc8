//! Shared data-model types (spec §3).

use crate::csn::Csn;
use dirsync_core::id::{EntryId, EntryUuid};
use std::collections::HashSet;

/// A normalized distinguished name, used everywhere identity comparisons
/// happen (spec §3: "Entry identity" is `(normalized-DN, entry-UUID,
/// entry-ID)"). Kept as an opaque newtype so callers cannot accidentally
/// compare an un-normalized DN against one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedDn(pub String);

impl NormalizedDn {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` is `other` or a descendant of it, by suffix match on
    /// normalized RDN components. A real backend would resolve this via
    /// schema-aware DN comparison; normalized-suffix match is sufficient
    /// for the scope tests this crate performs itself.
    pub fn is_or_is_below(&self, other: &NormalizedDn) -> bool {
        self.0 == other.0 || self.0.ends_with(&format!(",{}", other.0))
    }

    /// True if `self` is an immediate child of `other`.
    pub fn is_immediate_child_of(&self, other: &NormalizedDn) -> bool {
        self.is_or_is_below(other)
            && self.0 != other.0
            && self.0[..self.0.len() - other.0.len() - 1]
                .rsplit_once(',')
                .is_none()
    }
}

/// Identity of a directory entry (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIdentity {
    pub ndn: NormalizedDn,
    pub uuid: EntryUuid,
    pub id: EntryId,
}

/// Search scope, as recorded on a persistent session (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
    /// Strict descendants only, excluding the base itself.
    Subordinate,
}

impl Scope {
    /// Scope test used by both the Base Validator (§4.3) and the Match
    /// Engine (§4.6): is `candidate` within `scope` of `base`?
    pub fn matches(self, base: &NormalizedDn, candidate: &NormalizedDn) -> bool {
        match self {
            Scope::Base => candidate == base,
            Scope::OneLevel => candidate.is_immediate_child_of(base),
            Scope::Subtree => candidate.is_or_is_below(base),
            Scope::Subordinate => candidate != base && candidate.is_or_is_below(base),
        }
    }
}

/// Which synchronization mode a consumer requested (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    RefreshOnly,
    RefreshAndPersist,
}

/// The kind of write transaction the Write Interceptor observed (spec
/// §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Add,
    Modify,
    ModRdn,
    Delete,
    ExtendedWrite,
}

/// The notification mode emitted for a single session/write pair (spec
/// §3 "Queued Result", §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Add,
    Modify,
    Delete,
    /// Same entry re-observed via a search reference (spec §4.7).
    ReferenceOfSame,
}

/// One deferred notification queued on a session's backlog during refresh
/// (spec §3 "Queued Result"). Carries copies, not pointers into the store.
#[derive(Debug, Clone)]
pub struct QueuedResult {
    pub mode: NotifyMode,
    pub uuid: EntryUuid,
    /// DN prior to any rename the causing write performed, if relevant.
    pub pre_move_dn: Option<NormalizedDn>,
    pub ndn: NormalizedDn,
    pub csn: Csn,
    pub is_referral: bool,
}

/// Per-write transient state (spec §3 "Per-Write Cookie (opcookie)").
///
/// Captured by the Match Engine's pre-pass (§4.6 step 1) and consumed by
/// its post-pass; never stored beyond the lifetime of a single write.
#[derive(Debug, Clone)]
pub struct OpCookie {
    pub pre_dn: NormalizedDn,
    pub pre_ndn: NormalizedDn,
    pub uuid: EntryUuid,
    pub is_referral: bool,
    /// Sessions whose filter/scope matched the entry *before* the write
    /// (spec §4.6 pre-pass step 2).
    pub matched_before: HashSet<String>,
    /// Assigned once the write commits.
    pub commit_csn: Option<Csn>,
}

impl OpCookie {
    pub fn new(pre_dn: NormalizedDn, pre_ndn: NormalizedDn, uuid: EntryUuid, is_referral: bool) -> Self {
        Self {
            pre_dn,
            pre_ndn,
            uuid,
            is_referral,
            matched_before: HashSet::new(),
            commit_csn: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> NormalizedDn {
        NormalizedDn(s.to_string())
    }

    #[test]
    fn subtree_includes_base_and_descendants() {
        let base = dn("dc=x");
        assert!(Scope::Subtree.matches(&base, &dn("dc=x")));
        assert!(Scope::Subtree.matches(&base, &dn("cn=a,dc=x")));
        assert!(Scope::Subtree.matches(&base, &dn("cn=a,cn=b,dc=x")));
        assert!(!Scope::Subtree.matches(&base, &dn("dc=y")));
    }

    #[test]
    fn subordinate_excludes_base() {
        let base = dn("dc=x");
        assert!(!Scope::Subordinate.matches(&base, &dn("dc=x")));
        assert!(Scope::Subordinate.matches(&base, &dn("cn=a,dc=x")));
    }

    #[test]
    fn one_level_is_immediate_children_only() {
        let base = dn("dc=x");
        assert!(Scope::OneLevel.matches(&base, &dn("cn=a,dc=x")));
        assert!(!Scope::OneLevel.matches(&base, &dn("cn=a,cn=b,dc=x")));
        assert!(!Scope::OneLevel.matches(&base, &dn("dc=x")));
    }

    #[test]
    fn base_scope_is_dn_equality() {
        let base = dn("dc=x");
        assert!(Scope::Base.matches(&base, &dn("dc=x")));
        assert!(!Scope::Base.matches(&base, &dn("cn=a,dc=x")));
    }
}

//! Base Validator (spec §4.3): confirms a persistent session's search base
//! still resolves to the identity it was registered with.

use crate::error::{Result, SyncProvError};
use crate::session::Session;
use crate::store::{DnLookup, Entry, EntryStore};
use tracing::warn;

/// Resolve `session`'s base and compare it against the identity recorded
/// on first validation (spec §4.3, invariant 4: "a session's base identity,
/// once recorded, never changes for the life of the session").
///
/// Returns the current base entry on success. On a DN that no longer
/// resolves, or one that resolves to a different UUID/entry-ID than what
/// was recorded, the session is considered invalidated and must be torn
/// down with a "no such object" final message.
pub async fn validate_base(store: &dyn EntryStore, session: &Session) -> Result<Entry> {
    let lookup = store.dn_to_entry(&session.base).await.map_err(SyncProvError::Core)?;

    let entry = match lookup {
        DnLookup::Found(entry) => entry,
        DnLookup::MatchedParent(_) | DnLookup::NotFound => {
            warn!(session_id = %session.session_id, "session base no longer resolves");
            return Err(SyncProvError::BaseInvalidated {
                session_id: session.session_id.clone(),
            });
        }
    };

    let observed = entry.identity();
    let recorded = session.stamp_or_get_base_identity(observed.clone());
    if recorded != observed {
        warn!(session_id = %session.session_id, "session base identity changed");
        return Err(SyncProvError::BaseInvalidated {
            session_id: session.session_id.clone(),
        });
    }

    Ok(entry)
}

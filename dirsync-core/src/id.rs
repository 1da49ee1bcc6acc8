//! Stable entry identifiers (spec §3: "Entry identity").

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The UUID half of an entry's identity. Stable across rename; carried in
/// every sync state control as `entryUUID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryUuid(Uuid);

impl EntryUuid {
    /// Generate a new random entry UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw bytes, as carried in the `entryUUID` octet string.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntryUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntryUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntryUuid> for Uuid {
    fn from(id: EntryUuid) -> Self {
        id.0
    }
}

impl std::str::FromStr for EntryUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A store-local integer identifying an entry's current storage slot
/// (spec §3: "a cheap equality check to detect 'same-slot' entries").
///
/// Unlike [`EntryUuid`], this value does *not* survive rename in every
/// backend; the Base Validator uses disagreement between an observed
/// `EntryId` and a session's recorded one as one of the two base-change
/// invalidation signals (spec §3, invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

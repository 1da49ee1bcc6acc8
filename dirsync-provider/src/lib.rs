//! Directory replication provider: refresh and refresh-and-persist
//! session handling for an eventually-consistent directory mirror.
//!
//! This crate implements the provider side of directory synchronization:
//! given a search bearing a synchronization cookie, it determines the
//! differential set of entries a consumer has not yet seen, keeps a
//! persistent session open for consumers that want to keep streaming
//! writes, and fans out every committed write against the active session
//! list. The underlying entry store, access control, schema, and wire
//! encoding are external collaborators declared in [`store::EntryStore`];
//! this crate never implements them.

pub mod base_validator;
pub mod context;
pub mod coordinator;
pub mod csn;
pub mod csn_finder;
pub mod emitter;
pub mod error;
pub mod interceptor;
pub mod match_engine;
pub mod session;
pub mod store;
pub mod types;

pub use context::Context;
pub use coordinator::{run_search, CoordinatorEvent, CoordinatorStream, SearchRequest};
pub use csn::{Cookie, CookieCodec, Csn};
pub use error::{Result, SyncProvError};
pub use session::{Session, SessionParams};
pub use store::{Entry, EntryStore};
pub use types::{NormalizedDn, Scope, SyncMode};

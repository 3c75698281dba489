// SCA Storage Layer
//
// Memory store with pluggable backends

pub mod error;
pub mod trait_;
pub mod memory;
pub mod eviction;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::StorageError;
pub use eviction::{Evictor, InlineEvictor, EVICTABLE_MAX_IMPORTANCE};
pub use memory::InMemoryBackend;
pub use store::MemoryStore;
pub use trait_::*;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

//! Durable storage for documents and their processing state.
//!
//! The [`StateStore`] trait is the source of truth for the pipeline; the
//! in-memory lock table kept by the lock manager is only a cache over it.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use traits::{StateFilter, StateStore, StoreError};

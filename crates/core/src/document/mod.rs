//! Document data model.
//!
//! A [`Document`] is the unit of content moving through the pipeline and
//! [`DocumentState`] is its durable processing record (stage, transition
//! history, lock, version).

mod types;

pub use types::{
    content_hash, Document, DocumentState, DocumentStatus, ErrorInfo, HistoryEntry, Lock, Stage,
    StateTransition,
};

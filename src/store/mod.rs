//! Evidence persistence.
//!
//! The loop hands every finalized clip to exactly one `EvidenceStore::save`
//! call (plus configured retries). Stores are the only component allowed to
//! write clips anywhere.

#[cfg(feature = "remote-store")]
mod http;
mod memory;
mod sqlite;

#[cfg(feature = "remote-store")]
pub use http::HttpEvidenceStore;
pub use memory::MemoryEvidenceStore;
pub use sqlite::{ClipSummary, SqliteEvidenceStore, StoredClip};

use anyhow::Result;

use crate::capture::EvidenceRecord;

/// Acknowledgement returned by a successful save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveAck {
    /// Store-assigned identifier for the clip.
    pub id: String,
}

pub trait EvidenceStore: Send {
    /// Store identifier for logs.
    fn name(&self) -> &'static str;

    fn save(&mut self, record: &EvidenceRecord) -> Result<SaveAck>;
}

impl<S: EvidenceStore + ?Sized> EvidenceStore for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn save(&mut self, record: &EvidenceRecord) -> Result<SaveAck> {
        (**self).save(record)
    }
}

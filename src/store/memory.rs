use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::{EvidenceStore, SaveAck};
use crate::capture::EvidenceRecord;

/// In-process store. Clones share the same records, so a handle kept
/// outside the loop can inspect what was saved.
#[derive(Clone, Default)]
pub struct MemoryEvidenceStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<EvidenceRecord>,
    attempts: u64,
    failures_remaining: u32,
    always_fail: bool,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `failures` saves, then accept.
    pub fn failing_next(failures: u32) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.failures_remaining = failures;
        }
        store
    }

    /// Reject every save.
    pub fn always_failing() -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.always_fail = true;
        }
        store
    }

    pub fn records(&self) -> Vec<EvidenceRecord> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    /// Save calls received, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.inner.lock().map(|inner| inner.attempts).unwrap_or(0)
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn save(&mut self, record: &EvidenceRecord) -> Result<SaveAck> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        inner.attempts += 1;
        if inner.always_fail {
            return Err(anyhow!("memory store rejected save"));
        }
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(anyhow!("memory store rejected save"));
        }
        inner.records.push(record.clone());
        Ok(SaveAck {
            id: format!("mem:{}", inner.records.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_then_accepts() {
        let store = MemoryEvidenceStore::failing_next(1);
        let mut handle = store.clone();
        let record = EvidenceRecord::from_payload(b"x", 7, "video/webm");
        assert!(handle.save(&record).is_err());
        assert_eq!(handle.save(&record).unwrap().id, "mem:1");
        assert_eq!(store.attempts(), 2);
        assert_eq!(store.records(), vec![record]);
    }
}

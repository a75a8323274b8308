use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use super::{EvidenceStore, SaveAck};
use crate::capture::EvidenceRecord;
use crate::clock::{Clock, SystemClock};

/// Local clip table backed by SQLite.
pub struct SqliteEvidenceStore {
    conn: Connection,
}

/// A clip as stored, with its row id and insertion time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredClip {
    pub id: i64,
    pub created_at_ms: u64,
    pub record: EvidenceRecord,
}

/// Clip metadata without the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClipSummary {
    pub id: i64,
    pub created_at_ms: u64,
    pub captured_at_ms: u64,
    pub byte_len: u64,
    pub sha256: String,
    pub mime_type: String,
}

impl StoredClip {
    pub fn summary(&self) -> ClipSummary {
        ClipSummary {
            id: self.id,
            created_at_ms: self.created_at_ms,
            captured_at_ms: self.record.timestamp,
            byte_len: self.record.byte_len,
            sha256: self.record.sha256.clone(),
            mime_type: self.record.mime_type.clone(),
        }
    }
}

type ClipRow = (i64, i64, i64, String, i64, String, String);

const SELECT_CLIP: &str =
    "SELECT id, created_at, captured_at, video, byte_len, sha256, mime_type FROM clips";

impl SqliteEvidenceStore {
    /// Open (or create) a clip database. `file:` URIs are honored, so
    /// shared in-memory databases work too.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = if db_path.starts_with("file:") {
            Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?
        } else {
            Connection::open(db_path)?
        };
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS clips (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              captured_at INTEGER NOT NULL,
              video TEXT NOT NULL,
              byte_len INTEGER NOT NULL,
              sha256 TEXT NOT NULL,
              mime_type TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clips_captured ON clips(captured_at);
            "#,
        )?;
        Ok(())
    }

    /// Most recent clips first.
    pub fn list(&self, limit: usize) -> Result<Vec<StoredClip>> {
        let limit = i64::try_from(limit).map_err(|_| anyhow!("limit exceeds i64 range"))?;
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY id DESC LIMIT ?1", SELECT_CLIP))?;
        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(clip_from_row((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))?);
        }
        Ok(out)
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredClip>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", SELECT_CLIP))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(clip_from_row((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clips", [], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| anyhow!("corrupt clip count"))
    }
}

impl EvidenceStore for SqliteEvidenceStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn save(&mut self, record: &EvidenceRecord) -> Result<SaveAck> {
        let created_at = i64::try_from(SystemClock.now_ms())
            .map_err(|_| anyhow!("current time exceeds i64 range"))?;
        let captured_at = i64::try_from(record.timestamp)
            .map_err(|_| anyhow!("capture timestamp exceeds i64 range"))?;
        let byte_len = i64::try_from(record.byte_len)
            .map_err(|_| anyhow!("clip length exceeds i64 range"))?;
        self.conn.execute(
            "INSERT INTO clips(created_at, captured_at, video, byte_len, sha256, mime_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                created_at,
                captured_at,
                record.video,
                byte_len,
                record.sha256,
                record.mime_type
            ],
        )?;
        Ok(SaveAck {
            id: self.conn.last_insert_rowid().to_string(),
        })
    }
}

fn clip_from_row(row: ClipRow) -> Result<StoredClip> {
    let (id, created_at, captured_at, video, byte_len, sha256, mime_type) = row;
    let non_negative = |value: i64, column: &str| {
        u64::try_from(value).map_err(|_| anyhow!("corrupt clip {}: negative {}", id, column))
    };
    Ok(StoredClip {
        id,
        created_at_ms: non_negative(created_at, "created_at")?,
        record: EvidenceRecord {
            video,
            timestamp: non_negative(captured_at, "captured_at")?,
            byte_len: non_negative(byte_len, "byte_len")?,
            sha256,
            mime_type,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_get() {
        let mut store = SqliteEvidenceStore::open_in_memory().unwrap();
        let record = EvidenceRecord::from_payload(b"webm-bytes", 1_700_000_000_000, "video/webm");
        let ack = store.save(&record).unwrap();
        assert_eq!(ack.id, "1");

        let stored = store.get(1).unwrap().expect("stored clip");
        assert_eq!(stored.record, record);
        assert_eq!(stored.summary().captured_at_ms, 1_700_000_000_000);
        assert!(store.get(2).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }
}

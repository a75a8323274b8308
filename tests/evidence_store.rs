use tempfile::tempdir;

use cidroy::store::SqliteEvidenceStore;
use cidroy::{EvidenceRecord, EvidenceStore};

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("clips.db");
    let db_path = db_path.to_str().expect("utf-8 path");

    {
        let mut store = SqliteEvidenceStore::open(db_path).expect("open store");
        for (i, payload) in [&b"first-clip"[..], &b"second-clip"[..], &b"third-clip"[..]]
            .into_iter()
            .enumerate()
        {
            let record =
                EvidenceRecord::from_payload(payload, 1_700_000_000_000 + i as u64, "video/webm");
            store.save(&record).expect("save clip");
        }
    }

    let store = SqliteEvidenceStore::open(db_path).expect("reopen store");
    assert_eq!(store.count().unwrap(), 3);

    let newest = store.list(2).expect("list clips");
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].id, 3);
    assert_eq!(newest[1].id, 2);
    assert_eq!(newest[0].record.decode_payload().unwrap(), b"third-clip");
    assert_eq!(newest[0].summary().captured_at_ms, 1_700_000_000_002);
    assert_eq!(newest[0].summary().byte_len, 10);

    let first = store.get(1).unwrap().expect("first clip");
    assert_eq!(first.record.decode_payload().unwrap(), b"first-clip");
}

#[test]
fn tampered_payload_fails_digest_check() {
    let mut record = EvidenceRecord::from_payload(b"original", 42, "video/webm");
    let other = EvidenceRecord::from_payload(b"replaced", 42, "video/webm");
    record.video = other.video;
    assert!(record.decode_payload().is_err());
}

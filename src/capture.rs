//! Capture sessions and evidence records.
//!
//! A `CaptureSession` lives from the moment the capture rule fires until the
//! clip is finalized or abandoned. Finalizing concatenates the fragments and
//! encodes them into an `EvidenceRecord` for the persistence collaborator.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MIME_TYPE: &str = "video/webm";

/// One open capture.
#[derive(Debug)]
pub struct CaptureSession {
    started_at_ms: u64,
    deadline_ms: u64,
    fragments: Vec<Vec<u8>>,
}

impl CaptureSession {
    pub fn new(started_at_ms: u64, duration_ms: u64) -> Self {
        Self {
            started_at_ms,
            deadline_ms: started_at_ms.saturating_add(duration_ms),
            fragments: Vec::new(),
        }
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }

    /// Append fragments in order. Empty fragments are dropped.
    pub fn push_fragments<I: IntoIterator<Item = Vec<u8>>>(&mut self, fragments: I) -> usize {
        let before = self.fragments.len();
        self.fragments
            .extend(fragments.into_iter().filter(|fragment| !fragment.is_empty()));
        self.fragments.len() - before
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn byte_len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenate, hash and encode the clip. Consumes the session.
    pub fn finish(self, mime_type: &str) -> EvidenceRecord {
        let mut payload = Vec::with_capacity(self.byte_len());
        for fragment in self.fragments {
            payload.extend_from_slice(&fragment);
        }
        EvidenceRecord::from_payload(&payload, self.started_at_ms, mime_type)
    }
}

/// Finalized clip, ready for persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// `data:<mime>;base64,<payload>` URL.
    pub video: String,
    /// Capture start, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Raw clip size before encoding.
    pub byte_len: u64,
    /// Hex SHA-256 of the raw clip.
    pub sha256: String,
    pub mime_type: String,
}

impl EvidenceRecord {
    pub fn from_payload(payload: &[u8], timestamp: u64, mime_type: &str) -> Self {
        Self {
            video: encode_data_url(mime_type, payload),
            timestamp,
            byte_len: payload.len() as u64,
            sha256: hex::encode(Sha256::digest(payload)),
            mime_type: mime_type.to_string(),
        }
    }

    /// Decode the clip bytes and check them against the recorded digest.
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        let payload = decode_data_url(&self.video)?;
        let digest = hex::encode(Sha256::digest(&payload));
        if digest != self.sha256 {
            return Err(anyhow!(
                "clip digest mismatch (stored={}, computed={})",
                self.sha256,
                digest
            ));
        }
        Ok(payload)
    }
}

pub fn encode_data_url(mime_type: &str, payload: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(payload))
}

pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("clip payload is not a data URL"))?;
    let (_, encoded) = rest
        .split_once(";base64,")
        .ok_or_else(|| anyhow!("clip payload is not base64 encoded"))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| anyhow!("invalid base64 clip payload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_deadline_is_fixed_from_start() {
        let session = CaptureSession::new(10_000, 5_000);
        assert_eq!(session.deadline_ms(), 15_000);
        assert!(!session.is_due(14_999));
        assert!(session.is_due(15_000));
    }

    #[test]
    fn finish_concatenates_in_order() {
        let mut session = CaptureSession::new(42, 5_000);
        assert_eq!(session.push_fragments(vec![b"ab".to_vec(), Vec::new()]), 1);
        assert_eq!(session.push_fragments(vec![b"cde".to_vec()]), 1);
        assert_eq!(session.byte_len(), 5);

        let record = session.finish(DEFAULT_MIME_TYPE);
        assert_eq!(record.timestamp, 42);
        assert_eq!(record.byte_len, 5);
        assert_eq!(record.video, "data:video/webm;base64,YWJjZGU=");
        assert_eq!(record.decode_payload().unwrap(), b"abcde");
    }

    #[test]
    fn decode_detects_tampering() {
        let mut record = EvidenceRecord::from_payload(b"clip", 1, DEFAULT_MIME_TYPE);
        record.video = encode_data_url(DEFAULT_MIME_TYPE, b"clop");
        assert!(record.decode_payload().is_err());
    }

    #[test]
    fn rejects_malformed_data_urls() {
        assert!(decode_data_url("https://example.test/clip.webm").is_err());
        assert!(decode_data_url("data:video/webm,raw").is_err());
        assert!(decode_data_url("data:video/webm;base64,@@@").is_err());
    }
}

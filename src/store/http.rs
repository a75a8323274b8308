#![cfg(feature = "remote-store")]

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;

use super::{EvidenceStore, SaveAck};
use crate::capture::EvidenceRecord;

/// Posts clips to a remote evidence endpoint as
/// `{"video": "<data url>", "timestamp": <ms>}` JSON.
pub struct HttpEvidenceStore {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpEvidenceStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "evidence endpoint must be an http(s) URL, got '{}'",
                endpoint
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            endpoint: endpoint.to_string(),
            agent,
        })
    }
}

impl EvidenceStore for HttpEvidenceStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn save(&mut self, record: &EvidenceRecord) -> Result<SaveAck> {
        let body = json!({
            "video": record.video,
            "timestamp": record.timestamp,
        });
        let response = match self.agent.post(&self.endpoint).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("evidence endpoint returned HTTP {}", code));
            }
            Err(err) => return Err(anyhow!("evidence upload failed: {}", err)),
        };
        let body = response
            .into_string()
            .map_err(|e| anyhow!("failed to read evidence endpoint response: {}", e))?;
        Ok(SaveAck {
            id: ack_id(&body).unwrap_or_else(|| "remote".to_string()),
        })
    }
}

/// `id` from a JSON acknowledgement body, if it carries one.
fn ack_id(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value.get("id").and_then(|id| id.as_str()).map(str::to_string),
        Err(err) => {
            log::warn!("evidence endpoint returned a non-JSON body: {}", err);
            None
        }
    }
}

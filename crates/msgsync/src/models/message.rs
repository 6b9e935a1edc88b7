//! Raw message payloads handed from adapters to the persistence gateway

use serde::{Deserialize, Serialize};

/// A message exactly as the adapter produced it
///
/// The sync core never inspects `payload`; `external_id` is the identity the
/// persistence gateway deduplicates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub external_id: String,
    pub payload: serde_json::Value,
}

impl RawMessage {
    pub fn new(external_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            external_id: external_id.into(),
            payload,
        }
    }
}

/// Result of handing a batch of messages to the persistence gateway
///
/// Per-message failures are counted here rather than raised; they never
/// fail the run on their own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistStats {
    pub succeeded: usize,
    pub failed: usize,
}

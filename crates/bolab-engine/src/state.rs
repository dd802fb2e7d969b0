//! Opaque optimizer-state envelope and its on-disk encoding.

use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::schema::SchemaVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by the current state envelope.
pub const STATE_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Persisted optimizer state: the engine's opaque blob tagged with the
/// campaign content hash it was built from.
///
/// A state whose tag differs from the live campaign's `config_hash()` is
/// stale and must never be used for suggestions without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Envelope schema version.
    pub schema: SchemaVersion,
    /// Content hash of the campaign definition the blob was built from.
    pub config_hash: String,
    /// Build timestamp.
    pub built_at: DateTime<Utc>,
    /// Engine-owned opaque payload.
    pub blob: Vec<u8>,
}

impl OptimizerState {
    /// Wraps a freshly built engine blob, stamped now.
    pub fn new(config_hash: impl Into<String>, blob: Vec<u8>) -> Self {
        Self {
            schema: STATE_SCHEMA,
            config_hash: config_hash.into(),
            built_at: Utc::now(),
            blob,
        }
    }

    /// True when the state was built from the given campaign hash.
    pub fn matches(&self, config_hash: &str) -> bool {
        self.config_hash == config_hash
    }

    /// Encodes the envelope for atomic persistence.
    pub fn encode(&self) -> Result<Vec<u8>, BolabError> {
        bincode::serialize(self).map_err(|err| {
            BolabError::Storage(ErrorInfo::new("state-serialize", err.to_string()))
        })
    }

    /// Decodes a persisted envelope, rejecting unreadable schemas.
    pub fn decode(bytes: &[u8]) -> Result<Self, BolabError> {
        let state: OptimizerState = bincode::deserialize(bytes).map_err(|err| {
            BolabError::Stale(
                ErrorInfo::new("state-parse", "persisted optimizer state is unreadable")
                    .with_hint(err.to_string()),
            )
        })?;
        if !state.schema.readable_by(STATE_SCHEMA) {
            return Err(BolabError::Stale(
                ErrorInfo::new("state-schema-ahead", "optimizer state schema is newer than supported")
                    .with_context("stored", state.schema.to_string())
                    .with_context("supported", STATE_SCHEMA.to_string()),
            ));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let state = OptimizerState::new("abc123", vec![1, 2, 3]);
        let decoded = OptimizerState::decode(&state.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, state);
        assert!(decoded.matches("abc123"));
        assert!(!decoded.matches("other"));
    }

    #[test]
    fn garbage_bytes_decode_as_stale() {
        let err = OptimizerState::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, BolabError::Stale(_)));
    }
}

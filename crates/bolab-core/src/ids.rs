//! Identifier newtypes for campaigns and suggestion batches.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BolabError, ErrorInfo};

/// Identifier for one optimization campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(Uuid);

impl CampaignId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its string representation.
    pub fn parse(raw: &str) -> Result<Self, BolabError> {
        Uuid::parse_str(raw).map(Self).map_err(|err| {
            BolabError::Validation(
                ErrorInfo::new("campaign-id-parse", "malformed campaign identifier")
                    .with_context("raw", raw)
                    .with_hint(err.to_string()),
            )
        })
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for one generated suggestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its string representation.
    pub fn parse(raw: &str) -> Result<Self, BolabError> {
        Uuid::parse_str(raw).map(Self).map_err(|err| {
            BolabError::Validation(
                ErrorInfo::new("batch-id-parse", "malformed batch identifier")
                    .with_context("raw", raw)
                    .with_hint(err.to_string()),
            )
        })
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//! Workspace-level persistent settings (last campaign, recent campaigns).
//!
//! Modeled as an explicitly constructed service rather than an implicit
//! process-wide singleton; callers own the store and its lifetime.

use std::fs;
use std::path::PathBuf;

use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::ids::CampaignId;
use bolab_core::schema::SchemaVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::atomic_write;

/// Maximum number of entries retained in the recent-campaigns list.
pub const RECENT_CAMPAIGN_COUNT: usize = 5;

const SETTINGS_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// One entry in the recent-campaigns list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentCampaign {
    /// Campaign identity.
    pub id: CampaignId,
    /// Display name at the time of access.
    pub name: String,
    /// Last access timestamp.
    pub accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct SettingsPayload {
    #[serde(default)]
    schema: Option<SchemaVersion>,
    #[serde(default)]
    last_campaign: Option<CampaignId>,
    #[serde(default)]
    recent: Vec<RecentCampaign>,
}

/// Persistent settings service backed by one JSON file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Opens a settings store backed by the given file path. The file is
    /// created lazily on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Records an access to a campaign: it becomes the last campaign and
    /// moves to the front of the recent list (capped at
    /// [`RECENT_CAMPAIGN_COUNT`]).
    pub fn record_access(
        &self,
        id: CampaignId,
        name: impl Into<String>,
    ) -> Result<(), BolabError> {
        let mut payload = self.load();
        payload.last_campaign = Some(id);
        payload.recent.retain(|entry| entry.id != id);
        payload.recent.insert(
            0,
            RecentCampaign {
                id,
                name: name.into(),
                accessed_at: Utc::now(),
            },
        );
        payload.recent.truncate(RECENT_CAMPAIGN_COUNT);
        self.save(&payload)
    }

    /// Identity of the most recently accessed campaign, if any.
    pub fn last_campaign(&self) -> Option<CampaignId> {
        self.load().last_campaign
    }

    /// Recent campaigns, most recently accessed first.
    pub fn recent_campaigns(&self) -> Vec<RecentCampaign> {
        self.load().recent
    }

    /// Tolerant load: a missing or unreadable settings file starts empty
    /// rather than blocking the application.
    fn load(&self) -> SettingsPayload {
        let Ok(bytes) = fs::read(&self.path) else {
            return SettingsPayload::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    fn save(&self, payload: &SettingsPayload) -> Result<(), BolabError> {
        let mut stamped = payload.clone();
        stamped.schema = Some(SETTINGS_SCHEMA);
        let bytes = serde_json::to_vec_pretty(&stamped).map_err(|err| {
            BolabError::Storage(ErrorInfo::new("settings-serialize", err.to_string()))
        })?;
        atomic_write(&self.path, &bytes)
    }
}

//! Campaign configuration: identity, parameter space, objectives, settings.

use std::collections::BTreeMap;

use bolab_core::canonical::stable_hash_string;
use bolab_core::errors::BolabError;
use bolab_core::ids::CampaignId;
use bolab_core::schema::SchemaVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::migrate::CONFIG_SCHEMA;
use crate::objective::ObjectiveSet;
use crate::parameter::ParameterSpace;

/// Opaque surrogate/acquisition configuration handed to the engine.
///
/// The core never interprets these values beyond hashing them; they ride
/// along into the engine campaign projection untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Surrogate model selector.
    #[serde(default = "EngineSettings::default_surrogate")]
    pub surrogate: String,
    /// Acquisition function selector.
    #[serde(default = "EngineSettings::default_acquisition")]
    pub acquisition: String,
    /// Arbitrary engine tuning knobs.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl EngineSettings {
    fn default_surrogate() -> String {
        "gaussian-process".to_string()
    }

    fn default_acquisition() -> String {
        "q-log-ei".to_string()
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            surrogate: Self::default_surrogate(),
            acquisition: Self::default_acquisition(),
            options: BTreeMap::new(),
        }
    }
}

/// Versioned, serializable definition of one optimization campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Stable campaign identity.
    pub id: CampaignId,
    /// Human readable campaign name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Controllable variables.
    pub parameters: ParameterSpace,
    /// Measured targets.
    pub objectives: ObjectiveSet,
    /// Surrogate/acquisition settings.
    #[serde(default)]
    pub settings: EngineSettings,
    /// Structural version; bumped by edits that add, remove, or retype
    /// parameters or objectives.
    pub version: u32,
    /// Schema version of the serialized form.
    pub schema: SchemaVersion,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last edit of any kind.
    pub updated_at: DateTime<Utc>,
    /// Timestamp of the last open; drives the recent-campaigns list.
    pub accessed_at: DateTime<Utc>,
}

/// Partial edit applied to an existing campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement parameter space (structural).
    pub parameters: Option<ParameterSpace>,
    /// Replacement objective set (structural).
    pub objectives: Option<ObjectiveSet>,
    /// Replacement engine settings (non-structural; changes the content
    /// hash and therefore invalidates persisted optimizer state).
    pub settings: Option<EngineSettings>,
}

impl CampaignConfig {
    /// Validates the sub-specs and assembles a version-1 campaign.
    pub fn create(
        name: impl Into<String>,
        parameters: ParameterSpace,
        objectives: ObjectiveSet,
        settings: EngineSettings,
    ) -> Result<Self, BolabError> {
        parameters.validate()?;
        objectives.validate()?;
        validate_column_disjointness(&parameters, &objectives)?;
        let now = Utc::now();
        Ok(Self {
            id: CampaignId::generate(),
            name: name.into(),
            description: String::new(),
            parameters,
            objectives,
            settings,
            version: 1,
            schema: CONFIG_SCHEMA,
            created_at: now,
            updated_at: now,
            accessed_at: now,
        })
    }

    /// Applies an edit, bumping the structural version when the parameter
    /// space or objective set actually changes. Renames and settings edits
    /// refresh `updated_at` without a version bump.
    pub fn edit(&mut self, update: CampaignUpdate) -> Result<(), BolabError> {
        if let Some(parameters) = &update.parameters {
            parameters.validate()?;
        }
        if let Some(objectives) = &update.objectives {
            objectives.validate()?;
        }
        validate_column_disjointness(
            update.parameters.as_ref().unwrap_or(&self.parameters),
            update.objectives.as_ref().unwrap_or(&self.objectives),
        )?;

        let mut structural = false;
        if let Some(parameters) = update.parameters {
            if parameters != self.parameters {
                self.parameters = parameters;
                structural = true;
            }
        }
        if let Some(objectives) = update.objectives {
            if objectives != self.objectives {
                self.objectives = objectives;
                structural = true;
            }
        }
        if let Some(settings) = update.settings {
            self.settings = settings;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }

        if structural {
            self.version += 1;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Refreshes the access timestamp.
    pub fn touch_accessed(&mut self) {
        self.accessed_at = Utc::now();
    }

    /// Deterministic content hash over parameters, objectives, and settings.
    ///
    /// Identity, display fields, and timestamps are excluded so that the
    /// hash only moves when the optimizer-visible definition moves. The
    /// adapter tags persisted optimizer state with this value to detect
    /// staleness.
    pub fn config_hash(&self) -> Result<String, BolabError> {
        stable_hash_string(&(&self.parameters, &self.objectives, &self.settings))
    }
}

/// A parameter and an objective sharing a name would collapse into one
/// ledger column; reject the combination up front.
fn validate_column_disjointness(
    parameters: &ParameterSpace,
    objectives: &ObjectiveSet,
) -> Result<(), BolabError> {
    for objective in objectives.iter() {
        if parameters.get(&objective.name).is_some() {
            return Err(BolabError::Validation(
                bolab_core::errors::ErrorInfo::new(
                    "column-collision",
                    "objective name collides with a parameter name",
                )
                .with_context("name", objective.name.clone()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{Direction, Objective};
    use crate::parameter::{Parameter, ParameterDomain};

    fn config() -> CampaignConfig {
        CampaignConfig::create(
            "solvent screen",
            ParameterSpace::new(vec![Parameter::new(
                "temperature",
                ParameterDomain::Continuous {
                    low: 20.0,
                    high: 80.0,
                },
            )]),
            ObjectiveSet::new(vec![Objective::new("yield", Direction::Maximize)]),
            EngineSettings::default(),
        )
        .expect("valid config")
    }

    #[test]
    fn create_starts_at_version_one() {
        assert_eq!(config().version, 1);
    }

    #[test]
    fn rename_does_not_bump_version() {
        let mut cfg = config();
        let hash = cfg.config_hash().expect("hash");
        cfg.edit(CampaignUpdate {
            name: Some("renamed".into()),
            ..Default::default()
        })
        .expect("edit");
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.config_hash().expect("hash"), hash);
    }

    #[test]
    fn structural_edit_bumps_version_and_hash() {
        let mut cfg = config();
        let hash = cfg.config_hash().expect("hash");
        cfg.edit(CampaignUpdate {
            parameters: Some(ParameterSpace::new(vec![Parameter::new(
                "temperature",
                ParameterDomain::Continuous {
                    low: 20.0,
                    high: 100.0,
                },
            )])),
            ..Default::default()
        })
        .expect("edit");
        assert_eq!(cfg.version, 2);
        assert_ne!(cfg.config_hash().expect("hash"), hash);
    }

    #[test]
    fn settings_edit_changes_hash_without_version_bump() {
        let mut cfg = config();
        let hash = cfg.config_hash().expect("hash");
        let mut settings = EngineSettings::default();
        settings.surrogate = "random-forest".into();
        cfg.edit(CampaignUpdate {
            settings: Some(settings),
            ..Default::default()
        })
        .expect("edit");
        assert_eq!(cfg.version, 1);
        assert_ne!(cfg.config_hash().expect("hash"), hash);
    }

    #[test]
    fn objective_shadowing_a_parameter_is_rejected() {
        let err = CampaignConfig::create(
            "collision",
            ParameterSpace::new(vec![Parameter::new(
                "yield",
                ParameterDomain::Continuous {
                    low: 0.0,
                    high: 1.0,
                },
            )]),
            ObjectiveSet::new(vec![Objective::new("yield", Direction::Maximize)]),
            EngineSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err.info().code, "column-collision");
    }

    #[test]
    fn invalid_edit_leaves_config_untouched() {
        let mut cfg = config();
        let before = cfg.clone();
        let err = cfg.edit(CampaignUpdate {
            objectives: Some(ObjectiveSet::default()),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(cfg, before);
    }
}

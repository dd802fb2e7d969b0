//! Versioned serialization envelope and migration chain for campaign configs.

use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::schema::SchemaVersion;
use serde_json::{Map, Value};

use crate::config::CampaignConfig;

/// Schema version written by the current code.
pub const CONFIG_SCHEMA: SchemaVersion = SchemaVersion::new(1, 1, 0);

/// Serializes a campaign config to pretty JSON bytes.
pub fn encode_config(config: &CampaignConfig) -> Result<Vec<u8>, BolabError> {
    serde_json::to_vec_pretty(config).map_err(|err| {
        BolabError::Schema(
            ErrorInfo::new("config-serialize", err.to_string())
                .with_context("campaign", config.id.to_string()),
        )
    })
}

/// Deserializes a campaign config, migrating older schemas forward.
///
/// Payloads stamped with a newer major version than [`CONFIG_SCHEMA`] are
/// rejected; older payloads run through the explicit migration chain and
/// come back restamped to the current schema. The decoded sub-specs are
/// re-validated so a hand-edited file cannot smuggle in an invalid space.
pub fn decode_config(bytes: &[u8]) -> Result<CampaignConfig, BolabError> {
    let mut tree: Value = serde_json::from_slice(bytes)
        .map_err(|err| BolabError::Schema(ErrorInfo::new("config-parse", err.to_string())))?;

    let stored = read_schema(&tree)?;
    if !stored.readable_by(CONFIG_SCHEMA) {
        return Err(BolabError::Schema(
            ErrorInfo::new("config-schema-ahead", "stored config is newer than supported")
                .with_context("stored", stored.to_string())
                .with_context("supported", CONFIG_SCHEMA.to_string())
                .with_hint("open the campaign with a newer release"),
        ));
    }

    if stored < CONFIG_SCHEMA {
        migrate_tree(&mut tree, stored)?;
    }

    let config: CampaignConfig = serde_json::from_value(tree)
        .map_err(|err| BolabError::Schema(ErrorInfo::new("config-decode", err.to_string())))?;
    config.parameters.validate()?;
    config.objectives.validate()?;
    Ok(config)
}

fn read_schema(tree: &Value) -> Result<SchemaVersion, BolabError> {
    match tree.get("schema") {
        // Pre-envelope payloads carried no stamp; they are 1.0.0 by
        // definition.
        None => Ok(SchemaVersion::new(1, 0, 0)),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|err| {
            BolabError::Schema(ErrorInfo::new("config-schema-parse", err.to_string()))
        }),
    }
}

fn migrate_tree(tree: &mut Value, stored: SchemaVersion) -> Result<(), BolabError> {
    let object = tree.as_object_mut().ok_or_else(|| {
        BolabError::Schema(ErrorInfo::new(
            "config-shape",
            "config payload is not a JSON object",
        ))
    })?;

    if stored < SchemaVersion::new(1, 1, 0) {
        migrate_1_0_to_1_1(object);
    }

    object.insert(
        "schema".to_string(),
        serde_json::to_value(CONFIG_SCHEMA)
            .map_err(|err| BolabError::Schema(ErrorInfo::new("config-restamp", err.to_string())))?,
    );
    Ok(())
}

/// 1.0 payloads predate the access timestamp; seed it from `updated_at`
/// so recent-campaign ordering stays meaningful.
fn migrate_1_0_to_1_1(object: &mut Map<String, Value>) {
    if !object.contains_key("accessed_at") {
        let updated = object.get("updated_at").cloned().unwrap_or(Value::Null);
        object.insert("accessed_at".to_string(), updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_major_is_rejected() {
        let payload = serde_json::json!({
            "schema": {"major": 2, "minor": 0, "patch": 0},
            "id": "00000000-0000-0000-0000-000000000000",
        });
        let err = decode_config(&serde_json::to_vec(&payload).unwrap()).unwrap_err();
        assert_eq!(err.info().code, "config-schema-ahead");
    }
}

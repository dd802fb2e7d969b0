mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bolab_campaign::{
    BatchStatus, CampaignStore, Direction, EngineSettings, Objective, ObjectiveSet, Parameter,
    ParameterDomain, ParameterSpace,
};
use bolab_engine::CampaignRegistry;
use tempfile::tempdir;

use support::LatticeEngine;

fn parameters() -> ParameterSpace {
    ParameterSpace::new(vec![
        Parameter::new(
            "flow_rate",
            ParameterDomain::Continuous {
                low: 0.1,
                high: 2.0,
            },
        ),
        Parameter::new(
            "column",
            ParameterDomain::Categorical {
                levels: vec!["C18".into(), "phenyl".into()],
            },
        ),
    ])
}

fn objectives() -> ObjectiveSet {
    ObjectiveSet::new(vec![Objective::new("resolution", Direction::Maximize)])
}

#[tokio::test]
async fn registry_runs_a_full_campaign_round() {
    let dir = tempdir().expect("tempdir");
    let registry = CampaignRegistry::new(
        CampaignStore::new(dir.path()),
        LatticeEngine::new(),
    )
    .with_engine_timeout(Duration::from_secs(5));

    let orch = registry
        .create_campaign("gradient screen", parameters(), objectives(), EngineSettings::default())
        .expect("create");
    let id = orch.config().await.id;
    assert_eq!(registry.list_campaigns().expect("list"), vec![id]);

    let batch = registry.generate_next_batch(id, 3).await.expect("generate");
    let mut outcome = BTreeMap::new();
    outcome.insert("resolution".to_string(), 1.8);
    registry
        .record_results(id, batch.id, vec![outcome.clone(), outcome.clone(), outcome])
        .await
        .expect("record");

    let history = registry.get_history(id).await.expect("history");
    assert_eq!(history.batch(batch.id).expect("batch").status, BatchStatus::Completed);
    assert_eq!(history.result_count(), 3);
}

#[tokio::test]
async fn open_campaign_returns_the_single_live_owner() {
    let dir = tempdir().expect("tempdir");
    let registry = CampaignRegistry::new(CampaignStore::new(dir.path()), LatticeEngine::new());

    let orch = registry
        .create_campaign("owners", parameters(), objectives(), EngineSettings::default())
        .expect("create");
    let id = orch.config().await.id;

    let first = registry.open_campaign(id).expect("open");
    let second = registry.open_campaign(id).expect("open again");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &orch));
}

#[tokio::test]
async fn campaigns_survive_a_registry_restart() {
    let dir = tempdir().expect("tempdir");
    let engine = LatticeEngine::new();
    let id;
    {
        let registry = CampaignRegistry::new(CampaignStore::new(dir.path()), engine.clone());
        let orch = registry
            .create_campaign("durable", parameters(), objectives(), EngineSettings::default())
            .expect("create");
        id = orch.config().await.id;
        registry.generate_next_batch(id, 2).await.expect("generate");
    }

    let registry = CampaignRegistry::new(CampaignStore::new(dir.path()), engine);
    let history = registry.get_history(id).await.expect("history");
    assert_eq!(history.batch_count(), 1);
    let config = registry.open_campaign(id).expect("open").config().await;
    assert_eq!(config.name, "durable");
}

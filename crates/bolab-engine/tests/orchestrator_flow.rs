mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bolab_campaign::{BatchSource, BatchStatus, CampaignStore, CompletionOutcome, Outcome};
use bolab_core::{BatchId, BolabError};
use bolab_engine::GenerationPhase;
use tempfile::tempdir;

use support::{orchestrator, scenario_config, FailingEngine, LatticeEngine, ShortBatchEngine};

const TIMEOUT: Duration = Duration::from_secs(5);

fn outcome(z: f64) -> Outcome {
    let mut outcome = BTreeMap::new();
    outcome.insert("z".to_string(), z);
    outcome
}

#[tokio::test]
async fn unavailable_optimizer_yields_full_fallback_batch() {
    let dir = tempdir().expect("tempdir");
    let config = scenario_config();
    let orch = orchestrator(dir.path(), Arc::new(FailingEngine), TIMEOUT, config.clone());

    let batch = orch.generate_next_batch(4).await.expect("generate");

    assert_eq!(batch.rows.len(), 4);
    assert_eq!(batch.status, BatchStatus::Pending);
    assert_eq!(batch.source, BatchSource::Fallback);
    for row in &batch.rows {
        let x = row["x"].as_f64().expect("x is numeric");
        assert!((0.0..=10.0).contains(&x));
        let y = row["y"].as_str().expect("y is categorical");
        assert!(["A", "B", "C"].contains(&y));
    }

    // The pending batch is durable before the call returns.
    let store = CampaignStore::new(dir.path());
    let persisted = store.load_history(&config).expect("load history");
    assert_eq!(persisted.batch_count(), 1);
    assert_eq!(
        persisted.batch(batch.id).expect("batch on disk").status,
        BatchStatus::Pending
    );
}

#[tokio::test]
async fn healthy_optimizer_batch_records_optimizer_provenance() {
    let dir = tempdir().expect("tempdir");
    let engine = LatticeEngine::new();
    let orch = orchestrator(dir.path(), engine.clone(), TIMEOUT, scenario_config());

    let batch = orch.generate_next_batch(3).await.expect("generate");
    assert_eq!(batch.source, BatchSource::Optimizer);
    assert_eq!(batch.rows.len(), 3);
    assert_eq!(engine.build_count(), 1);
}

#[tokio::test]
async fn partial_engine_reply_falls_back_to_full_batch() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(dir.path(), Arc::new(ShortBatchEngine), TIMEOUT, scenario_config());

    let batch = orch.generate_next_batch(6).await.expect("generate");
    assert_eq!(batch.rows.len(), 6);
    assert_eq!(batch.source, BatchSource::Fallback);
}

#[tokio::test]
async fn concurrent_generates_serialize() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(
        dir.path(),
        Arc::new(FailingEngine),
        TIMEOUT,
        scenario_config(),
    );

    let (first, second) = tokio::join!(orch.generate_next_batch(2), orch.generate_next_batch(2));
    let first = first.expect("first");
    let second = second.expect("second");
    assert_ne!(first.id, second.id);

    let history = orch.history().await;
    assert_eq!(history.batch_count(), 2);
}

#[tokio::test]
async fn record_results_flips_batch_and_is_idempotent() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(
        dir.path(),
        Arc::new(FailingEngine),
        TIMEOUT,
        scenario_config(),
    );

    let batch = orch.generate_next_batch(2).await.expect("generate");
    let first = orch
        .record_results(batch.id, vec![outcome(0.61), outcome(0.72)])
        .await
        .expect("record");
    assert_eq!(first, CompletionOutcome::Appended);

    let history = orch.history().await;
    assert_eq!(history.batch(batch.id).expect("batch").status, BatchStatus::Completed);
    assert_eq!(history.result_count(), 2);

    let again = orch
        .record_results(batch.id, vec![outcome(0.61), outcome(0.72)])
        .await
        .expect("resubmit");
    assert_eq!(again, CompletionOutcome::AlreadyCompleted);
    assert_eq!(orch.history().await.result_count(), 2);
}

#[tokio::test]
async fn unknown_batch_id_leaves_history_unchanged() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(
        dir.path(),
        Arc::new(FailingEngine),
        TIMEOUT,
        scenario_config(),
    );
    orch.generate_next_batch(2).await.expect("generate");
    let before = orch.history().await;

    let err = orch
        .record_results(BatchId::generate(), vec![outcome(1.0), outcome(2.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, BolabError::BatchNotFound(_)));
    assert_eq!(orch.history().await, before);
}

#[tokio::test]
async fn malformed_result_rows_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(
        dir.path(),
        Arc::new(FailingEngine),
        TIMEOUT,
        scenario_config(),
    );
    let batch = orch.generate_next_batch(2).await.expect("generate");

    // Wrong row count.
    let err = orch
        .record_results(batch.id, vec![outcome(0.5)])
        .await
        .unwrap_err();
    assert!(matches!(err, BolabError::Validation(_)));

    // Missing objective coverage.
    let err = orch
        .record_results(batch.id, vec![BTreeMap::new(), BTreeMap::new()])
        .await
        .unwrap_err();
    assert_eq!(err.info().code, "result-missing-objective");

    // Undeclared objective.
    let mut stray = outcome(0.5);
    stray.insert("purity".to_string(), 0.9);
    let err = orch
        .record_results(batch.id, vec![stray, outcome(0.6)])
        .await
        .unwrap_err();
    assert_eq!(err.info().code, "result-unknown-objective");

    assert_eq!(orch.history().await.result_count(), 0);
}

#[tokio::test]
async fn spawned_generation_reports_progress_and_completes() {
    let dir = tempdir().expect("tempdir");
    let orch = orchestrator(
        dir.path(),
        Arc::new(FailingEngine),
        TIMEOUT,
        scenario_config(),
    );

    let task = orch.spawn_generate(3);
    let mut progress = task.progress();
    let batch = task.join().await.expect("not cancelled").expect("generate");
    assert_eq!(batch.rows.len(), 3);

    // The channel settles back on Idle once the batch is committed.
    let last = *progress.borrow_and_update();
    assert_eq!(last, GenerationPhase::Idle);
}

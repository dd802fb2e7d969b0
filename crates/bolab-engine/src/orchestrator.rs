//! Per-campaign coordinator: suggestion generation, result ingestion, and
//! the optimizer-or-fallback policy.

use std::sync::Arc;

use bolab_campaign::{
    BatchSource, BatchStatus, CampaignConfig, CampaignStore, CampaignUpdate, CompletionOutcome,
    Outcome, RunBatch, RunHistory,
};
use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::ids::BatchId;
use tokio::sync::{watch, Mutex};

use crate::adapter::OptimizerAdapter;
use crate::fallback::FallbackSampler;

/// Progress phases of one `generate_next_batch` call.
///
/// Published on a watch channel so UI collaborators can render progress
/// without reaching into core state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    /// No generation in flight.
    Idle,
    /// Loading or rebuilding optimizer state.
    ResolvingOptimizer,
    /// Waiting on the engine's suggestion call.
    Suggesting,
    /// Optimizer unavailable; drawing a random batch instead.
    FallingBack,
    /// Batch durably persisted as pending.
    BatchPersisted,
}

/// Mutable campaign state guarded by the per-campaign lock.
#[derive(Debug)]
struct CampaignCore {
    config: CampaignConfig,
    history: RunHistory,
    /// Current optimizer-state handle; revalidated against the config hash
    /// before every use and dropped on any config edit.
    state: Option<crate::state::OptimizerState>,
}

/// Coordinator owning one campaign's config, history, and optimizer state.
///
/// Every mutating operation serializes through one async mutex, so two
/// concurrent calls on the same campaign never interleave; the second
/// observes whatever the first committed. Independent campaigns share no
/// mutable state.
pub struct CampaignOrchestrator {
    store: CampaignStore,
    adapter: OptimizerAdapter,
    sampler: FallbackSampler,
    core: Mutex<CampaignCore>,
    phase: watch::Sender<GenerationPhase>,
}

impl std::fmt::Debug for CampaignOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignOrchestrator")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl CampaignOrchestrator {
    /// Assembles an orchestrator around already-loaded campaign state.
    pub fn new(
        store: CampaignStore,
        adapter: OptimizerAdapter,
        config: CampaignConfig,
        history: RunHistory,
    ) -> Self {
        let (phase, _) = watch::channel(GenerationPhase::Idle);
        Self {
            store,
            adapter,
            sampler: FallbackSampler::new(),
            core: Mutex::new(CampaignCore {
                config,
                history,
                state: None,
            }),
            phase,
        }
    }

    /// Snapshot of the campaign config.
    pub async fn config(&self) -> CampaignConfig {
        self.core.lock().await.config.clone()
    }

    /// Snapshot of the run history.
    pub async fn history(&self) -> RunHistory {
        self.core.lock().await.history.clone()
    }

    /// Subscribes to generation progress updates.
    pub fn subscribe_phase(&self) -> watch::Receiver<GenerationPhase> {
        self.phase.subscribe()
    }

    /// Applies a campaign edit and persists the updated config.
    ///
    /// Structural edits bump the config version; the persisted optimizer
    /// state is left in place and the content-hash check catches it as
    /// stale on the next resolve.
    pub async fn edit_config(&self, update: CampaignUpdate) -> Result<CampaignConfig, BolabError> {
        let mut core = self.core.lock().await;
        core.config.edit(update)?;
        core.state = None;
        self.store.save_config(&core.config)?;
        tracing::info!(
            campaign = %core.config.id,
            version = core.config.version,
            "campaign config updated"
        );
        Ok(core.config.clone())
    }

    /// Generates the next suggestion batch and persists it as pending.
    ///
    /// The optimizer path (resolve + suggest) is attempted once; any
    /// recoverable optimizer failure triggers exactly one fallback
    /// substitution and is never retried, bounding worst-case latency to
    /// one engine attempt plus fallback sampling. The returned batch
    /// records its provenance.
    pub async fn generate_next_batch(&self, batch_size: usize) -> Result<RunBatch, BolabError> {
        let mut core = self.core.lock().await;
        let result = self.generate_locked(&mut core, batch_size).await;
        self.set_phase(GenerationPhase::Idle);
        result
    }

    async fn generate_locked(
        &self,
        core: &mut CampaignCore,
        batch_size: usize,
    ) -> Result<RunBatch, BolabError> {
        if batch_size == 0 {
            return Err(BolabError::Validation(ErrorInfo::new(
                "batch-size",
                "batch size must be at least one",
            )));
        }

        self.set_phase(GenerationPhase::ResolvingOptimizer);
        let attempt = self.optimizer_rows(core, batch_size).await;
        let (rows, source) = match attempt {
            Ok(rows) => (rows, BatchSource::Optimizer),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(
                    campaign = %core.config.id,
                    error = %err,
                    "optimizer unavailable, substituting fallback batch"
                );
                self.set_phase(GenerationPhase::FallingBack);
                let rows = self
                    .sampler
                    .sample(&core.config.parameters, batch_size, None)?;
                (rows, BatchSource::Fallback)
            }
            Err(err) => return Err(err),
        };

        let batch = RunBatch::pending(source, rows);
        self.store.save_batch(&core.config, &batch, &[])?;
        core.history.append_batch(batch.clone())?;
        self.set_phase(GenerationPhase::BatchPersisted);
        tracing::info!(
            campaign = %core.config.id,
            batch = %batch.id,
            source = %batch.source,
            rows = batch.rows.len(),
            "batch persisted"
        );
        Ok(batch)
    }

    async fn optimizer_rows(
        &self,
        core: &mut CampaignCore,
        batch_size: usize,
    ) -> Result<Vec<bolab_campaign::Row>, BolabError> {
        tracing::info!(campaign = %core.config.id, "optimizer attempted");
        let config_hash = core.config.config_hash()?;
        let cached = core
            .state
            .as_ref()
            .filter(|s| s.matches(&config_hash))
            .cloned();
        let state = match cached {
            Some(state) => state,
            None => {
                let state = self.adapter.resolve(&core.config, &core.history).await?;
                core.state = Some(state.clone());
                state
            }
        };
        self.set_phase(GenerationPhase::Suggesting);
        self.adapter
            .suggest_batch(&core.config, &state, batch_size)
            .await
    }

    /// Ingests measured results for a pending batch.
    ///
    /// Unknown ids fail with `BatchNotFound`; malformed submissions fail
    /// validation; re-submitting a completed batch is an idempotent no-op.
    /// On success the batch flips to completed and its ledger file is
    /// rewritten with the measurements.
    pub async fn record_results(
        &self,
        batch_id: BatchId,
        outcomes: Vec<Outcome>,
    ) -> Result<CompletionOutcome, BolabError> {
        let mut core = self.core.lock().await;

        let status = core.history.batch(batch_id).map(|b| b.status).ok_or_else(|| {
            BolabError::BatchNotFound(
                ErrorInfo::new("batch-unknown", "no batch with the submitted id")
                    .with_context("batch", batch_id.to_string()),
            )
        })?;
        if status == BatchStatus::Completed {
            tracing::debug!(batch = %batch_id, "duplicate result submission ignored");
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        for (idx, outcome) in outcomes.iter().enumerate() {
            for objective in core.config.objectives.iter() {
                if !outcome.contains_key(&objective.name) {
                    return Err(BolabError::Validation(
                        ErrorInfo::new("result-missing-objective", "row lacks a measured objective")
                            .with_context("row", idx.to_string())
                            .with_context("objective", objective.name.clone()),
                    ));
                }
            }
            for name in outcome.keys() {
                if core.config.objectives.iter().all(|o| &o.name != name) {
                    return Err(BolabError::Validation(
                        ErrorInfo::new("result-unknown-objective", "row measures an undeclared objective")
                            .with_context("row", idx.to_string())
                            .with_context("objective", name.clone()),
                    ));
                }
            }
        }

        let outcome = core.history.complete_batch(batch_id, outcomes)?;
        if outcome == CompletionOutcome::Appended {
            let batch = core
                .history
                .batch(batch_id)
                .expect("completed batch present")
                .clone();
            let results = core.history.results_for(batch_id);
            self.store.save_batch(&core.config, &batch, &results)?;
            tracing::info!(
                campaign = %core.config.id,
                batch = %batch_id,
                rows = results.len(),
                "results ingested"
            );
        }
        Ok(outcome)
    }

    /// Spawns `generate_next_batch` as a cancellable background task.
    pub fn spawn_generate(self: &Arc<Self>, batch_size: usize) -> GenerationTask {
        let orchestrator = Arc::clone(self);
        let progress = self.subscribe_phase();
        let handle =
            tokio::spawn(async move { orchestrator.generate_next_batch(batch_size).await });
        GenerationTask { handle, progress }
    }

    fn set_phase(&self, phase: GenerationPhase) {
        self.phase.send_replace(phase);
    }
}

/// Handle to an in-flight generation: progress stream plus cancellation.
#[derive(Debug)]
pub struct GenerationTask {
    handle: tokio::task::JoinHandle<Result<RunBatch, BolabError>>,
    progress: watch::Receiver<GenerationPhase>,
}

impl GenerationTask {
    /// Progress receiver for rendering generation phases.
    pub fn progress(&self) -> watch::Receiver<GenerationPhase> {
        self.progress.clone()
    }

    /// Cancels the in-flight generation.
    ///
    /// Persistence is atomic, so cancellation observes the batch either
    /// fully absent or durably persisted, never half-written.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Awaits the generation outcome; `None` when it was cancelled.
    pub async fn join(self) -> Option<Result<RunBatch, BolabError>> {
        match self.handle.await {
            Ok(result) => Some(result),
            Err(err) if err.is_cancelled() => None,
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}

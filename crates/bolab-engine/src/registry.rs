//! Handle table mapping campaign ids to their single live orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bolab_campaign::{
    CampaignConfig, CampaignStore, CampaignUpdate, CompletionOutcome, EngineSettings,
    ObjectiveSet, Outcome, ParameterSpace, RunBatch, RunHistory,
};
use bolab_core::errors::BolabError;
use bolab_core::ids::{BatchId, CampaignId};

use crate::adapter::{OptimizerAdapter, DEFAULT_ENGINE_TIMEOUT};
use crate::engine::OptimizationEngine;
use crate::orchestrator::CampaignOrchestrator;

/// Owns the store, the engine, and one orchestrator handle per campaign.
///
/// The registry guarantees the single-owner rule: at most one orchestrator
/// instance holds a campaign's mutable in-memory state, and every operation
/// routes through it. Dropping the registry drops the handles; persistence
/// makes the campaigns durable across sessions.
pub struct CampaignRegistry {
    store: CampaignStore,
    engine: Arc<dyn OptimizationEngine>,
    engine_timeout: Duration,
    live: Mutex<HashMap<CampaignId, Arc<CampaignOrchestrator>>>,
}

impl std::fmt::Debug for CampaignRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignRegistry")
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl CampaignRegistry {
    /// Creates a registry over one workspace store and one engine.
    pub fn new(store: CampaignStore, engine: Arc<dyn OptimizationEngine>) -> Self {
        Self {
            store,
            engine,
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the engine timeout applied to newly opened campaigns.
    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    /// Validates, persists, and opens a new campaign.
    pub fn create_campaign(
        &self,
        name: impl Into<String>,
        parameters: ParameterSpace,
        objectives: ObjectiveSet,
        settings: EngineSettings,
    ) -> Result<Arc<CampaignOrchestrator>, BolabError> {
        let config = CampaignConfig::create(name, parameters, objectives, settings)?;
        self.store.save_config(&config)?;
        let id = config.id;
        tracing::info!(campaign = %id, "campaign created");
        let orchestrator = Arc::new(CampaignOrchestrator::new(
            self.store.clone(),
            self.adapter(),
            config,
            RunHistory::new(),
        ));
        self.live
            .lock()
            .expect("registry lock poisoned")
            .insert(id, Arc::clone(&orchestrator));
        Ok(orchestrator)
    }

    /// Returns the live orchestrator for a campaign, loading it from disk
    /// on first access.
    pub fn open_campaign(&self, id: CampaignId) -> Result<Arc<CampaignOrchestrator>, BolabError> {
        if let Some(existing) = self
            .live
            .lock()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
        {
            return Ok(existing);
        }

        let mut config = self.store.load_config(id)?;
        config.touch_accessed();
        self.store.save_config(&config)?;
        let history = self.store.load_history(&config)?;
        let orchestrator = Arc::new(CampaignOrchestrator::new(
            self.store.clone(),
            self.adapter(),
            config,
            history,
        ));

        let mut live = self.live.lock().expect("registry lock poisoned");
        // A racing open may have inserted first; its handle wins so the
        // single-owner rule holds.
        let entry = live
            .entry(id)
            .or_insert_with(|| Arc::clone(&orchestrator));
        Ok(Arc::clone(entry))
    }

    /// Applies an edit to a campaign and persists the updated config.
    pub async fn edit_campaign(
        &self,
        id: CampaignId,
        update: CampaignUpdate,
    ) -> Result<CampaignConfig, BolabError> {
        self.open_campaign(id)?.edit_config(update).await
    }

    /// Generates the next suggestion batch for a campaign.
    pub async fn generate_next_batch(
        &self,
        id: CampaignId,
        batch_size: usize,
    ) -> Result<RunBatch, BolabError> {
        self.open_campaign(id)?.generate_next_batch(batch_size).await
    }

    /// Records measured results for a batch.
    pub async fn record_results(
        &self,
        id: CampaignId,
        batch_id: BatchId,
        outcomes: Vec<Outcome>,
    ) -> Result<CompletionOutcome, BolabError> {
        self.open_campaign(id)?.record_results(batch_id, outcomes).await
    }

    /// Snapshot of a campaign's run history.
    pub async fn get_history(&self, id: CampaignId) -> Result<RunHistory, BolabError> {
        Ok(self.open_campaign(id)?.history().await)
    }

    /// Campaigns present in the workspace store.
    pub fn list_campaigns(&self) -> Result<Vec<CampaignId>, BolabError> {
        self.store.list_campaigns()
    }

    fn adapter(&self) -> OptimizerAdapter {
        OptimizerAdapter::new(Arc::clone(&self.engine), self.store.clone())
            .with_timeout(self.engine_timeout)
    }
}

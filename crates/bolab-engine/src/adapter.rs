//! Adapter between campaign state and the external optimization engine.
//!
//! Owns staleness detection and persistence of the engine's opaque state.
//! Engine calls run on blocking worker threads under a caller-configured
//! timeout; every engine-side failure maps to the recoverable
//! optimizer-unavailable family and is absorbed by the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use bolab_campaign::{CampaignConfig, CampaignStore, RunHistory, Row};
use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::ids::CampaignId;

use crate::engine::{EngineCampaign, Measurement, OptimizationEngine};
use crate::state::OptimizerState;

/// Default ceiling on one engine call.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);

/// Drives one external engine on behalf of any number of campaigns.
#[derive(Clone)]
pub struct OptimizerAdapter {
    engine: Arc<dyn OptimizationEngine>,
    store: CampaignStore,
    timeout: Duration,
}

impl std::fmt::Debug for OptimizerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerAdapter")
            .field("engine", &self.engine.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OptimizerAdapter {
    /// Creates an adapter around one engine and one store.
    pub fn new(engine: Arc<dyn OptimizationEngine>, store: CampaignStore) -> Self {
        Self {
            engine,
            store,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    /// Overrides the per-call engine timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves a usable optimizer state for the campaign.
    ///
    /// A persisted state whose tag matches the live `config_hash()` is
    /// loaded and returned as-is. A missing, unreadable, or stale state
    /// triggers a rebuild seeded with every completed measurement in
    /// chronological order; the fresh state is persisted before returning.
    pub async fn resolve(
        &self,
        config: &CampaignConfig,
        history: &RunHistory,
    ) -> Result<OptimizerState, BolabError> {
        let config_hash = config.config_hash()?;

        if let Some(bytes) = self.store.read_optimizer_state(config.id)? {
            match OptimizerState::decode(&bytes) {
                Ok(state) if state.matches(&config_hash) => {
                    tracing::debug!(
                        campaign = %config.id,
                        engine = self.engine.name(),
                        built_at = %state.built_at,
                        "reusing persisted optimizer state"
                    );
                    return Ok(state);
                }
                Ok(state) => {
                    tracing::info!(
                        campaign = %config.id,
                        stored = %state.config_hash,
                        current = %config_hash,
                        "optimizer state stale, rebuilding"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        campaign = %config.id,
                        error = %err,
                        "optimizer state unreadable, rebuilding"
                    );
                }
            }
        }

        let campaign = EngineCampaign::project(config);
        let measurements = training_set(&campaign, history);
        let engine = Arc::clone(&self.engine);
        tracing::info!(
            campaign = %config.id,
            engine = self.engine.name(),
            measurements = measurements.len(),
            "rebuilding optimizer state"
        );
        let blob = self
            .run_engine("build", move || engine.build(&campaign, &measurements))
            .await?;

        let state = OptimizerState::new(config_hash, blob);
        self.persist_state(config.id, &state)?;
        Ok(state)
    }

    /// Requests exactly `batch_size` candidate rows from the engine.
    ///
    /// Replies that are short, long, off-domain, or missing a searchable
    /// parameter are rejected wholesale; the adapter never passes a partial
    /// batch upstream. Fixed parameter values are re-attached to every row.
    pub async fn suggest_batch(
        &self,
        config: &CampaignConfig,
        state: &OptimizerState,
        batch_size: usize,
    ) -> Result<Vec<Row>, BolabError> {
        let config_hash = config.config_hash()?;
        if !state.matches(&config_hash) {
            return Err(BolabError::Optimizer(
                ErrorInfo::new("engine-stale-handle", "optimizer state does not match the campaign")
                    .with_context("campaign", config.id.to_string()),
            ));
        }

        let engine = Arc::clone(&self.engine);
        let blob = state.blob.clone();
        tracing::info!(
            campaign = %config.id,
            engine = self.engine.name(),
            batch_size,
            "requesting suggestion batch"
        );
        let rows = self
            .run_engine("suggest", move || engine.suggest(&blob, batch_size))
            .await?;

        if rows.len() != batch_size {
            return Err(BolabError::Optimizer(
                ErrorInfo::new("engine-batch-size", "engine returned a partial batch")
                    .with_context("expected", batch_size.to_string())
                    .with_context("returned", rows.len().to_string()),
            ));
        }

        let mut completed = Vec::with_capacity(rows.len());
        for (idx, mut row) in rows.into_iter().enumerate() {
            for parameter in config.parameters.active() {
                let valid = row
                    .get(&parameter.name)
                    .map(|value| parameter.domain.contains(value))
                    .unwrap_or(false);
                if !valid {
                    return Err(BolabError::Optimizer(
                        ErrorInfo::new("engine-domain", "engine row violates a parameter domain")
                            .with_context("row", idx.to_string())
                            .with_context("parameter", parameter.name.clone()),
                    ));
                }
            }
            for parameter in config.parameters.iter() {
                if let bolab_campaign::ParameterDomain::Fixed { value } = &parameter.domain {
                    row.insert(parameter.name.clone(), value.clone());
                }
            }
            completed.push(row);
        }
        Ok(completed)
    }

    /// Atomically persists a state envelope under the campaign directory.
    pub fn persist_state(
        &self,
        campaign: CampaignId,
        state: &OptimizerState,
    ) -> Result<(), BolabError> {
        let bytes = state.encode()?;
        self.store.write_optimizer_state(campaign, &bytes)
    }

    /// Runs one engine call on a blocking worker under the adapter timeout.
    ///
    /// On timeout the worker is detached and its eventual result discarded;
    /// the caller proceeds to the fallback path immediately.
    async fn run_engine<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce() -> Result<T, crate::engine::EngineFault> + Send + 'static,
    ) -> Result<T, BolabError>
    where
        T: Send + 'static,
    {
        let outcome = tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(call)).await;
        match outcome {
            Err(_elapsed) => Err(BolabError::Optimizer(
                ErrorInfo::new("engine-timeout", "engine call exceeded the configured timeout")
                    .with_context("operation", operation)
                    .with_context("timeout_ms", self.timeout.as_millis().to_string()),
            )),
            Ok(Err(join)) => Err(BolabError::Optimizer(
                ErrorInfo::new("engine-panic", "engine call panicked")
                    .with_context("operation", operation)
                    .with_hint(join.to_string()),
            )),
            Ok(Ok(Err(fault))) => Err(BolabError::Optimizer(
                ErrorInfo::new("engine-fault", "engine reported a failure")
                    .with_context("operation", operation)
                    .with_hint(fault.to_string()),
            )),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

/// Projects completed history pairs onto the engine's training shape.
///
/// Rows are narrowed to the currently searchable parameters; a historical
/// row missing one of them (recorded under an older parameter space) is
/// skipped rather than handed to the engine half-empty.
fn training_set(campaign: &EngineCampaign, history: &RunHistory) -> Vec<Measurement> {
    let names = campaign.parameter_names();
    history
        .completed_measurements()
        .into_iter()
        .filter_map(|(row, outcomes)| {
            let mut narrowed = Row::new();
            for name in &names {
                match row.get(name) {
                    Some(value) => {
                        narrowed.insert(name.clone(), value.clone());
                    }
                    None => return None,
                }
            }
            Some(Measurement {
                row: narrowed,
                outcomes,
            })
        })
        .collect()
}

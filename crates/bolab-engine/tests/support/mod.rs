//! Shared test doubles and fixtures for the engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bolab_campaign::{
    CampaignConfig, CampaignStore, Direction, EngineSettings, Objective, ObjectiveSet, Parameter,
    ParameterDomain, ParameterSpace, Row, RunHistory,
};
use bolab_engine::{
    CampaignOrchestrator, EngineCampaign, EngineFault, Measurement, OptimizationEngine,
    OptimizerAdapter,
};
use serde_json::{json, Value};

/// Small two-parameter campaign used across the orchestration tests:
/// `x ∈ [0, 10]` continuous, `y ∈ {A, B, C}` categorical, maximize `z`.
pub fn scenario_config() -> CampaignConfig {
    CampaignConfig::create(
        "scenario",
        ParameterSpace::new(vec![
            Parameter::new(
                "x",
                ParameterDomain::Continuous {
                    low: 0.0,
                    high: 10.0,
                },
            ),
            Parameter::new(
                "y",
                ParameterDomain::Categorical {
                    levels: vec!["A".into(), "B".into(), "C".into()],
                },
            ),
        ]),
        ObjectiveSet::new(vec![Objective::new("z", Direction::Maximize)]),
        EngineSettings::default(),
    )
    .expect("valid config")
}

/// Assembles an orchestrator over a fresh store rooted at `root`.
pub fn orchestrator(
    root: &std::path::Path,
    engine: Arc<dyn OptimizationEngine>,
    timeout: Duration,
    config: CampaignConfig,
) -> Arc<CampaignOrchestrator> {
    let store = CampaignStore::new(root);
    store.save_config(&config).expect("save config");
    let adapter = OptimizerAdapter::new(engine, store.clone()).with_timeout(timeout);
    Arc::new(CampaignOrchestrator::new(
        store,
        adapter,
        config,
        RunHistory::new(),
    ))
}

/// Deterministic well-behaved engine: every suggested row takes the first
/// level (or lower bound) of each searchable parameter. Build and suggest
/// invocations are counted.
pub struct LatticeEngine {
    pub builds: AtomicUsize,
    pub suggests: AtomicUsize,
}

impl LatticeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            builds: AtomicUsize::new(0),
            suggests: AtomicUsize::new(0),
        })
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl OptimizationEngine for LatticeEngine {
    fn name(&self) -> &str {
        "lattice"
    }

    fn build(
        &self,
        campaign: &EngineCampaign,
        measurements: &[Measurement],
    ) -> Result<Vec<u8>, EngineFault> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        serde_json::to_vec(&(campaign, measurements.len()))
            .map_err(|err| EngineFault::new(err.to_string()))
    }

    fn suggest(&self, state: &[u8], batch_size: usize) -> Result<Vec<Row>, EngineFault> {
        self.suggests.fetch_add(1, Ordering::SeqCst);
        let (campaign, _seen): (EngineCampaign, usize) =
            serde_json::from_slice(state).map_err(|err| EngineFault::new(err.to_string()))?;
        let mut rows = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let mut row = Row::new();
            for parameter in &campaign.parameters {
                row.insert(parameter.name.clone(), anchor_value(&parameter.domain)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn anchor_value(domain: &ParameterDomain) -> Result<Value, EngineFault> {
    let value = match domain {
        ParameterDomain::Continuous { low, .. } => json!(low),
        ParameterDomain::DiscreteRange { low, .. } => json!(low),
        ParameterDomain::DiscreteSet { values } => json!(values[0]),
        ParameterDomain::Categorical { levels } => json!(levels[0].clone()),
        ParameterDomain::Substance { smiles } => json!(smiles[0].clone()),
        ParameterDomain::Fixed { .. } => {
            return Err(EngineFault::new("fixed parameter reached the engine"))
        }
    };
    Ok(value)
}

/// Engine that fails every call.
pub struct FailingEngine;

impl OptimizationEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn build(&self, _: &EngineCampaign, _: &[Measurement]) -> Result<Vec<u8>, EngineFault> {
        Err(EngineFault::new("surrogate fit diverged"))
    }

    fn suggest(&self, _: &[u8], _: usize) -> Result<Vec<Row>, EngineFault> {
        Err(EngineFault::new("surrogate fit diverged"))
    }
}

/// Engine whose suggest call blocks past any reasonable timeout.
pub struct HangingEngine {
    pub delay: Duration,
}

impl OptimizationEngine for HangingEngine {
    fn name(&self) -> &str {
        "hanging"
    }

    fn build(&self, campaign: &EngineCampaign, _: &[Measurement]) -> Result<Vec<u8>, EngineFault> {
        serde_json::to_vec(campaign).map_err(|err| EngineFault::new(err.to_string()))
    }

    fn suggest(&self, _: &[u8], _: usize) -> Result<Vec<Row>, EngineFault> {
        std::thread::sleep(self.delay);
        Err(EngineFault::new("woke up after the deadline"))
    }
}

/// Engine that always returns one row fewer than requested.
pub struct ShortBatchEngine;

impl OptimizationEngine for ShortBatchEngine {
    fn name(&self) -> &str {
        "short-batch"
    }

    fn build(&self, campaign: &EngineCampaign, _: &[Measurement]) -> Result<Vec<u8>, EngineFault> {
        serde_json::to_vec(campaign).map_err(|err| EngineFault::new(err.to_string()))
    }

    fn suggest(&self, state: &[u8], batch_size: usize) -> Result<Vec<Row>, EngineFault> {
        let campaign: EngineCampaign =
            serde_json::from_slice(state).map_err(|err| EngineFault::new(err.to_string()))?;
        let mut rows = Vec::new();
        for _ in 0..batch_size.saturating_sub(1) {
            let mut row = Row::new();
            for parameter in &campaign.parameters {
                row.insert(parameter.name.clone(), anchor_value(&parameter.domain)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

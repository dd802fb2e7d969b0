//! Contract between the campaign core and the external optimization engine.
//!
//! The engine is a black box: it receives a narrow campaign projection plus
//! the completed training measurements, and hands back an opaque state blob
//! and candidate rows. Everything else (staleness, persistence, timeouts,
//! fallback policy) lives on this side of the seam.

use bolab_campaign::{CampaignConfig, EngineSettings, Objective, Outcome, Parameter, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable projection of a campaign handed to the engine.
///
/// Fixed parameters are excluded: the engine never searches over them, and
/// the adapter re-attaches their pinned values to every suggested row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCampaign {
    /// Searchable parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// Objectives in declaration order.
    pub objectives: Vec<Objective>,
    /// Opaque surrogate/acquisition settings.
    pub settings: EngineSettings,
}

impl EngineCampaign {
    /// Projects a campaign config onto the engine-visible subset.
    pub fn project(config: &CampaignConfig) -> Self {
        Self {
            parameters: config.parameters.active().cloned().collect(),
            objectives: config.objectives.iter().cloned().collect(),
            settings: config.settings.clone(),
        }
    }

    /// Names of the parameters the engine must assign in every row.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// One completed training point: suggested row plus measured outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Parameter assignment that was run.
    pub row: Row,
    /// Measured value per objective.
    pub outcomes: Outcome,
}

/// Failure reported by the engine itself.
///
/// The adapter maps every fault (along with timeouts and panics) to the
/// recoverable optimizer-unavailable family; faults never cross the
/// orchestrator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineFault {
    /// Engine-reported diagnostic.
    pub message: String,
}

impl EngineFault {
    /// Creates a fault with the given diagnostic.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External Bayesian-optimization engine boundary.
///
/// Implementations must be cheap to call concurrently from blocking worker
/// threads; long computations are expected and are bounded by the adapter's
/// timeout, not by the engine.
pub trait OptimizationEngine: Send + Sync {
    /// Short engine label used in log events.
    fn name(&self) -> &str;

    /// Builds a fresh campaign state seeded with every completed
    /// measurement, in chronological order.
    fn build(
        &self,
        campaign: &EngineCampaign,
        measurements: &[Measurement],
    ) -> Result<Vec<u8>, EngineFault>;

    /// Requests `batch_size` candidate assignments over the campaign's
    /// searchable parameters from the given state blob.
    fn suggest(&self, state: &[u8], batch_size: usize) -> Result<Vec<Row>, EngineFault>;
}

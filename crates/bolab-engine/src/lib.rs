//! Optimizer adapter, fallback sampler, and campaign orchestration.
//!
//! This crate drives an external Bayesian-optimization engine on behalf of
//! persisted campaigns: it resolves or rebuilds the engine's opaque state,
//! requests suggestion batches under a timeout, substitutes a
//! constraint-respecting random batch when the engine cannot respond, and
//! keeps the append-only run ledger consistent across restarts.

pub mod adapter;
pub mod engine;
pub mod fallback;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod state;

pub use adapter::{OptimizerAdapter, DEFAULT_ENGINE_TIMEOUT};
pub use engine::{EngineCampaign, EngineFault, Measurement, OptimizationEngine};
pub use fallback::FallbackSampler;
pub use orchestrator::{CampaignOrchestrator, GenerationPhase, GenerationTask};
pub use registry::CampaignRegistry;
pub use state::{OptimizerState, STATE_SCHEMA};

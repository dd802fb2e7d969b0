//! Constraint-respecting random sampler used when the optimizer cannot
//! respond.

use bolab_campaign::{ParameterDomain, ParameterSpace, Row};
use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::rng::{derive_substream_seed, RngHandle};
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde_json::Value;

/// Uniform per-dimension sampler over a validated parameter space.
///
/// Each row draws from its own deterministic substream, so row `i` of a
/// seeded sample is stable regardless of the requested batch size. The
/// sampler has no optimizer dependency and no failure modes beyond an
/// invalid (empty-domain) space.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSampler;

impl FallbackSampler {
    /// Creates the sampler.
    pub fn new() -> Self {
        Self
    }

    /// Draws `batch_size` independent rows satisfying every declared domain.
    ///
    /// Pooled domains (discrete sets, categorical levels, substance
    /// candidates) are sampled uniformly over the pool; continuous domains
    /// uniformly over `[low, high]`; regular grids uniformly over their
    /// expanded levels; fixed parameters carry their pinned value. Without
    /// an explicit seed the master seed is drawn from entropy.
    pub fn sample(
        &self,
        space: &ParameterSpace,
        batch_size: usize,
        seed: Option<u64>,
    ) -> Result<Vec<Row>, BolabError> {
        let master_seed = seed.unwrap_or_else(|| RngHandle::from_entropy().next_u64());
        let mut rows = Vec::with_capacity(batch_size);
        for index in 0..batch_size {
            let mut rng = RngHandle::from_seed(derive_substream_seed(master_seed, index as u64));
            let mut row = Row::new();
            for parameter in space.iter() {
                let value = sample_domain(&parameter.name, &parameter.domain, &mut rng)?;
                row.insert(parameter.name.clone(), value);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn sample_domain(
    name: &str,
    domain: &ParameterDomain,
    rng: &mut RngHandle,
) -> Result<Value, BolabError> {
    match domain {
        ParameterDomain::Continuous { low, high } => {
            let value = Uniform::new_inclusive(low, high).sample(rng.inner_mut());
            number(name, value)
        }
        ParameterDomain::DiscreteRange { .. } => {
            let levels = domain.grid().unwrap_or_default();
            let level = choose(name, &levels, rng)?;
            number(name, *level)
        }
        ParameterDomain::DiscreteSet { values } => {
            let level = choose(name, values, rng)?;
            number(name, *level)
        }
        ParameterDomain::Categorical { levels } => {
            Ok(Value::String(choose(name, levels, rng)?.clone()))
        }
        ParameterDomain::Fixed { value } => Ok(value.clone()),
        ParameterDomain::Substance { smiles } => {
            Ok(Value::String(choose(name, smiles, rng)?.clone()))
        }
    }
}

fn choose<'a, T>(name: &str, pool: &'a [T], rng: &mut RngHandle) -> Result<&'a T, BolabError> {
    pool.choose(rng.inner_mut()).ok_or_else(|| {
        BolabError::Validation(
            ErrorInfo::new("sample-empty-domain", "cannot sample from an empty domain")
                .with_context("parameter", name),
        )
    })
}

fn number(name: &str, value: f64) -> Result<Value, BolabError> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| {
            BolabError::Validation(
                ErrorInfo::new("sample-non-finite", "sampled value is not representable")
                    .with_context("parameter", name),
            )
        })
}

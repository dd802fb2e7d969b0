//! Parameter domains and the campaign parameter space.

use std::collections::BTreeSet;

use bolab_core::errors::{BolabError, ErrorInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relative tolerance used when matching values against numeric grids.
const GRID_EPSILON: f64 = 1e-9;

/// Characters accepted inside a SMILES string.
const SMILES_CHARSET: &str =
    "ABCDEFGHIKLMNOPRSTUVWXYZabcdefghiklmnoprstuy0123456789()[]{}@+-=#$%/\\.*:~";

/// Column names the run ledger reserves for batch metadata; parameters and
/// objectives may not shadow them.
pub const RESERVED_COLUMN_NAMES: [&str; 6] = [
    "batch_id",
    "row_index",
    "status",
    "source",
    "generated_at",
    "ingested_at",
];

/// Kind-specific domain of one controllable variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterDomain {
    /// Real-valued interval `[low, high]`.
    Continuous {
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
    },
    /// Regularly spaced numeric grid `low, low+step, ...` up to `high`.
    DiscreteRange {
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
        /// Positive spacing between grid points.
        step: f64,
    },
    /// Explicit numeric level set.
    DiscreteSet {
        /// Ordered levels, no duplicates.
        values: Vec<f64>,
    },
    /// Explicit categorical level set.
    Categorical {
        /// Ordered levels, no duplicates, non-empty strings.
        levels: Vec<String>,
    },
    /// Constant carried through every suggestion but excluded from search.
    Fixed {
        /// The pinned value.
        value: Value,
    },
    /// Chemistry-structure pool described by SMILES strings.
    Substance {
        /// Candidate structures, no duplicates, structurally plausible.
        smiles: Vec<String>,
    },
}

impl ParameterDomain {
    /// Short lowercase label used in diagnostics and ledger headers.
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterDomain::Continuous { .. } => "continuous",
            ParameterDomain::DiscreteRange { .. } => "discrete_range",
            ParameterDomain::DiscreteSet { .. } => "discrete_set",
            ParameterDomain::Categorical { .. } => "categorical",
            ParameterDomain::Fixed { .. } => "fixed",
            ParameterDomain::Substance { .. } => "substance",
        }
    }

    /// True for domains the optimization engine searches over.
    pub fn is_searchable(&self) -> bool {
        !matches!(self, ParameterDomain::Fixed { .. })
    }

    /// Expands a regular grid domain into its concrete levels.
    ///
    /// Returns `None` for non-grid domains. The inclusive upper bound is
    /// honored up to a relative tolerance so that ranges like `[0, 1]` with
    /// step `0.1` keep their final level despite accumulated rounding.
    pub fn grid(&self) -> Option<Vec<f64>> {
        match self {
            ParameterDomain::DiscreteRange { low, high, step } => {
                let mut levels = Vec::new();
                let slack = step * GRID_EPSILON.max(f64::EPSILON);
                let mut index = 0u32;
                loop {
                    let level = low + f64::from(index) * step;
                    if level > high + slack {
                        break;
                    }
                    levels.push(level.min(*high));
                    index += 1;
                }
                Some(levels)
            }
            _ => None,
        }
    }

    /// True when `value` lies inside the declared domain.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            ParameterDomain::Continuous { low, high } => value
                .as_f64()
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
            ParameterDomain::DiscreteRange { low, high, step } => {
                let Some(v) = value.as_f64() else {
                    return false;
                };
                let slack = step * GRID_EPSILON.max(f64::EPSILON);
                if v < low - slack || v > high + slack {
                    return false;
                }
                let offset = (v - low) / step;
                (offset - offset.round()).abs() <= GRID_EPSILON * offset.abs().max(1.0)
            }
            ParameterDomain::DiscreteSet { values } => value
                .as_f64()
                .map(|v| values.iter().any(|x| (x - v).abs() <= GRID_EPSILON * x.abs().max(1.0)))
                .unwrap_or(false),
            ParameterDomain::Categorical { levels } => value
                .as_str()
                .map(|v| levels.iter().any(|level| level == v))
                .unwrap_or(false),
            ParameterDomain::Fixed { value: pinned } => value == pinned,
            ParameterDomain::Substance { smiles } => value
                .as_str()
                .map(|v| smiles.iter().any(|s| s == v))
                .unwrap_or(false),
        }
    }

    fn validate(&self, name: &str) -> Result<(), BolabError> {
        match self {
            ParameterDomain::Continuous { low, high } => {
                require_finite(name, "low", *low)?;
                require_finite(name, "high", *high)?;
                if low >= high {
                    return Err(domain_error(
                        name,
                        "continuous-bounds",
                        "lower bound must be less than upper bound",
                    ));
                }
            }
            ParameterDomain::DiscreteRange { low, high, step } => {
                require_finite(name, "low", *low)?;
                require_finite(name, "high", *high)?;
                require_finite(name, "step", *step)?;
                if low >= high {
                    return Err(domain_error(
                        name,
                        "range-bounds",
                        "lower bound must be less than upper bound",
                    ));
                }
                if *step <= 0.0 {
                    return Err(domain_error(name, "range-step", "step must be positive"));
                }
                if *step > high - low {
                    return Err(domain_error(
                        name,
                        "range-step",
                        "step cannot exceed the range width",
                    ));
                }
            }
            ParameterDomain::DiscreteSet { values } => {
                if values.is_empty() {
                    return Err(domain_error(
                        name,
                        "set-empty",
                        "at least one level is required",
                    ));
                }
                for (idx, v) in values.iter().enumerate() {
                    if !v.is_finite() {
                        return Err(domain_error(name, "set-value", "levels must be finite")
                            .map_info(|info| info.with_context("index", idx.to_string())));
                    }
                }
                let mut seen = BTreeSet::new();
                for v in values {
                    if !seen.insert(v.to_bits()) {
                        return Err(domain_error(
                            name,
                            "set-duplicate",
                            "duplicate levels are not allowed",
                        ));
                    }
                }
            }
            ParameterDomain::Categorical { levels } => {
                if levels.is_empty() {
                    return Err(domain_error(
                        name,
                        "categorical-empty",
                        "at least one level is required",
                    ));
                }
                let mut seen = BTreeSet::new();
                for (idx, level) in levels.iter().enumerate() {
                    if level.trim().is_empty() {
                        return Err(domain_error(
                            name,
                            "categorical-blank",
                            "levels cannot be empty",
                        )
                        .map_info(|info| info.with_context("index", idx.to_string())));
                    }
                    if !seen.insert(level.as_str()) {
                        return Err(domain_error(
                            name,
                            "categorical-duplicate",
                            "duplicate levels are not allowed",
                        ));
                    }
                }
            }
            ParameterDomain::Fixed { value } => {
                if value.is_null() {
                    return Err(domain_error(
                        name,
                        "fixed-null",
                        "fixed value cannot be null",
                    ));
                }
            }
            ParameterDomain::Substance { smiles } => {
                if smiles.is_empty() {
                    return Err(domain_error(
                        name,
                        "substance-empty",
                        "at least one SMILES string is required",
                    ));
                }
                let mut seen = BTreeSet::new();
                for (idx, entry) in smiles.iter().enumerate() {
                    validate_smiles(name, idx, entry)?;
                    if !seen.insert(entry.as_str()) {
                        return Err(domain_error(
                            name,
                            "substance-duplicate",
                            "duplicate SMILES strings are not allowed",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One named controllable variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name within the parameter space.
    pub name: String,
    /// Kind-specific domain.
    pub domain: ParameterDomain,
}

impl Parameter {
    /// Creates a parameter and leaves validation to the owning space.
    pub fn new(name: impl Into<String>, domain: ParameterDomain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    /// Validates the name and domain in isolation.
    pub fn validate(&self) -> Result<(), BolabError> {
        if self.name.trim().is_empty() {
            return Err(BolabError::Validation(ErrorInfo::new(
                "parameter-name",
                "parameter name cannot be empty",
            )));
        }
        if RESERVED_COLUMN_NAMES.contains(&self.name.as_str()) {
            return Err(BolabError::Validation(
                ErrorInfo::new("parameter-reserved", "parameter name shadows a ledger column")
                    .with_context("name", self.name.clone()),
            ));
        }
        self.domain.validate(&self.name)
    }
}

/// Ordered collection of uniquely named parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    /// Wraps an ordered parameter list without validating it.
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    /// Validates every parameter and name uniqueness across the space.
    pub fn validate(&self) -> Result<(), BolabError> {
        if self.parameters.is_empty() {
            return Err(BolabError::Validation(ErrorInfo::new(
                "space-empty",
                "a campaign requires at least one parameter",
            )));
        }
        let mut seen = BTreeSet::new();
        for parameter in &self.parameters {
            parameter.validate()?;
            if !seen.insert(parameter.name.as_str()) {
                return Err(BolabError::Validation(
                    ErrorInfo::new("parameter-duplicate", "duplicate parameter name")
                        .with_context("name", parameter.name.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Iterates every parameter in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Iterates the parameters the engine searches over (fixed excluded).
    pub fn active(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.domain.is_searchable())
    }

    /// Ordered parameter names.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Looks up one parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Number of parameters in the space.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when the space holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// True when `value` satisfies the named parameter's declared domain.
    pub fn contains(&self, name: &str, value: &Value) -> bool {
        self.get(name)
            .map(|p| p.domain.contains(value))
            .unwrap_or(false)
    }
}

fn require_finite(name: &str, field: &str, value: f64) -> Result<(), BolabError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(domain_error(name, "non-finite", "bound must be finite")
            .map_info(|info| info.with_context("field", field)))
    }
}

fn validate_smiles(name: &str, index: usize, entry: &str) -> Result<(), BolabError> {
    if entry.is_empty() {
        return Err(domain_error(name, "substance-blank", "SMILES cannot be empty")
            .map_info(|info| info.with_context("index", index.to_string())));
    }
    let mut round = 0i32;
    let mut square = 0i32;
    for ch in entry.chars() {
        if ch.is_whitespace() || !SMILES_CHARSET.contains(ch) {
            return Err(domain_error(
                name,
                "substance-charset",
                "SMILES contains an unsupported character",
            )
            .map_info(|info| {
                info.with_context("index", index.to_string())
                    .with_context("char", ch.to_string())
            }));
        }
        match ch {
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            _ => {}
        }
        if round < 0 || square < 0 {
            break;
        }
    }
    if round != 0 || square != 0 {
        return Err(domain_error(
            name,
            "substance-brackets",
            "SMILES brackets are unbalanced",
        )
        .map_info(|info| info.with_context("index", index.to_string())));
    }
    Ok(())
}

fn domain_error(name: &str, code: &str, message: &str) -> BolabError {
    BolabError::Validation(
        ErrorInfo::new(format!("parameter-{code}"), message).with_context("parameter", name),
    )
}

trait MapInfo {
    fn map_info(self, f: impl FnOnce(ErrorInfo) -> ErrorInfo) -> Self;
}

impl MapInfo for BolabError {
    fn map_info(self, f: impl FnOnce(ErrorInfo) -> ErrorInfo) -> Self {
        match self {
            BolabError::Validation(info) => BolabError::Validation(f(info)),
            other => other,
        }
    }
}

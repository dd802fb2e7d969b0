//! Optimization objectives and desirability weighting.

use std::collections::{BTreeMap, BTreeSet};

use bolab_core::errors::{BolabError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Direction in which an objective is optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Larger measured values are better.
    Maximize,
    /// Smaller measured values are better.
    Minimize,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Maximize => write!(f, "maximize"),
            Direction::Minimize => write!(f, "minimize"),
        }
    }
}

/// One measured optimization target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Unique name within the objective set; also the ledger column name.
    pub name: String,
    /// Optimization direction.
    pub direction: Direction,
    /// Non-negative desirability weight used for multi-objective blending.
    #[serde(default = "Objective::default_weight")]
    pub weight: f64,
    /// Optional `(lower, upper)` bounds on plausible measured values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64)>,
}

impl Objective {
    const fn default_weight() -> f64 {
        1.0
    }

    /// Creates an objective with the default weight and no bounds.
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            weight: Self::default_weight(),
            bounds: None,
        }
    }

    /// Sets the desirability weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Sets plausible measurement bounds.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    fn validate(&self) -> Result<(), BolabError> {
        if self.name.trim().is_empty() {
            return Err(BolabError::Validation(ErrorInfo::new(
                "objective-name",
                "objective name cannot be empty",
            )));
        }
        if crate::parameter::RESERVED_COLUMN_NAMES.contains(&self.name.as_str()) {
            return Err(BolabError::Validation(
                ErrorInfo::new("objective-reserved", "objective name shadows a ledger column")
                    .with_context("name", self.name.clone()),
            ));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(BolabError::Validation(
                ErrorInfo::new("objective-weight", "weight must be finite and non-negative")
                    .with_context("objective", self.name.clone())
                    .with_context("weight", self.weight.to_string()),
            ));
        }
        if let Some((lower, upper)) = self.bounds {
            if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                return Err(BolabError::Validation(
                    ErrorInfo::new("objective-bounds", "lower bound must be less than upper bound")
                        .with_context("objective", self.name.clone()),
                ));
            }
        }
        Ok(())
    }
}

/// Ordered, uniquely named, non-empty collection of objectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ObjectiveSet {
    objectives: Vec<Objective>,
}

impl ObjectiveSet {
    /// Wraps an ordered objective list without validating it.
    pub fn new(objectives: Vec<Objective>) -> Self {
        Self { objectives }
    }

    /// Validates every objective and name uniqueness across the set.
    pub fn validate(&self) -> Result<(), BolabError> {
        if self.objectives.is_empty() {
            return Err(BolabError::Validation(ErrorInfo::new(
                "objectives-empty",
                "a campaign requires at least one objective",
            )));
        }
        let mut seen = BTreeSet::new();
        for objective in &self.objectives {
            objective.validate()?;
            if !seen.insert(objective.name.as_str()) {
                return Err(BolabError::Validation(
                    ErrorInfo::new("objective-duplicate", "duplicate objective name")
                        .with_context("name", objective.name.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Iterates objectives in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Objective> {
        self.objectives.iter()
    }

    /// Ordered objective names (ledger column order).
    pub fn names(&self) -> Vec<String> {
        self.objectives.iter().map(|o| o.name.clone()).collect()
    }

    /// Number of objectives.
    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    /// True when the set holds no objectives.
    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    /// Normalized desirability weights summing to one.
    ///
    /// An all-zero weight vector degrades to equal shares so that a blended
    /// ranking always exists for a validated set.
    pub fn desirability_weights(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.objectives.iter().map(|o| o.weight).sum();
        if total == 0.0 {
            let share = 1.0 / self.objectives.len() as f64;
            return self
                .objectives
                .iter()
                .map(|o| (o.name.clone(), share))
                .collect();
        }
        self.objectives
            .iter()
            .map(|o| (o.name.clone(), o.weight / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_rejected() {
        let err = ObjectiveSet::default().validate().unwrap_err();
        assert_eq!(err.info().code, "objectives-empty");
    }

    #[test]
    fn negative_weight_rejected() {
        let set = ObjectiveSet::new(vec![
            Objective::new("yield", Direction::Maximize).with_weight(-1.0)
        ]);
        let err = set.validate().unwrap_err();
        assert_eq!(err.info().code, "objective-weight");
    }

    #[test]
    fn weights_normalize() {
        let set = ObjectiveSet::new(vec![
            Objective::new("yield", Direction::Maximize).with_weight(3.0),
            Objective::new("cost", Direction::Minimize).with_weight(1.0),
        ]);
        let weights = set.desirability_weights();
        assert!((weights["yield"] - 0.75).abs() < 1e-12);
        assert!((weights["cost"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_share_equally() {
        let set = ObjectiveSet::new(vec![
            Objective::new("yield", Direction::Maximize).with_weight(0.0),
            Objective::new("purity", Direction::Maximize).with_weight(0.0),
        ]);
        let weights = set.desirability_weights();
        assert!((weights["yield"] - 0.5).abs() < 1e-12);
        assert!((weights["purity"] - 0.5).abs() < 1e-12);
    }
}

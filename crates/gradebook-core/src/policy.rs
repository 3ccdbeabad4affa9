//! # Averaging Policy
//!
//! A discipline averages its components either with a simple arithmetic
//! mean or with a weighted mean keyed by component short code.
//!
//! The policy is stored in encoded form on the discipline record:
//!
//! ```text
//! SIMPLE
//! WEIGHTED:{"P1":0.4,"P2":0.6}
//! ```
//!
//! `AveragingPolicy::decode` turns that text into a typed value once per
//! computation; everything downstream works with the typed value.

use crate::primitives::{SIMPLE_TAG, WEIGHT_SCALE, WEIGHT_SUM_TOLERANCE, WEIGHTED_PREFIX};
use crate::{AssessmentComponent, GradebookError};
use std::collections::BTreeMap;

/// A component weight in parts per million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weight(u32);

impl Weight {
    /// Build from parts per million.
    #[must_use]
    pub const fn from_ppm(ppm: u32) -> Self {
        Self(ppm)
    }

    /// Convert a decimal weight (`0.35`) to parts per million.
    ///
    /// # Errors
    ///
    /// `GradebookError::InvalidWeight` for negative, non-finite or absurdly
    /// large weights.
    #[allow(clippy::float_arithmetic)]
    pub fn from_decimal(code: &str, value: f64) -> Result<Self, GradebookError> {
        let invalid = |reason: &str| GradebookError::InvalidWeight {
            code: code.to_string(),
            reason: reason.to_string(),
        };
        if !value.is_finite() {
            return Err(invalid("weight must be a finite number"));
        }
        if value < 0.0 {
            return Err(invalid("weight must not be negative"));
        }
        let ppm = (value * f64::from(WEIGHT_SCALE)).round();
        if ppm > f64::from(u32::MAX) {
            return Err(invalid("weight is too large"));
        }
        Ok(Self(ppm as u32))
    }

    #[must_use]
    pub const fn ppm(self) -> u32 {
        self.0
    }

    /// A zero weight counts as "no weight entry".
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / f64::from(WEIGHT_SCALE)
    }
}

/// Weights keyed by component short code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Weights(BTreeMap<String, Weight>);

impl Weights {
    /// Build from `(short code, decimal weight)` pairs.
    pub fn from_decimals<I, K>(pairs: I) -> Result<Self, GradebookError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (code, value) in pairs {
            let code = code.into();
            let weight = Weight::from_decimal(&code, value)?;
            map.insert(code, weight);
        }
        Ok(Self(map))
    }

    /// Parse a JSON object of weights.
    ///
    /// # Errors
    ///
    /// `GradebookError::MalformedWeights` for invalid JSON, arrays, scalars,
    /// or any non-numeric or negative weight.
    pub fn from_json(json: &str) -> Result<Self, GradebookError> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| GradebookError::MalformedWeights(format!("invalid JSON: {}", e)))?;

        let serde_json::Value::Object(object) = parsed else {
            return Err(GradebookError::MalformedWeights(
                "weights must be a JSON object".to_string(),
            ));
        };

        let mut map = BTreeMap::new();
        for (code, value) in object {
            let decimal = value.as_f64().ok_or_else(|| {
                GradebookError::MalformedWeights(format!("weight of {} is not a number", code))
            })?;
            let weight = Weight::from_decimal(&code, decimal)
                .map_err(|e| GradebookError::MalformedWeights(e.to_string()))?;
            map.insert(code, weight);
        }
        Ok(Self(map))
    }

    /// Encode as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(code, weight)| (code.clone(), serde_json::Value::from(weight.as_f64())))
            .collect();
        serde_json::Value::Object(object).to_string()
    }

    /// Weight of a component, if one is configured and non-zero.
    #[must_use]
    pub fn get(&self, short_code: &str) -> Option<Weight> {
        self.0.get(short_code).copied().filter(|w| !w.is_zero())
    }

    /// Whether the formula names the component, even with a zero weight.
    #[must_use]
    pub fn names(&self, short_code: &str) -> bool {
        self.0.contains_key(short_code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all weights in parts per million.
    #[must_use]
    pub fn sum_ppm(&self) -> u64 {
        self.0.values().map(|w| u64::from(w.ppm())).sum()
    }

    /// Check that the weights sum to `1.0 ± 0.01`.
    ///
    /// # Errors
    ///
    /// `GradebookError::WeightSumOutOfTolerance` otherwise.
    pub fn validate_sum(&self) -> Result<(), GradebookError> {
        let sum = self.sum_ppm();
        if sum.abs_diff(u64::from(WEIGHT_SCALE)) > u64::from(WEIGHT_SUM_TOLERANCE) {
            return Err(GradebookError::WeightSumOutOfTolerance { sum_ppm: sum });
        }
        Ok(())
    }
}

/// How a discipline turns component grades into a final grade.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AveragingPolicy {
    /// Arithmetic mean of every component.
    #[default]
    Simple,
    /// Weighted mean over the components that carry a weight.
    Weighted(Weights),
}

impl AveragingPolicy {
    /// Decode a stored formula.
    ///
    /// An empty formula means `Simple`.
    ///
    /// # Errors
    ///
    /// `GradebookError::MalformedWeights` for unknown tags or undecodable
    /// weight maps.
    pub fn decode(formula: &str) -> Result<Self, GradebookError> {
        let trimmed = formula.trim();
        if trimmed.is_empty() || trimmed == SIMPLE_TAG {
            return Ok(Self::Simple);
        }
        if let Some(json) = trimmed.strip_prefix(WEIGHTED_PREFIX) {
            return Weights::from_json(json).map(Self::Weighted);
        }
        Err(GradebookError::MalformedWeights(format!(
            "unknown averaging formula: {}",
            trimmed
        )))
    }

    /// Encode for storage on the discipline record.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Simple => SIMPLE_TAG.to_string(),
            Self::Weighted(weights) => format!("{}{}", WEIGHTED_PREFIX, weights.to_json()),
        }
    }

    /// Validate a policy before it is stored for a discipline.
    ///
    /// `Simple` is always valid. `Weighted` must sum to `1.0 ± 0.01` and name
    /// every registered component; extra keys are accepted.
    pub fn validate_for(&self, components: &[AssessmentComponent]) -> Result<(), GradebookError> {
        let Self::Weighted(weights) = self else {
            return Ok(());
        };
        weights.validate_sum()?;

        let missing: Vec<String> = components
            .iter()
            .filter(|c| !weights.names(&c.short_code))
            .map(|c| c.short_code.clone())
            .collect();
        if !missing.is_empty() {
            return Err(GradebookError::ComponentsMissingFromFormula(missing));
        }
        Ok(())
    }

    /// Short name used in reports and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Weighted(_) => "weighted",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

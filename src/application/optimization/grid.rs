//! Exhaustive parameter sweeps over discretized ranges.

use crate::domain::errors::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance for the inclusive upper bound under repeated float stepping.
const STEP_EPSILON: f64 = 1e-9;

/// A discretized range for one named parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Relative perturbation used by the genetic optimizer when seeding
    /// variants from this range (e.g. 0.2 = +/-20%).
    pub variation: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self {
            min,
            max,
            step,
            variation: 0.2,
        }
    }

    fn validate(&self, name: &str) -> Result<(), SearchError> {
        if !(self.step > 0.0) {
            return Err(SearchError::InvalidParameterRange {
                name: name.to_string(),
                reason: format!("step must be > 0, got {}", self.step),
            });
        }
        if self.min > self.max {
            return Err(SearchError::InvalidParameterRange {
                name: name.to_string(),
                reason: format!("min {} > max {}", self.min, self.max),
            });
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(SearchError::InvalidParameterRange {
                name: name.to_string(),
                reason: "bounds must be finite".to_string(),
            });
        }
        // A step the float magnitude swallows would never advance the sweep.
        if self.min + self.step == self.min || self.max - self.step == self.max {
            return Err(SearchError::InvalidParameterRange {
                name: name.to_string(),
                reason: format!(
                    "step {} is absorbed by the range magnitude [{}, {}]",
                    self.step, self.min, self.max
                ),
            });
        }
        Ok(())
    }

    /// Number of values in the sweep, boundary inclusive.
    fn value_count(&self) -> usize {
        ((self.max - self.min) / self.step + STEP_EPSILON).floor() as usize + 1
    }

    /// The i-th swept value, derived by index so float error never
    /// accumulates across steps.
    fn value_at(&self, i: usize) -> f64 {
        (self.min + i as f64 * self.step).min(self.max)
    }
}

/// One concrete assignment of every swept parameter.
pub type ParameterSet = BTreeMap<String, f64>;

/// Enumerate the full Cartesian product of all ranges, boundary inclusive.
///
/// Odometer-style over per-range value indices: advance the first parameter
/// that has not reached its last value; on overflow reset it to the first
/// and carry to the next. Counting indices instead of accumulating floats
/// guarantees termination for every validated range.
pub fn generate_parameter_sets(
    ranges: &BTreeMap<String, ParameterRange>,
) -> Result<Vec<ParameterSet>, SearchError> {
    for (name, range) in ranges {
        range.validate(name)?;
    }

    if ranges.is_empty() {
        return Ok(vec![ParameterSet::new()]);
    }

    let names: Vec<&String> = ranges.keys().collect();
    let counts: Vec<usize> = ranges.values().map(|r| r.value_count()).collect();
    let mut indices = vec![0usize; names.len()];
    let mut sets = Vec::new();

    loop {
        sets.push(
            names
                .iter()
                .zip(ranges.values())
                .zip(indices.iter())
                .map(|((name, range), &i)| ((*name).clone(), range.value_at(i)))
                .collect::<ParameterSet>(),
        );

        // Odometer increment with carry.
        let mut pos = 0;
        loop {
            if pos == names.len() {
                return Ok(sets);
            }
            indices[pos] += 1;
            if indices[pos] < counts[pos] {
                break;
            }
            indices[pos] = 0;
            pos += 1;
        }
    }
}

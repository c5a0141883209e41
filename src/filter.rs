use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::masked::MaskedArray;

/// Declarative rule for which raw values count as missing. Any combination of
/// the three checks may be set; a value is valid only if it passes all of them.
/// Non-finite values are always missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidityPolicy {
    /// Exact sentinel marking a missing measurement
    #[serde(default)]
    pub fill_value: Option<f32>,
    /// Values strictly below this are missing
    #[serde(default)]
    pub lower_bound: Option<f32>,
    /// Values strictly above this are missing
    #[serde(default)]
    pub upper_bound: Option<f32>,
}

impl ValidityPolicy {
    pub fn fill(fill_value: f32) -> Self {
        Self { fill_value: Some(fill_value), ..Default::default() }
    }

    pub fn at_least(lower_bound: f32) -> Self {
        Self { lower_bound: Some(lower_bound), ..Default::default() }
    }

    pub fn range(lower_bound: f32, upper_bound: f32) -> Self {
        Self { fill_value: None, lower_bound: Some(lower_bound), upper_bound: Some(upper_bound) }
    }

    /// Use the file's own fill value unless the policy already names one.
    pub fn or_fill_value(self, file_fill: Option<f64>) -> Self {
        match (self.fill_value, file_fill) {
            (None, Some(f)) => Self { fill_value: Some(f as f32), ..self },
            _ => self
        }
    }

    pub fn is_valid(&self, v: f32) -> bool {
        if !v.is_finite() {
            return false;
        }
        if self.fill_value.is_some_and(|f| v == f) {
            return false;
        }
        if self.lower_bound.is_some_and(|lo| v < lo) {
            return false;
        }
        if self.upper_bound.is_some_and(|hi| v > hi) {
            return false;
        }
        true
    }

    /// Mask every raw value failing this policy. An all-missing result is not an error.
    pub fn apply<D: Dimension>(&self, values: Array<f32, D>) -> MaskedArray<D> {
        let out = MaskedArray::from_predicate(values, |v| self.is_valid(v));
        log::debug!("Validity filter kept {} of {} values", out.n_valid(), out.len());
        out
    }

    /// Apply this policy on top of an existing mask; already-missing cells stay missing.
    pub fn refine<D: Dimension>(&self, arr: MaskedArray<D>) -> MaskedArray<D> {
        arr.retain(|v| self.is_valid(v))
    }
}

//! Arrays that carry their own validity mask.

use ndarray::{Array, Dimension, Zip};
use serde::Serialize;

use crate::error::AqError;
use crate::utils::RunningMean;

/// A value array paired with a same-shape mask; `mask[i] == true` means the
/// value at `i` is valid. Cells marked invalid never take part in arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskedArray<D: Dimension> {
    values: Array<f32, D>,
    mask: Array<bool, D>,
}

impl<D: Dimension> MaskedArray<D> {
    pub fn from_parts(values: Array<f32, D>, mask: Array<bool, D>) -> Result<Self, AqError> {
        if values.shape() != mask.shape() {
            return Err(AqError::MaskShapeMismatch {
                values: values.shape().to_vec(),
                mask: mask.shape().to_vec(),
            });
        }
        Ok(Self { values, mask })
    }

    /// Every cell valid.
    pub fn all_valid(values: Array<f32, D>) -> Self {
        let mask = Array::from_elem(values.raw_dim(), true);
        Self { values, mask }
    }

    /// Every cell missing, with the given shape.
    pub fn all_missing(dim: D) -> Self {
        Self { values: Array::from_elem(dim.clone(), f32::NAN), mask: Array::from_elem(dim, false) }
    }

    /// Mask computed cell by cell from the values themselves.
    pub fn from_predicate<F: Fn(f32) -> bool>(values: Array<f32, D>, is_valid: F) -> Self {
        let mask = values.mapv(is_valid);
        Self { values, mask }
    }

    /// Build from an array that uses NaN as its only missing marker.
    pub fn from_nan_filled(values: Array<f32, D>) -> Self {
        let mask = values.mapv(|v| !v.is_nan());
        Self { values, mask }
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn raw_dim(&self) -> D {
        self.values.raw_dim()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Array<f32, D> {
        &self.values
    }

    pub fn mask(&self) -> &Array<bool, D> {
        &self.mask
    }

    pub fn into_parts(self) -> (Array<f32, D>, Array<bool, D>) {
        (self.values, self.mask)
    }

    pub fn get(&self, index: D::Pattern) -> Option<f32>
    where D::Pattern: ndarray::NdIndex<D> + Clone
    {
        match self.mask.get(index.clone()) {
            Some(true) => self.values.get(index).copied(),
            _ => None
        }
    }

    pub fn n_valid(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn is_all_missing(&self) -> bool {
        self.n_valid() == 0
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter()
            .zip(self.mask.iter())
            .filter_map(|(&v, &m)| if m { Some(v) } else { None })
    }

    /// Values with missing cells replaced by NaN.
    pub fn to_nan_filled(&self) -> Array<f32, D> {
        let mut out = self.values.clone();
        Zip::from(&mut out).and(&self.mask).for_each(|v, &m| {
            if !m {
                *v = f32::NAN;
            }
        });
        out
    }

    /// Mark additional cells missing. `keep` sees only currently valid values.
    pub fn retain<F: Fn(f32) -> bool>(mut self, keep: F) -> Self {
        Zip::from(&mut self.mask).and(&self.values).for_each(|m, &v| {
            if *m && !keep(v) {
                *m = false;
            }
        });
        self
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.valid_values().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v)))
        })
    }

    pub fn mean(&self) -> Option<f64> {
        let mut m = RunningMean::<f64>::new();
        for v in self.valid_values() {
            m += v as f64;
        }
        m.mean()
    }
}

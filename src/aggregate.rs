//! Missing-aware averaging of same-shape arrays across granules or time steps.

use ndarray::{Array, Dimension, Zip};

use crate::error::AqError;
use crate::masked::MaskedArray;

/// Per-cell running mean over a stream of same-shape masked arrays.
///
/// Sums are kept in `f64` so that the result does not depend on the order
/// the inputs arrive in beyond ordinary rounding. Each input can be dropped
/// as soon as it has been added.
#[derive(Debug, Clone)]
pub struct GridMean<D: Dimension> {
    sum: Array<f64, D>,
    count: Array<u32, D>,
    n_inputs: usize,
}

impl<D: Dimension> GridMean<D> {
    pub fn new(dim: D) -> Self {
        Self {
            sum: Array::zeros(dim.clone()),
            count: Array::zeros(dim),
            n_inputs: 0
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn shape(&self) -> &[usize] {
        self.sum.shape()
    }

    pub fn add(&mut self, arr: &MaskedArray<D>) -> Result<(), AqError> {
        if arr.shape() != self.sum.shape() {
            return Err(AqError::ShapeMismatch {
                index: self.n_inputs,
                expected: self.sum.shape().to_vec(),
                got: arr.shape().to_vec()
            });
        }

        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(arr.values())
            .and(arr.mask())
            .for_each(|s, n, &v, &valid| {
                if valid {
                    *s += v as f64;
                    *n += 1;
                }
            });
        self.n_inputs += 1;
        Ok(())
    }

    /// A cell is missing in the result iff no input had a valid value there.
    pub fn finish(self) -> Result<MaskedArray<D>, AqError> {
        let mut values = Array::from_elem(self.sum.raw_dim(), f32::NAN);
        Zip::from(&mut values)
            .and(&self.sum)
            .and(&self.count)
            .for_each(|out, &s, &n| {
                if n > 0 {
                    *out = (s / n as f64) as f32;
                }
            });
        let mask = self.count.mapv(|n| n > 0);
        MaskedArray::from_parts(values, mask)
    }
}

/// Mean of every non-missing value at each cell across `inputs`.
///
/// All inputs must have the shape of the first one. A single input is
/// returned unchanged.
pub fn mean_of<D: Dimension>(inputs: &[MaskedArray<D>]) -> Result<MaskedArray<D>, AqError> {
    let first = inputs.first()
        .ok_or_else(|| AqError::Config("cannot aggregate an empty list of arrays".to_owned()))?;

    if inputs.len() == 1 {
        return Ok(first.clone());
    }

    let mut acc = GridMean::new(first.raw_dim());
    for arr in inputs {
        acc.add(arr)?;
    }
    log::debug!("Averaged {} arrays of shape {:?}", acc.n_inputs(), acc.shape());
    acc.finish()
}

//! Attaching explicit latitude/longitude coordinates to aggregated data.

use std::path::Path;

use ndarray::{concatenate, Array1, Axis, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::AqError;
use crate::masked::MaskedArray;

/// Relative tolerance when checking that a span is a whole number of cells.
const CELL_COUNT_TOL: f64 = 1e-6;

/// How the axes of a gridded product are placed. The two conventions are not
/// interchangeable: callers must choose the one the product was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "convention", rename_all = "snake_case")]
pub enum GridConvention {
    /// Cells of width `resolution` tiling `[lower, upper]`, coordinates at cell centres.
    CellCentered {
        lat_bounds: (f64, f64),
        lon_bounds: (f64, f64),
        resolution: f64,
    },
    /// `lat_count` x `lon_count` evenly spaced coordinates from the first to
    /// the last value inclusive.
    Linspace {
        lat_endpoints: (f64, f64),
        lon_endpoints: (f64, f64),
        lat_count: usize,
        lon_count: usize,
    },
}

impl GridConvention {
    /// The 1x1 degree global grid of the OMI daily L3 NO2 product (180 x 360).
    pub fn omi_l3_1deg() -> Self {
        Self::CellCentered { lat_bounds: (-90.0, 90.0), lon_bounds: (-180.0, 180.0), resolution: 1.0 }
    }

    /// The 0.25 degree global grid (720 x 1440), described by its first and last cell centres.
    pub fn quarter_degree() -> Self {
        Self::Linspace {
            lat_endpoints: (-89.875, 89.875),
            lon_endpoints: (-179.875, 179.875),
            lat_count: 720,
            lon_count: 1440,
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "omi_l3_1deg" => Some(Self::omi_l3_1deg()),
            "quarter_degree" => Some(Self::quarter_degree()),
            _ => None
        }
    }

    /// Check the convention on its own, before any data is read.
    pub fn validate(&self) -> Result<(), AqError> {
        match self {
            Self::CellCentered { lat_bounds, lon_bounds, resolution } => {
                n_cells(lat_bounds.0, lat_bounds.1, *resolution)?;
                n_cells(lon_bounds.0, lon_bounds.1, *resolution)?;
                Ok(())
            },
            Self::Linspace { lat_endpoints, lon_endpoints, lat_count, lon_count } => {
                for (&(a, b), &n) in [(lat_endpoints, lat_count), (lon_endpoints, lon_count)] {
                    if !a.is_finite() || !b.is_finite() {
                        return Err(AqError::GridConfig(format!("non-finite axis endpoints ({a}, {b})")));
                    }
                    if n == 0 {
                        return Err(AqError::GridConfig("an axis needs at least one point".to_owned()));
                    }
                    if n > 1 && a == b {
                        return Err(AqError::GridConfig(format!("{n} points cannot share the single endpoint {a}")));
                    }
                }
                Ok(())
            }
        }
    }

    /// Latitude axis of length `shape.0` and longitude axis of length `shape.1`.
    /// A shape other than the declared one is a `GridConfig` error.
    pub fn axes(&self, shape: (usize, usize)) -> Result<(Array1<f64>, Array1<f64>), AqError> {
        let (nrow, ncol) = shape;
        match self {
            Self::CellCentered { lat_bounds, lon_bounds, resolution } => {
                let lat = cell_centered_axis(lat_bounds.0, lat_bounds.1, *resolution)?;
                let lon = cell_centered_axis(lon_bounds.0, lon_bounds.1, *resolution)?;
                if lat.len() != nrow || lon.len() != ncol {
                    return Err(AqError::GridConfig(format!(
                        "declared grid is {} x {} cells but the data array is {nrow} x {ncol}",
                        lat.len(), lon.len()
                    )));
                }
                Ok((lat, lon))
            },
            Self::Linspace { lat_endpoints, lon_endpoints, lat_count, lon_count } => {
                if (*lat_count, *lon_count) != (nrow, ncol) {
                    return Err(AqError::GridConfig(format!(
                        "declared grid is {lat_count} x {lon_count} points but the data array is {nrow} x {ncol}"
                    )));
                }
                let lat = linspace_axis(lat_endpoints.0, lat_endpoints.1, nrow)?;
                let lon = linspace_axis(lon_endpoints.0, lon_endpoints.1, ncol)?;
                Ok((lat, lon))
            }
        }
    }
}

/// Deserialize a grid either from a preset name (`grid = "omi_l3_1deg"`) or
/// from a full table with a `convention` key.
pub fn grid_or_preset<'de, D>(deserializer: D) -> Result<GridConvention, D::Error>
where D: serde::Deserializer<'de>
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum GridSpec {
        Preset(String),
        Explicit(GridConvention),
    }

    match GridSpec::deserialize(deserializer)? {
        GridSpec::Preset(name) => GridConvention::preset(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown grid preset '{name}'"))),
        GridSpec::Explicit(conv) => Ok(conv),
    }
}

fn n_cells(lower: f64, upper: f64, resolution: f64) -> Result<usize, AqError> {
    if !(resolution > 0.0) || !resolution.is_finite() {
        return Err(AqError::GridConfig(format!("resolution must be positive, got {resolution}")));
    }
    if !(upper > lower) {
        return Err(AqError::GridConfig(format!("upper bound {upper} must exceed lower bound {lower}")));
    }

    let n = (upper - lower) / resolution;
    let rounded = n.round();
    if (n - rounded).abs() > CELL_COUNT_TOL * rounded.max(1.0) {
        return Err(AqError::GridConfig(format!(
            "span {lower}..{upper} is not a whole number of {resolution}-wide cells ({n})"
        )));
    }
    Ok(rounded as usize)
}

/// Cell-centre coordinates `lower + (i + 0.5) * resolution` for every cell in `[lower, upper]`.
pub fn cell_centered_axis(lower: f64, upper: f64, resolution: f64) -> Result<Array1<f64>, AqError> {
    let n = n_cells(lower, upper, resolution)?;
    Ok(Array1::from_iter((0..n).map(|i| lower + (i as f64 + 0.5) * resolution)))
}

/// `count` evenly spaced values from `first` to `last`, both included.
pub fn linspace_axis(first: f64, last: f64, count: usize) -> Result<Array1<f64>, AqError> {
    match count {
        0 => Err(AqError::GridConfig("an axis needs at least one point".to_owned())),
        1 => Ok(Array1::from_elem(1, first)),
        _ => {
            let step = (last - first) / (count - 1) as f64;
            let mut axis = Array1::from_iter((0..count).map(|i| first + i as f64 * step));
            // pin the end exactly; accumulated rounding would otherwise leave it a hair off
            axis[count - 1] = last;
            Ok(axis)
        }
    }
}

/// Valid swath pixels flattened to points. Order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwathPoints {
    pub latitude: Array1<f32>,
    pub longitude: Array1<f32>,
    pub values: Array1<f32>,
}

impl SwathPoints {
    /// Keep one point per valid pixel. Pixels with a missing value or non-finite coordinates are dropped.
    /// `file` is only used to label a shape error.
    pub fn from_pixels(file: &Path, latitude: &ndarray::ArrayD<f32>, longitude: &ndarray::ArrayD<f32>, values: &MaskedArray<ndarray::IxDyn>) -> Result<Self, AqError> {
        for (varname, coord) in [("latitude", latitude), ("longitude", longitude)] {
            if coord.shape() != values.shape() {
                return Err(AqError::FieldShapeMismatch {
                    file: file.to_owned(),
                    varname: varname.to_owned(),
                    expected: values.shape().to_vec(),
                    got: coord.shape().to_vec()
                });
            }
        }

        let mut lat = Vec::new();
        let mut lon = Vec::new();
        let mut val = Vec::new();
        let it = latitude.iter()
            .zip(longitude.iter())
            .zip(values.values().iter().zip(values.mask().iter()));
        for ((&y, &x), (&v, &valid)) in it {
            if valid && y.is_finite() && x.is_finite() {
                lat.push(y);
                lon.push(x);
                val.push(v);
            }
        }

        Ok(Self { latitude: Array1::from(lat), longitude: Array1::from(lon), values: Array1::from(val) })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append another granule's points.
    pub fn extend(mut self, other: Self) -> Self {
        self.latitude = concatenate![Axis(0), self.latitude, other.latitude];
        self.longitude = concatenate![Axis(0), self.longitude, other.longitude];
        self.values = concatenate![Axis(0), self.values, other.values];
        self
    }

    /// Drop the points whose value fails `keep`.
    pub fn retain<F: Fn(f32) -> bool>(self, keep: F) -> Self {
        let idx = self.values.iter()
            .enumerate()
            .filter_map(|(i, &v)| keep(v).then_some(i))
            .collect::<Vec<_>>();
        Self {
            latitude: self.latitude.select(Axis(0), &idx),
            longitude: self.longitude.select(Axis(0), &idx),
            values: self.values.select(Axis(0), &idx),
        }
    }

    pub fn as_masked(&self) -> MaskedArray<Ix1> {
        MaskedArray::all_valid(self.values.clone())
    }
}

/// Data ready for plotting, with explicit coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum RegriddedField {
    /// `values[k]` lies at `(latitude[k], longitude[k])`.
    Swath(SwathPoints),
    /// `values[[i, j]]` lies at `(latitude[i], longitude[j])`.
    Gridded {
        latitude: Array1<f64>,
        longitude: Array1<f64>,
        values: MaskedArray<Ix2>,
    },
}

impl RegriddedField {
    pub fn gridded(values: MaskedArray<Ix2>, convention: &GridConvention) -> Result<Self, AqError> {
        let shape = values.raw_dim();
        let (latitude, longitude) = convention.axes((shape[0], shape[1]))?;
        Ok(Self::Gridded { latitude, longitude, values })
    }

    pub fn n_valid(&self) -> usize {
        match self {
            Self::Swath(pts) => pts.len(),
            Self::Gridded { values, .. } => values.n_valid()
        }
    }

    /// Min and max over the valid values.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        match self {
            Self::Swath(pts) => pts.as_masked().min_max(),
            Self::Gridded { values, .. } => values.min_max()
        }
    }
}

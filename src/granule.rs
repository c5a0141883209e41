//! Reading one granule (one file) of swath or gridded data.

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::AqError;
use crate::filter::ValidityPolicy;
use crate::masked::MaskedArray;
use crate::regrid::GridConvention;
use crate::utils::{load_nc_var, open_nc};

/// Where the three fields of a swath product live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwathLayout {
    #[serde(default = "SwathLayout::default_geo_group")]
    pub geolocation_group: String,
    #[serde(default = "SwathLayout::default_lat_var")]
    pub latitude_var: String,
    #[serde(default = "SwathLayout::default_lon_var")]
    pub longitude_var: String,
    #[serde(default = "SwathLayout::default_product_group")]
    pub product_group: String,
    pub value_var: String,
}

impl SwathLayout {
    fn default_geo_group() -> String { "geolocation".to_owned() }
    fn default_lat_var() -> String { "latitude".to_owned() }
    fn default_lon_var() -> String { "longitude".to_owned() }
    fn default_product_group() -> String { "product".to_owned() }

    /// Standard TEMPO L2 layout with the given product field.
    pub fn tempo(value_var: &str) -> Self {
        Self {
            geolocation_group: Self::default_geo_group(),
            latitude_var: Self::default_lat_var(),
            longitude_var: Self::default_lon_var(),
            product_group: Self::default_product_group(),
            value_var: value_var.to_owned(),
        }
    }
}

/// Where the single field of a gridded product lives and how its axes are placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedLayout {
    /// Slash-separated group path, e.g. `HDFEOS/GRIDS/ColumnAmountNO2/Data Fields`. Empty for the root group.
    #[serde(default)]
    pub group_path: String,
    pub value_var: String,
    #[serde(deserialize_with = "crate::regrid::grid_or_preset")]
    pub grid: GridConvention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetFormat {
    Swath(SwathLayout),
    Gridded(GriddedLayout),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coordinates {
    /// One (lat, lon) pair per pixel, same shape as the values.
    Swath { latitude: ArrayD<f32>, longitude: ArrayD<f32> },
    /// Regular axes implied by a declared grid convention.
    Gridded(GridConvention),
}

/// One file's worth of a single physical quantity, already validity-filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct Granule {
    pub source: PathBuf,
    pub coordinates: Coordinates,
    pub values: MaskedArray<ndarray::IxDyn>,
    pub policy: ValidityPolicy,
}

impl Granule {
    /// Read one swath granule. The file is closed before this returns.
    pub fn load_swath(file: &Path, layout: &SwathLayout, policy: &ValidityPolicy) -> Result<Self, AqError> {
        let ds = open_nc(file)?;

        let (latitude, _) = load_nc_var(&ds, &layout.geolocation_group, &layout.latitude_var)?;
        let (longitude, _) = load_nc_var(&ds, &layout.geolocation_group, &layout.longitude_var)?;
        let (raw, file_fill) = load_nc_var(&ds, &layout.product_group, &layout.value_var)?;

        for (varname, arr) in [(&layout.latitude_var, &latitude), (&layout.longitude_var, &longitude)] {
            if arr.shape() != raw.shape() {
                return Err(AqError::FieldShapeMismatch {
                    file: file.to_owned(),
                    varname: varname.clone(),
                    expected: raw.shape().to_vec(),
                    got: arr.shape().to_vec()
                });
            }
        }

        let policy = policy.or_fill_value(file_fill);
        let values = policy.apply(raw);
        log::debug!("Loaded swath granule {} with {} of {} valid pixels", file.display(), values.n_valid(), values.len());

        Ok(Self {
            source: file.to_owned(),
            coordinates: Coordinates::Swath { latitude, longitude },
            values,
            policy
        })
    }

    /// Read one gridded granule. Its axes come from `layout.grid`, not from the file.
    pub fn load_gridded(file: &Path, layout: &GriddedLayout, policy: &ValidityPolicy) -> Result<Self, AqError> {
        let ds = open_nc(file)?;
        let (raw, file_fill) = load_nc_var(&ds, &layout.group_path, &layout.value_var)?;

        if raw.ndim() != 2 {
            return Err(AqError::from_shape_error(
                ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape),
                file.to_owned(),
                layout.value_var.clone()
            ));
        }

        let policy = policy.or_fill_value(file_fill);
        let values = policy.apply(raw);
        log::debug!("Loaded gridded granule {} with {} of {} valid cells", file.display(), values.n_valid(), values.len());

        Ok(Self {
            source: file.to_owned(),
            coordinates: Coordinates::Gridded(layout.grid.clone()),
            values,
            policy
        })
    }

    pub fn load(file: &Path, format: &DatasetFormat, policy: &ValidityPolicy) -> Result<Self, AqError> {
        match format {
            DatasetFormat::Swath(layout) => Self::load_swath(file, layout, policy),
            DatasetFormat::Gridded(layout) => Self::load_gridded(file, layout, policy),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// The values as a 2-D array, for gridded aggregation.
    pub fn values_2d(&self) -> Result<MaskedArray<Ix2>, AqError> {
        let (values, mask) = self.values.clone().into_parts();
        let to_2d = |e| AqError::from_shape_error(e, self.source.clone(), "values".to_owned());
        let values = values.into_dimensionality::<Ix2>().map_err(to_2d)?;
        let mask = mask.into_dimensionality::<Ix2>().map_err(to_2d)?;
        MaskedArray::from_parts(values, mask)
    }
}

/// One variable found while walking a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSummary {
    pub path: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub units: String,
}

/// Walk every group of a file and list its variables with their shapes.
pub fn inspect(file: &Path) -> Result<Vec<VariableSummary>, AqError> {
    fn summarize(var: &netcdf::Variable, prefix: &str) -> VariableSummary {
        let dims = var.dimensions();
        VariableSummary {
            path: format!("{prefix}{}", var.name()),
            dimensions: dims.iter().map(|d| d.name()).collect(),
            shape: dims.iter().map(|d| d.len()).collect(),
            units: crate::utils::get_str_attr_with_default(var, "units", String::new()),
        }
    }

    fn walk(grp: &netcdf::Group, prefix: &str, out: &mut Vec<VariableSummary>) {
        for var in grp.variables() {
            out.push(summarize(&var, prefix));
        }
        for sub in grp.groups() {
            let sub_prefix = format!("{prefix}{}/", sub.name());
            walk(&sub, &sub_prefix, out);
        }
    }

    let ds = open_nc(file)?;
    let mut out = Vec::new();
    match ds.root() {
        Some(root) => walk(&root, "", &mut out),
        // classic files have no group tree
        None => out.extend(ds.variables().map(|v| summarize(&v, ""))),
    }
    Ok(out)
}

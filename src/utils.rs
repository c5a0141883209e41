use std::io::Read;
use std::ops::AddAssign;
use std::path::{PathBuf, Path};

use ndarray::ArrayD;
use num_traits::Float;
use sha2::{Digest, Sha256};

use crate::error::AqError;

pub(crate) fn nc_file(ds: &netcdf::File) -> PathBuf {
    ds.path()
      .unwrap_or_else(|_| PathBuf::from("?"))
}

pub fn open_nc(file: &Path) -> Result<netcdf::File, AqError> {
    netcdf::open(file)
        .map_err(|e| AqError::from_nc_error(e, file.to_owned()))
}

/// Look up a (possibly nested, slash-separated) group. An empty path means the root group.
pub fn get_group<'f>(ds: &'f netcdf::File, group_path: &str) -> Result<netcdf::Group<'f>, AqError> {
    let file = nc_file(ds);
    let group_path = group_path.trim_matches('/');
    if group_path.is_empty() {
        return ds.root()
            .ok_or_else(|| AqError::NetcdfMissingGroup { file, grpname: "/".to_owned() });
    }

    ds.group(group_path)
        .map_err(|e| AqError::from_nc_error(e, file.clone()))?
        .ok_or_else(|| AqError::NetcdfMissingGroup { file, grpname: group_path.to_owned() })
}

/// Read a whole variable as `f32`, whatever its on-disk numeric type, along
/// with its `_FillValue` if it has a numeric one. An empty group path reads
/// from the root, which also works for classic (non-HDF5) files.
pub fn load_nc_var(ds: &netcdf::File, group_path: &str, varname: &str) -> Result<(ArrayD<f32>, Option<f64>), AqError> {
    fn read(var: &netcdf::Variable, file: PathBuf) -> Result<(ArrayD<f32>, Option<f64>), AqError> {
        let data = var.values_arr::<f32, _>(netcdf::extent::Extents::All)
            .map_err(|e| AqError::from_nc_error(e, file))?;
        Ok((data, get_num_attr(var, "_FillValue")))
    }

    let file = nc_file(ds);
    let missing_var = |file: PathBuf| AqError::NetcdfMissingVar { file, varname: varname.to_owned() };
    if group_path.trim_matches('/').is_empty() {
        let var = ds.variable(varname).ok_or_else(|| missing_var(file.clone()))?;
        read(&var, file)
    } else {
        let grp = get_group(ds, group_path)?;
        let var = grp.variable(varname).ok_or_else(|| missing_var(file.clone()))?;
        read(&var, file)
    }
}

/// Numeric attribute as `f64`, or `None` if it is absent or not a numeric scalar.
pub fn get_num_attr(nc_var: &netcdf::Variable, attr_name: &str) -> Option<f64> {
    let value = nc_var.attribute(attr_name)?.value().ok()?;
    match value {
        netcdf::AttrValue::Uchar(v) => Some(v as f64),
        netcdf::AttrValue::Schar(v) => Some(v as f64),
        netcdf::AttrValue::Ushort(v) => Some(v as f64),
        netcdf::AttrValue::Short(v) => Some(v as f64),
        netcdf::AttrValue::Uint(v) => Some(v as f64),
        netcdf::AttrValue::Int(v) => Some(v as f64),
        netcdf::AttrValue::Ulonglong(v) => Some(v as f64),
        netcdf::AttrValue::Longlong(v) => Some(v as f64),
        netcdf::AttrValue::Float(v) => Some(v as f64),
        netcdf::AttrValue::Double(v) => Some(v),
        _ => None
    }
}

pub fn get_str_attr_with_default(nc_var: &netcdf::Variable, attr_name: &str, default: String) -> String {
    let value = match nc_var.attribute(attr_name).map(|a| a.value()) {
        Some(Ok(v)) => v,
        _ => return default
    };

    match value {
        netcdf::AttrValue::Str(v) => v,
        netcdf::AttrValue::Strs(v) => v.join("\n"),
        _ => default
    }
}

pub fn file_sha256(file: &Path) -> Result<String, AqError> {
    let mut f = std::fs::File::open(file)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 16];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Mean accumulated one value at a time.
#[derive(Debug, Clone, Copy)]
pub struct RunningMean<T: Float> {
    sum: T,
    count: usize,
}

impl<T: Float> Default for RunningMean<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> RunningMean<T> {
    pub fn new() -> Self {
        Self { sum: T::zero(), count: 0 }
    }

    pub fn from_slice(values: &[T]) -> Self {
        let mut m = Self::new();
        for &v in values {
            m += v;
        }
        m
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<T> {
        if self.count == 0 {
            None
        } else {
            T::from(self.count).map(|n| self.sum / n)
        }
    }
}

impl<T: Float> AddAssign<T> for RunningMean<T> {
    fn add_assign(&mut self, rhs: T) {
        self.sum = self.sum + rhs;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowProgress {
    Yes,
    No
}

impl ShowProgress {
    pub fn bar(&self, n: u64, msg: &str) -> indicatif::ProgressBar {
        match self {
            ShowProgress::Yes => {
                let pb = indicatif::ProgressBar::new(n);
                if let Ok(sty) = indicatif::ProgressStyle::with_template("{msg} {bar} {human_pos}/{human_len}") {
                    pb.set_style(sty);
                }
                pb.set_message(msg.to_owned());
                pb
            },
            ShowProgress::No => indicatif::ProgressBar::hidden()
        }
    }
}

//! Delimited-text exports: the per-granule inventory and the resource catalogue.

use std::io::Write;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::AqError;
use crate::granule::Granule;
use crate::utils::file_sha256;

/// One line of the granule inventory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GranuleInventoryRow {
    pub path: String,
    pub sha256: String,
    /// Dimension lengths joined with `x`, e.g. `720x1440`
    pub shape: String,
    pub n_valid: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

impl GranuleInventoryRow {
    pub fn from_granule(granule: &Granule) -> Result<Self, AqError> {
        let (min, max) = match granule.values.min_max() {
            Some((lo, hi)) => (Some(lo), Some(hi)),
            None => (None, None)
        };
        Ok(Self {
            path: granule.source.display().to_string(),
            sha256: file_sha256(&granule.source)?,
            shape: granule.shape().iter().join("x"),
            n_valid: granule.values.n_valid(),
            min,
            max,
            mean: granule.values.mean(),
        })
    }
}

/// One entry of the catalogue of data sources used by the dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub title: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub purpose: String,
    pub access: String,
}

/// Write any sequence of serializable rows as CSV with a header line.
pub fn write_table<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<(), AqError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render rows to CSV in memory, so a caller can check the table encodes
/// before it writes anything to disk.
pub fn encode_table<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, AqError> {
    let mut buf = Vec::new();
    write_table(&mut buf, rows)?;
    Ok(buf)
}

/// Write an already encoded table, creating parent directories.
pub fn save_encoded_table(path: &Path, table: &[u8]) -> Result<(), AqError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, table)?;
    Ok(())
}

pub fn write_table_file<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AqError> {
    save_encoded_table(path, &encode_table(rows)?)?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_table() {
        let rows = vec![
            ResourceEntry {
                title: "TEMPO NO2 L2".to_owned(),
                resource_type: "Satellite".to_owned(),
                purpose: "Hourly tropospheric NO2 over North America".to_owned(),
                access: "Earthdata".to_owned(),
            },
            ResourceEntry {
                title: "OpenAQ".to_owned(),
                resource_type: "Ground station".to_owned(),
                purpose: "Surface NO2, O3, PM2.5".to_owned(),
                access: "REST API".to_owned(),
            },
        ];
        let mut buf = Vec::new();
        write_table(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "title,type,purpose,access");
        assert_eq!(lines[1], "TEMPO NO2 L2,Satellite,Hourly tropospheric NO2 over North America,Earthdata");
        assert_eq!(lines[2], "OpenAQ,Ground station,\"Surface NO2, O3, PM2.5\",REST API");
    }

    #[test]
    fn test_inventory_row_missing_stats_blank() {
        let row = GranuleInventoryRow {
            path: "a.nc".to_owned(),
            sha256: "00".to_owned(),
            shape: "2x2".to_owned(),
            n_valid: 0,
            min: None,
            max: None,
            mean: None,
        };
        let mut buf = Vec::new();
        write_table(&mut buf, &[row]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1), Some("a.nc,00,2x2,0,,,"));
    }

    #[test]
    fn test_write_table_file_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out").join("catalog.csv");
        let rows: Vec<ResourceEntry> = Vec::new();
        write_table_file(&p, &rows).unwrap();
        assert!(p.exists());
    }
}

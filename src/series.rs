//! Time-indexed point measurements (ground stations, hourly forecasts).

use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::{Array1, Ix1};
use serde::Serialize;

use crate::error::AqError;
use crate::masked::MaskedArray;

/// Timestamp layouts accepted besides RFC 3339. Naive times are taken as UTC.
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|t| t.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesColumn {
    pub name: String,
    pub unit: Option<String>,
    /// `None` marks a missing measurement.
    pub values: Vec<Option<f64>>,
}

impl SeriesColumn {
    pub fn as_masked(&self) -> MaskedArray<Ix1> {
        let values = Array1::from_iter(self.values.iter().map(|v| v.map(|x| x as f32).unwrap_or(f32::NAN)));
        MaskedArray::from_nan_filled(values)
    }
}

/// Several named columns sharing one time axis. Timestamps are kept as text
/// until rendering so that a malformed record surfaces there.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub time: Vec<String>,
    pub columns: Vec<SeriesColumn>,
}

impl TimeSeries {
    pub fn new(time: Vec<String>) -> Self {
        Self { time, columns: Vec::new() }
    }

    pub fn add_column(&mut self, name: &str, unit: Option<String>, values: Vec<Option<f64>>) -> Result<(), AqError> {
        if values.len() != self.time.len() {
            return Err(AqError::ShapeMismatch {
                index: self.columns.len(),
                expected: vec![self.time.len()],
                got: vec![values.len()]
            });
        }
        self.columns.push(SeriesColumn { name: name.to_owned(), unit, values });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&SeriesColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Keep only the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> Result<Self, AqError> {
        let columns = names.iter()
            .map(|&n| self.column(n).cloned()
                .ok_or_else(|| AqError::Payload { source_name: "time series".to_owned(), reason: format!("no column named '{n}'") }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { time: self.time.clone(), columns })
    }

    /// Parse every timestamp, failing on the first that does not parse.
    pub fn parse_times(&self, series_name: &str) -> Result<Vec<DateTime<Utc>>, AqError> {
        self.time.iter()
            .enumerate()
            .map(|(index, s)| parse_timestamp(s).ok_or_else(|| AqError::TimeParse {
                series: series_name.to_owned(),
                index,
                value: s.clone()
            }))
            .collect()
    }
}

//! Normalizing ground-station and weather-forecast JSON payloads into
//! [`StationRecord`]s and [`TimeSeries`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::AqError;
use crate::series::TimeSeries;
use crate::utils::RunningMean;

/// One measurement from one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub location: Option<String>,
    pub parameter: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub timestamp: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Coordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResultsPayload<T> {
    results: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct LatestLocation {
    location: Option<String>,
    #[serde(default)]
    coordinates: Option<Coordinates>,
    #[serde(default)]
    measurements: Vec<LatestMeasurement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestMeasurement {
    parameter: String,
    value: Option<f64>,
    unit: Option<String>,
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryMeasurement {
    location: Option<String>,
    parameter: String,
    value: Option<f64>,
    unit: Option<String>,
    date: Option<HistoryDate>,
    #[serde(default)]
    coordinates: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
struct HistoryDate {
    utc: Option<String>,
}

fn results<T: serde::de::DeserializeOwned>(json: &str, source_name: &str) -> Result<Vec<T>, AqError> {
    let payload: ResultsPayload<T> = serde_json::from_str(json)
        .map_err(|e| AqError::Payload { source_name: source_name.to_owned(), reason: e.to_string() })?;
    payload.results
        .ok_or_else(|| AqError::Payload { source_name: source_name.to_owned(), reason: "no 'results' array".to_owned() })
}

/// Flatten a "latest values per location" payload: one record per measurement.
pub fn parse_latest(json: &str) -> Result<Vec<StationRecord>, AqError> {
    let locations: Vec<LatestLocation> = results(json, "station latest")?;
    let mut records = Vec::new();
    for loc in locations {
        let coords = loc.coordinates.unwrap_or_default();
        for m in loc.measurements {
            records.push(StationRecord {
                location: loc.location.clone(),
                parameter: m.parameter,
                value: m.value,
                unit: m.unit,
                timestamp: m.last_updated.unwrap_or_default(),
                latitude: coords.latitude,
                longitude: coords.longitude,
            });
        }
    }
    log::debug!("Parsed {} latest station records", records.len());
    Ok(records)
}

/// Flatten a historical measurements payload.
pub fn parse_history(json: &str) -> Result<Vec<StationRecord>, AqError> {
    let measurements: Vec<HistoryMeasurement> = results(json, "station history")?;
    let records = measurements.into_iter()
        .map(|m| {
            let coords = m.coordinates.unwrap_or_default();
            StationRecord {
                location: m.location,
                parameter: m.parameter,
                value: m.value,
                unit: m.unit,
                timestamp: m.date.and_then(|d| d.utc).unwrap_or_default(),
                latitude: coords.latitude,
                longitude: coords.longitude,
            }
        })
        .collect::<Vec<_>>();
    log::debug!("Parsed {} historical station records", records.len());
    Ok(records)
}

/// Keep only the records of one parameter.
pub fn select_parameter(records: Vec<StationRecord>, parameter: &str) -> Vec<StationRecord> {
    records.into_iter().filter(|r| r.parameter == parameter).collect()
}

/// One column for `parameter`, one row per distinct timestamp. When several
/// stations report at the same time their values are averaged.
pub fn records_to_series(records: &[StationRecord], parameter: &str) -> Result<TimeSeries, AqError> {
    let mut by_time: BTreeMap<&str, RunningMean<f64>> = BTreeMap::new();
    let mut unit = None;
    for r in records.iter().filter(|r| r.parameter.eq_ignore_ascii_case(parameter)) {
        let acc = by_time.entry(r.timestamp.as_str()).or_default();
        if let Some(v) = r.value.filter(|v| v.is_finite()) {
            *acc += v;
        }
        if unit.is_none() {
            unit = r.unit.clone();
        }
    }

    let time = by_time.keys().map(|t| t.to_string()).collect();
    let values = by_time.values().map(|m| m.mean()).collect();
    let mut series = TimeSeries::new(time);
    series.add_column(parameter, unit, values)?;
    Ok(series)
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    hourly: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    hourly_units: HashMap<String, String>,
}

/// Turn an hourly forecast object (`{"hourly": {"time": [...], "<var>": [...]}}`)
/// into a time series with one column per variable, sorted by name.
pub fn parse_hourly_forecast(json: &str) -> Result<TimeSeries, AqError> {
    let payload_err = |reason: String| AqError::Payload { source_name: "hourly forecast".to_owned(), reason };

    let payload: ForecastPayload = serde_json::from_str(json)
        .map_err(|e| payload_err(e.to_string()))?;
    let hourly = payload.hourly
        .ok_or_else(|| payload_err("no 'hourly' object".to_owned()))?;

    let time: Vec<String> = match hourly.get("time") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| payload_err(format!("bad 'time' array: {e}")))?,
        None => return Err(payload_err("no 'time' array in 'hourly'".to_owned()))
    };

    let mut series = TimeSeries::new(time);
    let columns: BTreeMap<&String, &serde_json::Value> = hourly.iter()
        .filter(|(k, _)| k.as_str() != "time")
        .collect();
    for (name, v) in columns {
        let values: Vec<Option<f64>> = serde_json::from_value(v.clone())
            .map_err(|e| payload_err(format!("column '{name}' is not numeric: {e}")))?;
        let unit = payload.hourly_units.get(name).cloned();
        series.add_column(name, unit, values)
            .map_err(|_| payload_err(format!("column '{name}' length differs from 'time'")))?;
    }
    Ok(series)
}

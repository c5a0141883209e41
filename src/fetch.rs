//! Blocking fetches of ground-station and forecast payloads.
//!
//! Every request carries a bounded timeout. Failures are reported once and
//! never retried.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AqError;
use crate::series::TimeSeries;
use crate::station::{self, StationRecord};

pub const STATION_BASE_URL: &str = "https://api.openaq.org/v2";
pub const FORECAST_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

pub const LATEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const HISTORY_TIMEOUT: Duration = Duration::from_secs(15);
pub const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_RADIUS_M: u32 = 10_000;
pub const DEFAULT_HOURLY_VARS: [&str; 3] = ["temperature_2m", "relative_humidity_2m", "windspeed_10m"];

pub fn station_latest_url(base: &str, lat: f64, lon: f64, radius_m: u32) -> String {
    format!("{base}/latest?coordinates={lat},{lon}&radius={radius_m}&limit=100")
}

pub fn station_history_url(base: &str, lat: f64, lon: f64, radius_m: u32, parameter: &str,
                           date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> String {
    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    format!(
        "{base}/measurements?coordinates={lat},{lon}&radius={radius_m}&parameter={parameter}&date_from={}&date_to={}&limit=10000&sort=desc",
        date_from.format(fmt), date_to.format(fmt)
    )
}

pub fn hourly_forecast_url(base: &str, lat: f64, lon: f64, hourly_vars: &[&str]) -> String {
    format!("{base}?latitude={lat}&longitude={lon}&hourly={}", hourly_vars.join(","))
}

pub struct FetchClient {
    client: reqwest::blocking::Client,
    station_base: String,
    forecast_base: String,
}

impl FetchClient {
    pub fn new() -> Result<Self, AqError> {
        Self::with_base_urls(STATION_BASE_URL, FORECAST_BASE_URL)
    }

    pub fn with_base_urls(station_base: &str, forecast_base: &str) -> Result<Self, AqError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AqError::Fetch { url: station_base.to_owned(), reason: e.to_string() })?;
        Ok(Self {
            client,
            station_base: station_base.trim_end_matches('/').to_owned(),
            forecast_base: forecast_base.to_owned(),
        })
    }

    /// GET `url` and return the body. Transport errors, timeouts and
    /// non-2xx statuses all become [`AqError::Fetch`].
    pub fn get_text(&self, url: &str, timeout: Duration) -> Result<String, AqError> {
        log::debug!("GET {url} (timeout {}s)", timeout.as_secs());
        let fetch_err = |reason: String| AqError::Fetch { url: url.to_owned(), reason };

        let resp = self.client.get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {} {}", status.as_u16(), status.canonical_reason().unwrap_or("unknown"))));
        }
        resp.text().map_err(|e| fetch_err(e.to_string()))
    }

    pub fn station_latest(&self, lat: f64, lon: f64, radius_m: u32) -> Result<Vec<StationRecord>, AqError> {
        let url = station_latest_url(&self.station_base, lat, lon, radius_m);
        let body = self.get_text(&url, LATEST_TIMEOUT)?;
        let records = station::parse_latest(&body)?;
        log::info!("Fetched {} latest station records near ({lat}, {lon})", records.len());
        Ok(records)
    }

    /// Measurements of one parameter over the last `days` days.
    pub fn station_history(&self, lat: f64, lon: f64, radius_m: u32, parameter: &str, days: i64) -> Result<Vec<StationRecord>, AqError> {
        let date_to = Utc::now();
        let date_from = date_to - chrono::Duration::days(days);
        let url = station_history_url(&self.station_base, lat, lon, radius_m, parameter, date_from, date_to);
        let body = self.get_text(&url, HISTORY_TIMEOUT)?;
        let records = station::parse_history(&body)?;
        log::info!("Fetched {} '{parameter}' measurements over {days} days", records.len());
        Ok(records)
    }

    pub fn hourly_forecast(&self, lat: f64, lon: f64, hourly_vars: &[&str]) -> Result<TimeSeries, AqError> {
        let url = hourly_forecast_url(&self.forecast_base, lat, lon, hourly_vars);
        let body = self.get_text(&url, FORECAST_TIMEOUT)?;
        station::parse_hourly_forecast(&body)
    }
}

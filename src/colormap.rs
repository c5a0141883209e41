use std::str::FromStr;

use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

use crate::error::AqError;

/// Named sequential colour maps, each defined by evenly spaced colour stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMap {
    #[default]
    Viridis,
    Inferno,
    Plasma,
    Magma,
    Greys,
}

impl ColorMap {
    fn stops(&self) -> &'static [&'static str] {
        match self {
            ColorMap::Viridis => &["#440154", "#3b528b", "#21918c", "#5ec962", "#fde725"],
            ColorMap::Inferno => &["#000004", "#57106e", "#bc3754", "#f98e09", "#fcffa4"],
            ColorMap::Plasma => &["#0d0887", "#7e03a8", "#cc4778", "#f89540", "#f0f921"],
            ColorMap::Magma => &["#000004", "#51127c", "#b73779", "#fc8961", "#fcfdbf"],
            ColorMap::Greys => &["#ffffff", "#000000"],
        }
    }

    /// Colour at fraction `t` of the way along the map; `t` is clamped to [0, 1].
    pub fn color_at(&self, t: f64) -> RGBColor {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (stops.len() - 1) as f64;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - i as f64;

        let (r0, g0, b0) = hex_to_rgb(stops[i]);
        let (r1, g1, b1) = hex_to_rgb(stops[i + 1]);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }
}

impl FromStr for ColorMap {
    type Err = AqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viridis" => Ok(Self::Viridis),
            "inferno" => Ok(Self::Inferno),
            "plasma" => Ok(Self::Plasma),
            "magma" => Ok(Self::Magma),
            "greys" | "grays" => Ok(Self::Greys),
            other => Err(AqError::Config(format!("unknown colour map '{other}'")))
        }
    }
}

/// A malformed channel reads as 0.
fn hex_to_rgb(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| hex.get(i..i + 2)
        .and_then(|c| u8::from_str_radix(c, 16).ok())
        .unwrap_or(0);
    (channel(0), channel(2), channel(4))
}

/// A colour map stretched over a value range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub map: ColorMap,
    pub vmin: f64,
    pub vmax: f64,
}

impl ColorScale {
    /// Degenerate ranges (all values equal) are widened so every value still gets a colour.
    pub fn new(map: ColorMap, vmin: f64, vmax: f64) -> Self {
        if vmax > vmin {
            Self { map, vmin, vmax }
        } else {
            let pad = (vmin.abs() * 0.05).max(0.5);
            Self { map, vmin: vmin - pad, vmax: vmin + pad }
        }
    }

    pub fn color(&self, v: f64) -> RGBColor {
        self.map.color_at((v - self.vmin) / (self.vmax - self.vmin))
    }
}

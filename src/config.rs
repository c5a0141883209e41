use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::AqError;
use crate::export::ResourceEntry;
use crate::filter::ValidityPolicy;
use crate::granule::DatasetFormat;
use crate::render::RenderSpec;

fn default_extension() -> String { "nc".to_owned() }

/// Where a dataset's granules come from. Explicit files come first, followed
/// by any matching files found in `cache_dir` (sorted by name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Directory to scan for granules, non-recursively
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// File extension (without the dot) to pick up from `cache_dir`
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl InputSpec {
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self { files, cache_dir: None, extension: default_extension() }
    }

    /// Every input file, in processing order.
    pub fn resolve(&self) -> Result<Vec<PathBuf>, AqError> {
        let mut out = self.files.clone();
        if let Some(dir) = &self.cache_dir {
            out.extend(find_files_with_ext(dir, &self.extension)?);
        }
        Ok(out)
    }
}

/// Files directly inside `dir` with extension `ext`, sorted. A missing
/// directory yields no files and a warning.
pub fn find_files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, AqError> {
    if !dir.exists() {
        log::warn!("Directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let ext = OsStr::new(ext.trim_start_matches('.'));
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let p = entry?.path();
        if p.is_file() && p.extension() == Some(ext) {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// One pipeline run: which files, how to read and filter them, and where the figure goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,

    pub format: DatasetFormat,

    /// Validity rule applied to each granule as it is loaded
    #[serde(default)]
    pub policy: ValidityPolicy,

    /// Optional validity rule applied to the averaged field
    #[serde(default)]
    pub post_policy: Option<ValidityPolicy>,

    #[serde(default)]
    pub render: RenderSpec,

    pub inputs: InputSpec,

    /// Path to write the rendered figure (SVG)
    pub output: PathBuf,

    /// Optional path to write a per-granule inventory (CSV)
    #[serde(default)]
    pub inventory: Option<PathBuf>,
}

impl DatasetConfig {
    /// Checks that need no file access. Called before any granule is opened.
    pub fn validate(&self) -> Result<(), AqError> {
        if let DatasetFormat::Gridded(layout) = &self.format {
            layout.grid.validate()?;
        }
        if self.inputs.files.is_empty() && self.inputs.cache_dir.is_none() {
            return Err(AqError::Config(format!("dataset '{}' lists no input files and no cache_dir", self.name)));
        }
        if let (Some(lo), Some(hi)) = (self.policy.lower_bound, self.policy.upper_bound) {
            if lo > hi {
                return Err(AqError::Config(format!("dataset '{}': lower_bound {lo} exceeds upper_bound {hi}", self.name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,

    /// Data sources listed by the `catalog` command
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, AqError> {
        let cfg: Self = toml::from_str(s)?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, AqError> {
        let s = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&s)?;
        log::debug!("Read {} dataset(s) from {}", cfg.datasets.len(), path.display());
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String, AqError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), AqError> {
        for ds in &self.datasets {
            ds.validate()?;
        }
        Ok(())
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig, AqError> {
        self.datasets.iter()
            .find(|d| d.name == name)
            .ok_or_else(|| AqError::Config(format!("no dataset named '{name}' in configuration")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::regrid::GridConvention;

    const CONFIG: &str = r#"
[[datasets]]
name = "tempo_no2"
output = "figures/tempo_no2.svg"
inventory = "figures/tempo_no2.csv"

[datasets.format]
kind = "swath"
value_var = "vertical_column_troposphere"

[datasets.policy]
lower_bound = 0.0

[datasets.inputs]
files = ["a.nc", "b.nc"]

[datasets.render]
title = "TEMPO NO2"
colormap = "inferno"
point_size = 2

[[datasets]]
name = "omi_no2"
output = "figures/omi.svg"

[datasets.format]
kind = "gridded"
group_path = "HDFEOS/GRIDS/ColumnAmountNO2/Data Fields"
value_var = "ColumnAmountNO2TropCloudScreened"
grid = "omi_l3_1deg"

[datasets.policy]
fill_value = -1.2676506e30

[datasets.post_policy]
lower_bound = 0.5

[datasets.inputs]
cache_dir = "cache/omi"
extension = "he5"

[[datasets]]
name = "custom"
output = "custom.svg"

[datasets.format]
kind = "gridded"
value_var = "no2"
grid = { convention = "linspace", lat_endpoints = [-89.875, 89.875], lon_endpoints = [-179.875, 179.875], lat_count = 720, lon_count = 1440 }

[datasets.inputs]
files = ["c.nc"]

[[resources]]
title = "OpenAQ"
type = "Ground station"
purpose = "Surface measurements"
access = "REST API"
"#;

    #[test]
    fn test_parse_config() {
        let cfg = PipelineConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(cfg.datasets.len(), 3);
        cfg.validate().unwrap();

        let tempo = cfg.dataset("tempo_no2").unwrap();
        match &tempo.format {
            DatasetFormat::Swath(layout) => {
                assert_eq!(layout.geolocation_group, "geolocation");
                assert_eq!(layout.value_var, "vertical_column_troposphere");
            },
            _ => panic!("expected swath format")
        }
        assert_eq!(tempo.policy, ValidityPolicy::at_least(0.0));
        assert_eq!(tempo.render.point_size, 2);
        assert_eq!(tempo.render.x_label, "Longitude");

        let omi = cfg.dataset("omi_no2").unwrap();
        match &omi.format {
            DatasetFormat::Gridded(layout) => assert_eq!(layout.grid, GridConvention::omi_l3_1deg()),
            _ => panic!("expected gridded format")
        }
        assert_eq!(omi.post_policy, Some(ValidityPolicy::at_least(0.5)));
        assert_eq!(omi.inputs.extension, "he5");

        match &cfg.dataset("custom").unwrap().format {
            DatasetFormat::Gridded(layout) => assert_eq!(layout.grid, GridConvention::quarter_degree()),
            _ => panic!("expected gridded format")
        }

        assert_eq!(cfg.resources[0].resource_type, "Ground station");
        assert_eq!(cfg.dataset("nope").unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let s = CONFIG.replace("omi_l3_1deg", "half_degree");
        assert_eq!(PipelineConfig::from_toml_str(&s).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_toml_syntax_error_is_config_error() {
        let err = PipelineConfig::from_toml_str("[[datasets]\nname = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_validate_rejects_bad_grid_and_empty_inputs() {
        let mut cfg = PipelineConfig::from_toml_str(CONFIG).unwrap();
        let mut ds = cfg.datasets.remove(1);
        ds.inputs = InputSpec::from_files(vec![]);
        assert_eq!(ds.validate().unwrap_err().kind(), ErrorKind::Config);

        ds.inputs = InputSpec::from_files(vec![PathBuf::from("x.he5")]);
        ds.format = DatasetFormat::Gridded(crate::granule::GriddedLayout {
            group_path: String::new(),
            value_var: "no2".to_owned(),
            grid: GridConvention::CellCentered { lat_bounds: (-90.0, 90.0), lon_bounds: (-180.0, 180.0), resolution: 0.7 },
        });
        assert_eq!(ds.validate().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_toml_roundtrip() {
        let cfg = PipelineConfig::from_toml_str(CONFIG).unwrap();
        let s = cfg.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&s).unwrap(), cfg);
    }

    #[test]
    fn test_resolve_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nc", "a.nc", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let spec = InputSpec {
            files: vec![PathBuf::from("first.nc")],
            cache_dir: Some(dir.path().to_owned()),
            extension: ".nc".to_owned(),
        };
        let files = spec.resolve().unwrap();
        assert_eq!(files, vec![PathBuf::from("first.nc"), dir.path().join("a.nc"), dir.path().join("b.nc")]);

        let missing = InputSpec { cache_dir: Some(dir.path().join("nope")), ..spec };
        assert_eq!(missing.resolve().unwrap(), vec![PathBuf::from("first.nc")]);
    }
}

use std::{path::PathBuf, io::Write, str::FromStr, convert::Infallible};

use chrono::{NaiveDate, Duration};
use clap::{Parser, ValueEnum};
use itertools::Itertools;
use aq_pipeline::{
    config::{find_files_with_ext, DatasetConfig, InputSpec, PipelineConfig},
    error::AqError,
    filter::ValidityPolicy,
    granule::{DatasetFormat, GriddedLayout, SwathLayout},
    regrid::GridConvention,
    render::RenderSpec,
};

fn main() -> Result<(), AqError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = MainArgs::parse();
    let format = args.dataset_format()?;
    let policy = ValidityPolicy { fill_value: None, lower_bound: args.lower_bound, upper_bound: args.upper_bound };
    let mut datasets = Vec::new();

    for (center_date, window) in DateWindowIter::new(args.start_date, args.end_date, args.ndays_buffer) {
        let mut files = Vec::new();
        for &d in window.iter() {
            let dir = args.dir_structure.dir_for_date(d);
            files.extend(find_files_with_ext(&dir, &args.extension)?);
        }
        let files = files.into_iter().unique().collect_vec();

        if files.is_empty() {
            log::warn!("Skipping {center_date}: no .{} files in the {} day window", args.extension, window.len());
            continue;
        }

        let name = center_date.format(&args.name_format).to_string();
        let output = PathBuf::from(center_date.format(&args.outfile_format).to_string());
        let render = RenderSpec {
            title: format!("{} {}", args.value_var, center_date),
            colormap: args.colormap.parse()?,
            ..Default::default()
        };

        datasets.push(DatasetConfig {
            name,
            format: format.clone(),
            policy,
            post_policy: args.post_lower_bound.map(ValidityPolicy::at_least),
            render,
            inputs: InputSpec::from_files(files),
            output,
            inventory: None,
        });
    }

    log::info!("Writing {} dataset(s) to {}", datasets.len(), args.config_file.display());
    let cfg = PipelineConfig { datasets, resources: Vec::new() };
    let cfg_str = cfg.to_toml_string()?;
    let mut f = std::fs::File::create(&args.config_file)?;
    write!(f, "{}", cfg_str)?;
    Ok(())
}


/// Yields each date from start to end (inclusive) with the dates within
/// `ndays_buffer` days either side of it.
struct DateWindowIter {
    curr_date: NaiveDate,
    end_date: NaiveDate,
    ndays_buffer: u32
}

impl DateWindowIter {
    fn new(start_date: NaiveDate, end_date: NaiveDate, ndays_buffer: u32) -> Self {
        Self { curr_date: start_date, end_date, ndays_buffer }
    }
}

impl Iterator for DateWindowIter {
    type Item = (NaiveDate, Vec<NaiveDate>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr_date > self.end_date {
            return None
        }

        let n = self.ndays_buffer as i64;
        let window = (-n..=n)
            .map(|d| self.curr_date + Duration::days(d))
            .collect_vec();

        let tup = (self.curr_date, window);
        self.curr_date += Duration::days(1);
        Some(tup)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Swath,
    Gridded,
}

/// Create a TOML file appropriate to pass to the `run` subcommand of aq-pipeline,
/// with one dataset per day.
#[derive(Debug, Parser)]
struct MainArgs {
    /// A string that gives the directory structure that granule files are found in. This can
    /// include format substrings recognized by chrono for date formatting; the most common
    /// are %Y for four-digit year, %m for two-digit month, and %d for two-digit day. For
    /// example, the string "/data/%Y/%m/%d/no2" indicates that the data are in year/month/day
    /// directories under "/data" with a "no2" subdirectory for each day directory. Every file
    /// with the chosen extension in a day's directory is used. See
    /// https://docs.rs/chrono/latest/chrono/format/strftime/index.html for the full list of
    /// chrono format specifiers.
    #[arg(value_parser = DirStructure::from_str)]
    dir_structure: DirStructure,

    /// First date to make a dataset for, in YYYY-MM-DD format. The output config file
    /// will contain one [[datasets]] section for each date between start_date and end_date
    /// (inclusive) that has at least one granule.
    start_date: NaiveDate,

    /// Last date to make a dataset for, in YYYY-MM-DD format.
    end_date: NaiveDate,

    /// Path to write the configuration file as.
    config_file: PathBuf,

    /// Name of the field to plot
    value_var: String,

    /// Whether the granules are swath (per-pixel coordinates) or gridded products
    #[arg(long, value_enum, default_value_t = Kind::Swath)]
    kind: Kind,

    /// For gridded products, the slash-separated group holding the field
    #[arg(long, default_value = "")]
    group_path: String,

    /// For gridded products, the grid preset (omi_l3_1deg or quarter_degree)
    #[arg(long, default_value = "omi_l3_1deg")]
    grid: String,

    /// Number of days on either side of each date whose granules are averaged into
    /// that date's dataset. 0 uses only that day's granules.
    #[arg(long, default_value_t = 0)]
    ndays_buffer: u32,

    /// File extension of the granules
    #[arg(long, default_value = "nc")]
    extension: String,

    /// Pattern for each dataset's name. Date formatting patterns are allowed.
    #[arg(long, default_value = "aq_%Y%m%d")]
    name_format: String,

    /// Pattern to use for the output figure files. Date formatting patterns (e.g. %Y, %m, %d)
    /// recognized by chrono can be used to insert the date in the file name.
    #[arg(long, default_value = "aq_%Y%m%d.svg")]
    outfile_format: String,

    /// Values strictly below this are treated as missing when loading
    #[arg(long, allow_hyphen_values = true)]
    lower_bound: Option<f32>,

    /// Values strictly above this are treated as missing when loading
    #[arg(long, allow_hyphen_values = true)]
    upper_bound: Option<f32>,

    /// Averaged values strictly below this are masked before plotting
    #[arg(long, allow_hyphen_values = true)]
    post_lower_bound: Option<f32>,

    #[arg(long, default_value = "viridis")]
    colormap: String,
}

impl MainArgs {
    fn dataset_format(&self) -> Result<DatasetFormat, AqError> {
        match self.kind {
            Kind::Swath => Ok(DatasetFormat::Swath(SwathLayout::tempo(&self.value_var))),
            Kind::Gridded => {
                let grid = GridConvention::preset(&self.grid)
                    .ok_or_else(|| AqError::Config(format!("unknown grid preset '{}'", self.grid)))?;
                Ok(DatasetFormat::Gridded(GriddedLayout {
                    group_path: self.group_path.clone(),
                    value_var: self.value_var.clone(),
                    grid,
                }))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct DirStructure {
    pattern: String
}

impl Default for DirStructure {
    fn default() -> Self {
        Self { pattern: "%Y/%m/%d".to_owned() }
    }
}

impl FromStr for DirStructure {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { pattern: s.to_owned() })
    }
}

impl DirStructure {
    pub fn dir_for_date(&self, date: NaiveDate) -> PathBuf {
        PathBuf::from(date.format(&self.pattern).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_windows() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let windows = DateWindowIter::new(start, end, 1).collect_vec();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].0, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(windows[1].1, vec![
            NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        ]);
    }

    #[test]
    fn test_dir_for_date() {
        let ds = DirStructure::from_str("/data/%Y/%m/%d/no2").unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(ds.dir_for_date(d), PathBuf::from("/data/2024/02/01/no2"));
        assert_eq!(DirStructure::default().dir_for_date(d), PathBuf::from("2024/02/01"));
    }
}

use std::path::{Path, PathBuf};

use aq_pipeline::config::PipelineConfig;
use aq_pipeline::error::AqError;
use aq_pipeline::export::write_table_file;
use aq_pipeline::fetch::{FetchClient, DEFAULT_HOURLY_VARS, DEFAULT_RADIUS_M};
use aq_pipeline::granule::inspect;
use aq_pipeline::pipeline::run_dataset;
use aq_pipeline::render::{render_time_series, RenderSpec};
use aq_pipeline::series::TimeSeries;
use aq_pipeline::station;
use aq_pipeline::utils::ShowProgress;
use clap::{Args, Parser, Subcommand};

fn main() -> Result<(), AqError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = MainArgs::parse();

    match args.command {
        Command::Run(a) => driver_run(a),
        Command::Inspect { file } => driver_inspect(&file),
        Command::Catalog { config_file, output_file } => driver_catalog(&config_file, &output_file),
        Command::Station(a) => {
            let json = std::fs::read_to_string(&a.payload_file)?;
            if a.history {
                let parameter = a.parameter.as_deref().unwrap_or("no2");
                let records = station::parse_history(&json)?;
                let series = station::records_to_series(&records, parameter)?;
                save_series(&series, parameter, &a.output_file, a.title)
            } else {
                let mut records = station::parse_latest(&json)?;
                if let Some(parameter) = &a.parameter {
                    records = station::select_parameter(records, parameter);
                }
                write_table_file(&a.output_file, &records)
            }
        },
        Command::Forecast(a) => {
            let json = std::fs::read_to_string(&a.payload_file)?;
            let series = select_columns(station::parse_hourly_forecast(&json)?, &a.columns)?;
            save_series(&series, "forecast", &a.output_file, a.title)
        },
        Command::FetchStation(a) => {
            let client = FetchClient::new()?;
            let records = client.station_history(a.location.latitude, a.location.longitude, a.location.radius, &a.parameter, a.days)?;
            let series = station::records_to_series(&records, &a.parameter)?;
            save_series(&series, &a.parameter, &a.output_file, a.title)
        },
        Command::FetchForecast(a) => {
            let client = FetchClient::new()?;
            let vars = a.columns.iter().map(|s| s.as_str()).collect::<Vec<_>>();
            let vars = if vars.is_empty() { DEFAULT_HOURLY_VARS.to_vec() } else { vars };
            let series = client.hourly_forecast(a.location.latitude, a.location.longitude, &vars)?;
            save_series(&series, "forecast", &a.output_file, a.title)
        },
    }
}

fn driver_run(args: RunArgs) -> Result<(), AqError> {
    let cfg = PipelineConfig::from_file(&args.config_file)?;
    cfg.validate()?;
    let progress = if args.no_progress { ShowProgress::No } else { ShowProgress::Yes };

    let datasets = match &args.dataset {
        Some(name) => vec![cfg.dataset(name)?],
        None => cfg.datasets.iter().collect()
    };
    if datasets.is_empty() {
        log::warn!("No datasets configured in {}", args.config_file.display());
    }

    for ds in datasets {
        let out = run_dataset(ds, progress)?;
        log::info!("Dataset '{}': {} granule(s), {} valid values, figure at {}",
            out.dataset, out.files.len(), out.field.n_valid(), ds.output.display());
    }
    Ok(())
}

fn driver_inspect(file: &Path) -> Result<(), AqError> {
    for var in inspect(file)? {
        let dims = var.dimensions.iter()
            .zip(var.shape.iter())
            .map(|(d, n)| format!("{d}={n}"))
            .collect::<Vec<_>>()
            .join(", ");
        if var.units.is_empty() {
            println!("{} ({dims})", var.path);
        } else {
            println!("{} ({dims}) [{}]", var.path, var.units);
        }
    }
    Ok(())
}

fn driver_catalog(config_file: &Path, output_file: &Path) -> Result<(), AqError> {
    let cfg = PipelineConfig::from_file(config_file)?;
    if cfg.resources.is_empty() {
        log::warn!("No [[resources]] entries in {}", config_file.display());
    }
    write_table_file(output_file, &cfg.resources)
}

fn select_columns(series: TimeSeries, columns: &[String]) -> Result<TimeSeries, AqError> {
    if columns.is_empty() {
        return Ok(series);
    }
    let names = columns.iter().map(|s| s.as_str()).collect::<Vec<_>>();
    series.select(&names)
}

fn save_series(series: &TimeSeries, series_name: &str, output_file: &Path, title: Option<String>) -> Result<(), AqError> {
    if series.is_empty() {
        log::warn!("Series '{series_name}' has no rows; the figure will be empty");
    }
    let spec = RenderSpec {
        title: title.unwrap_or_else(|| series_name.to_owned()),
        x_label: "Time (UTC)".to_owned(),
        y_label: String::new(),
        height: 500,
        ..Default::default()
    };
    render_time_series(series, series_name, &spec)?.save(output_file)
}

/// Load, average, regrid and render satellite air-quality products, and chart
/// ground-station and forecast time series.
#[derive(Debug, Parser)]
#[command(version)]
struct MainArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the dataset pipelines described in a TOML configuration file
    Run(RunArgs),

    /// List the groups, variables, and shapes in a granule file
    Inspect {
        /// Path to a netCDF or HDF5 granule
        file: PathBuf
    },

    /// Write the [[resources]] table of a configuration file as CSV
    Catalog {
        /// Path to the TOML configuration file
        config_file: PathBuf,

        /// Path to write the CSV file
        output_file: PathBuf,
    },

    /// Tabulate a saved ground-station latest-values payload as CSV, or chart
    /// one parameter from a historical payload
    Station(StationArgs),

    /// Chart columns from a saved hourly forecast JSON payload
    Forecast(ForecastArgs),

    /// Fetch recent ground-station measurements and chart them
    FetchStation(FetchStationArgs),

    /// Fetch an hourly forecast and chart it
    FetchForecast(FetchForecastArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the TOML configuration file
    config_file: PathBuf,

    /// Only run the dataset with this name. Default is to run all of them in order.
    #[clap(short, long)]
    dataset: Option<String>,

    /// Do not draw progress bars while loading granules
    #[clap(long)]
    no_progress: bool,
}

#[derive(Debug, Args)]
struct StationArgs {
    /// Path to the saved JSON payload
    payload_file: PathBuf,

    /// Path to write the CSV table, or the SVG chart with --history
    output_file: PathBuf,

    /// Which parameter to keep. For a latest payload the default is every
    /// parameter; with --history it is no2.
    #[clap(short, long)]
    parameter: Option<String>,

    /// Set this flag if the payload is a historical measurements response
    /// rather than a latest-values response. Only historical payloads are charted.
    #[clap(long)]
    history: bool,

    /// Chart title for --history. Default is the parameter name.
    #[clap(short, long)]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct ForecastArgs {
    /// Path to the saved JSON payload
    payload_file: PathBuf,

    /// Path to write the SVG chart
    output_file: PathBuf,

    /// Comma-separated columns to chart. Default is every column.
    #[clap(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Chart title
    #[clap(short, long)]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct LocationArgs {
    /// Latitude in degrees north
    #[clap(long, allow_hyphen_values = true)]
    latitude: f64,

    /// Longitude in degrees east
    #[clap(long, allow_hyphen_values = true)]
    longitude: f64,

    /// Search radius in meters around the location
    #[clap(long, default_value_t = DEFAULT_RADIUS_M)]
    radius: u32,
}

#[derive(Debug, Args)]
struct FetchStationArgs {
    #[command(flatten)]
    location: LocationArgs,

    /// Path to write the SVG chart
    output_file: PathBuf,

    #[clap(short, long, default_value = "no2")]
    parameter: String,

    /// Number of days of history to fetch
    #[clap(long, default_value_t = 7)]
    days: i64,

    #[clap(short, long)]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct FetchForecastArgs {
    #[command(flatten)]
    location: LocationArgs,

    /// Path to write the SVG chart
    output_file: PathBuf,

    /// Comma-separated hourly variables to fetch. Default is temperature,
    /// relative humidity and 10 m wind speed.
    #[clap(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    #[clap(short, long)]
    title: Option<String>,
}

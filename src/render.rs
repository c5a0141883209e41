//! Drawing regridded fields and time series into an owned [`Figure`].
//!
//! Every call builds its own drawing surface; nothing is shared between
//! renders. Figures are SVG documents held in memory until saved.

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Ix2};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::colormap::{ColorMap, ColorScale};
use crate::error::AqError;
use crate::masked::MaskedArray;
use crate::regrid::{RegriddedField, SwathPoints};
use crate::series::TimeSeries;

const COLORBAR_WIDTH: u32 = 130;
const COLORBAR_STEPS: usize = 64;

/// How mesh cells are placed relative to their coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shading {
    /// Coordinates are cell centres; edges fall halfway between neighbours.
    #[default]
    Nearest,
    /// Coordinates are the lower-left corners of their cells.
    Corner,
}

fn default_x_label() -> String { "Longitude".to_owned() }
fn default_y_label() -> String { "Latitude".to_owned() }
fn default_point_size() -> u32 { 1 }
fn default_width() -> u32 { 1400 }
fn default_height() -> u32 { 700 }

/// Presentation settings for one render call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_x_label")]
    pub x_label: String,
    #[serde(default = "default_y_label")]
    pub y_label: String,
    #[serde(default)]
    pub colorbar_label: String,
    #[serde(default)]
    pub colormap: ColorMap,
    /// Marker radius in pixels for scatter plots
    #[serde(default = "default_point_size")]
    pub point_size: u32,
    #[serde(default)]
    pub shading: Shading,
    /// Fixed colour range; the data range is used when absent
    #[serde(default)]
    pub value_range: Option<(f64, f64)>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_label: default_x_label(),
            y_label: default_y_label(),
            colorbar_label: String::new(),
            colormap: ColorMap::default(),
            point_size: default_point_size(),
            shading: Shading::default(),
            value_range: None,
            width: default_width(),
            height: default_height(),
        }
    }
}

impl RenderSpec {
    fn color_scale(&self, data_range: Option<(f32, f32)>) -> ColorScale {
        let (lo, hi) = self.value_range
            .or_else(|| data_range.map(|(a, b)| (a as f64, b as f64)))
            .unwrap_or((0.0, 1.0));
        ColorScale::new(self.colormap, lo, hi)
    }
}

/// A finished drawing, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    svg: String,
}

impl Figure {
    pub fn as_svg(&self) -> &str {
        &self.svg
    }

    pub fn save(&self, path: &Path) -> Result<(), AqError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.svg)?;
        log::info!("Wrote figure to {}", path.display());
        Ok(())
    }
}

fn draw_figure<F>(width: u32, height: u32, draw: F) -> Result<Figure, AqError>
where F: FnOnce(&DrawingArea<SVGBackend, Shift>) -> Result<(), AqError>
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(AqError::from_render_error)?;
        draw(&root)?;
        root.present().map_err(AqError::from_render_error)?;
    }
    Ok(Figure { width, height, svg })
}

/// Render whichever kind of field this is.
pub fn render_field(field: &RegriddedField, spec: &RenderSpec) -> Result<Figure, AqError> {
    match field {
        RegriddedField::Swath(points) => render_scatter(points, spec),
        RegriddedField::Gridded { latitude, longitude, values } => render_mesh(latitude, longitude, values, spec),
    }
}

/// The (lon, lat, value) triples a scatter plot will draw.
pub fn scatter_points(points: &SwathPoints) -> Vec<(f64, f64, f64)> {
    points.longitude.iter()
        .zip(points.latitude.iter())
        .zip(points.values.iter())
        .filter(|((x, y), v)| x.is_finite() && y.is_finite() && v.is_finite())
        .map(|((&x, &y), &v)| (x as f64, y as f64, v as f64))
        .collect()
}

fn padded_range(mut values: impl Iterator<Item = f64>, fallback: (f64, f64)) -> (f64, f64) {
    let first = match values.next() {
        Some(v) => v,
        None => return fallback
    };
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = ((hi - lo) * 0.02).max(0.5);
    (lo - pad, hi + pad)
}

/// One marker per valid point. Missing points were already dropped when the points were built.
pub fn render_scatter(points: &SwathPoints, spec: &RenderSpec) -> Result<Figure, AqError> {
    let pts = scatter_points(points);
    let scale = spec.color_scale(points.as_masked().min_max());
    let x_range = padded_range(pts.iter().map(|p| p.0), (-180.0, 180.0));
    let y_range = padded_range(pts.iter().map(|p| p.1), (-90.0, 90.0));
    log::debug!("Drawing {} scatter points", pts.len());

    draw_figure(spec.width, spec.height, |root| {
        let (plot_area, bar_area) = root.split_horizontally(spec.width.saturating_sub(COLORBAR_WIDTH));
        let mut chart = ChartBuilder::on(&plot_area)
            .caption(&spec.title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(AqError::from_render_error)?;

        chart.configure_mesh()
            .x_desc(spec.x_label.as_str())
            .y_desc(spec.y_label.as_str())
            .draw()
            .map_err(AqError::from_render_error)?;

        let radius = spec.point_size.max(1);
        chart.draw_series(
            pts.iter().map(|&(x, y, v)| Circle::new((x, y), radius, scale.color(v).filled()))
        ).map_err(AqError::from_render_error)?;

        draw_colorbar(&bar_area, &scale, &spec.colorbar_label)
    })
}

/// Edges of the cells around each coordinate in `axis`; one more edge than coordinates.
pub fn cell_edges(axis: &Array1<f64>, shading: Shading) -> Vec<f64> {
    let n = axis.len();
    match n {
        0 => Vec::new(),
        1 => match shading {
            Shading::Nearest => vec![axis[0] - 0.5, axis[0] + 0.5],
            Shading::Corner => vec![axis[0], axis[0] + 1.0],
        },
        _ => match shading {
            Shading::Nearest => {
                let mut edges = Vec::with_capacity(n + 1);
                edges.push(axis[0] - (axis[1] - axis[0]) / 2.0);
                edges.extend(axis.windows(2).into_iter().map(|w| (w[0] + w[1]) / 2.0));
                edges.push(axis[n - 1] + (axis[n - 1] - axis[n - 2]) / 2.0);
                edges
            },
            Shading::Corner => {
                let mut edges = axis.to_vec();
                edges.push(axis[n - 1] + (axis[n - 1] - axis[n - 2]));
                edges
            }
        }
    }
}

fn edge_range(edges: &[f64], fallback: (f64, f64)) -> (f64, f64) {
    match (edges.first(), edges.last()) {
        (Some(&a), Some(&b)) if a != b => (a.min(b), a.max(b)),
        _ => fallback
    }
}

/// One filled cell per valid grid value; missing cells are left blank.
pub fn render_mesh(latitude: &Array1<f64>, longitude: &Array1<f64>, values: &MaskedArray<Ix2>, spec: &RenderSpec) -> Result<Figure, AqError> {
    let shape = values.shape();
    if shape != [latitude.len(), longitude.len()] {
        return Err(AqError::ShapeMismatch {
            index: 0,
            expected: vec![latitude.len(), longitude.len()],
            got: shape.to_vec()
        });
    }

    let lat_edges = cell_edges(latitude, spec.shading);
    let lon_edges = cell_edges(longitude, spec.shading);
    let x_range = edge_range(&lon_edges, (-180.0, 180.0));
    let y_range = edge_range(&lat_edges, (-90.0, 90.0));
    let scale = spec.color_scale(values.min_max());
    log::debug!("Drawing {} of {} mesh cells", values.n_valid(), values.len());

    draw_figure(spec.width, spec.height, |root| {
        let (plot_area, bar_area) = root.split_horizontally(spec.width.saturating_sub(COLORBAR_WIDTH));
        let mut chart = ChartBuilder::on(&plot_area)
            .caption(&spec.title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(AqError::from_render_error)?;

        chart.configure_mesh()
            .disable_mesh()
            .x_desc(spec.x_label.as_str())
            .y_desc(spec.y_label.as_str())
            .draw()
            .map_err(AqError::from_render_error)?;

        let cells = values.values()
            .indexed_iter()
            .zip(values.mask().iter())
            .filter_map(|(((i, j), &v), &valid)| {
                valid.then(|| Rectangle::new(
                    [(lon_edges[j], lat_edges[i]), (lon_edges[j + 1], lat_edges[i + 1])],
                    scale.color(v as f64).filled()
                ))
            });
        chart.draw_series(cells).map_err(AqError::from_render_error)?;

        draw_colorbar(&bar_area, &scale, &spec.colorbar_label)
    })
}

fn draw_colorbar(area: &DrawingArea<SVGBackend, Shift>, scale: &ColorScale, label: &str) -> Result<(), AqError> {
    let mut bar = ChartBuilder::on(area)
        .margin_top(50)
        .margin_bottom(60)
        .margin_right(10)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..1.0, scale.vmin..scale.vmax)
        .map_err(AqError::from_render_error)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(label)
        .y_label_formatter(&|v| format!("{v:.2e}"))
        .draw()
        .map_err(AqError::from_render_error)?;

    let step = (scale.vmax - scale.vmin) / COLORBAR_STEPS as f64;
    bar.draw_series((0..COLORBAR_STEPS).map(|k| {
        let lo = scale.vmin + k as f64 * step;
        Rectangle::new([(0.0, lo), (1.0, lo + step)], scale.color(lo + step / 2.0).filled())
    })).map_err(AqError::from_render_error)?;
    Ok(())
}

/// Points of one column, sorted by time, with missing values dropped.
/// Times are seconds since `t0`.
fn column_points(times: &[DateTime<Utc>], values: &[Option<f64>], t0: DateTime<Utc>) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = times.iter()
        .zip(values.iter())
        .filter_map(|(t, v)| v.filter(|x| x.is_finite()).map(|x| ((*t - t0).num_seconds() as f64, x)))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    pts
}

/// One line per column against time. A single unparseable timestamp aborts the render.
pub fn render_time_series(series: &TimeSeries, series_name: &str, spec: &RenderSpec) -> Result<Figure, AqError> {
    let times = series.parse_times(series_name)?;
    let t0 = times.iter().min().copied().unwrap_or_default();
    let t1 = times.iter().max().copied().unwrap_or_default();
    let span = ((t1 - t0).num_seconds() as f64).max(1.0);

    let lines: Vec<(String, Vec<(f64, f64)>)> = series.columns.iter()
        .map(|c| (c.name.clone(), column_points(&times, &c.values, t0)))
        .collect();
    let y_range = padded_range(lines.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.1)), (0.0, 1.0));

    let fmt_time = move |x: &f64| (t0 + chrono::Duration::seconds(*x as i64)).format("%m-%d %H:%M").to_string();

    draw_figure(spec.width, spec.height, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(&spec.title, ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(0.0..span, y_range.0..y_range.1)
            .map_err(AqError::from_render_error)?;

        chart.configure_mesh()
            .x_desc(spec.x_label.as_str())
            .y_desc(spec.y_label.as_str())
            .x_label_formatter(&fmt_time)
            .draw()
            .map_err(AqError::from_render_error)?;

        for (idx, (name, pts)) in lines.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart.draw_series(LineSeries::new(pts.iter().copied(), color.stroke_width(2)))
                .map_err(AqError::from_render_error)?
                .label(name.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart.configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(AqError::from_render_error)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_scatter_points_skip_nonfinite() {
        let pts = SwathPoints {
            latitude: array![1.0, 2.0, 3.0],
            longitude: array![4.0, f32::NAN, 6.0],
            values: array![7.0, 8.0, 9.0],
        };
        assert_eq!(scatter_points(&pts), vec![(4.0, 1.0, 7.0), (6.0, 3.0, 9.0)]);
    }

    #[test]
    fn test_cell_edges_nearest() {
        let edges = cell_edges(&array![-89.5, -88.5, -87.5], Shading::Nearest);
        assert_eq!(edges, vec![-90.0, -89.0, -88.0, -87.0]);
    }

    #[test]
    fn test_cell_edges_corner() {
        let edges = cell_edges(&array![0.0, 0.25, 0.5], Shading::Corner);
        assert_eq!(edges, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(cell_edges(&array![3.0], Shading::Corner), vec![3.0, 4.0]);
    }

    #[test]
    fn test_render_scatter_produces_svg() {
        let pts = SwathPoints {
            latitude: array![40.0, 41.0],
            longitude: array![-75.0, -74.0],
            values: array![1.0e15, 2.0e15],
        };
        let spec = RenderSpec { title: "TEMPO HCHO".to_owned(), colorbar_label: "molec/cm^2".to_owned(), ..Default::default() };
        let fig = render_scatter(&pts, &spec).unwrap();
        assert!(fig.as_svg().contains("<svg"));
        assert!(fig.as_svg().contains("TEMPO HCHO"));
    }

    #[test]
    fn test_render_empty_scatter() {
        let fig = render_scatter(&SwathPoints::default(), &RenderSpec::default()).unwrap();
        assert!(fig.as_svg().contains("<svg"));
    }

    #[test]
    fn test_render_mesh_shape_checked() {
        let values = MaskedArray::from_nan_filled(array![[1.0, 2.0]]);
        let err = render_mesh(&array![0.5, 1.5], &array![0.5, 1.5], &values, &RenderSpec::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

        let values = MaskedArray::from_nan_filled(array![[1.0, f32::NAN], [3.0, 4.0]]);
        let fig = render_mesh(&array![0.5, 1.5], &array![0.5, 1.5], &values, &RenderSpec::default()).unwrap();
        assert!(fig.as_svg().contains("<svg"));
    }

    #[test]
    fn test_time_series_bad_timestamp() {
        let mut ts = TimeSeries::new(vec!["2024-02-01T00:00".to_owned(), "not a time".to_owned()]);
        ts.add_column("no2", None, vec![Some(1.0), Some(2.0)]).unwrap();
        let err = render_time_series(&ts, "no2", &RenderSpec::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_time_series_renders_legend() {
        let mut ts = TimeSeries::new(vec![
            "2024-02-01T02:00".to_owned(), "2024-02-01T00:00".to_owned(), "2024-02-01T01:00".to_owned()
        ]);
        ts.add_column("temperature_2m", None, vec![Some(-3.0), Some(-5.0), None]).unwrap();
        ts.add_column("windspeed_10m", None, vec![Some(12.0), Some(9.5), Some(10.0)]).unwrap();
        let fig = render_time_series(&ts, "weather", &RenderSpec::default()).unwrap();
        assert!(fig.as_svg().contains("windspeed_10m"));
    }

    #[test]
    fn test_column_points_sorted_and_filtered() {
        let times: Vec<DateTime<Utc>> = ["2024-02-01T02:00", "2024-02-01T00:00", "2024-02-01T01:00"]
            .iter()
            .map(|s| crate::series::parse_timestamp(s).unwrap())
            .collect();
        let t0 = times[1];
        let pts = column_points(&times, &[Some(3.0), Some(1.0), None], t0);
        assert_eq!(pts, vec![(0.0, 1.0), (7200.0, 3.0)]);
    }

    #[test]
    fn test_figure_save() {
        let dir = tempfile::tempdir().unwrap();
        let fig = render_scatter(&SwathPoints::default(), &RenderSpec::default()).unwrap();
        let out = dir.path().join("sub").join("fig.svg");
        fig.save(&out).unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().contains("<svg"));
    }
}

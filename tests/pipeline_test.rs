use std::path::{Path, PathBuf};

use aq_pipeline::config::{DatasetConfig, InputSpec};
use aq_pipeline::error::{AqError, ErrorKind};
use aq_pipeline::filter::ValidityPolicy;
use aq_pipeline::granule::{inspect, DatasetFormat, Granule, GriddedLayout, SwathLayout};
use aq_pipeline::pipeline::{build_field, run_dataset};
use aq_pipeline::regrid::{GridConvention, RegriddedField};
use aq_pipeline::render::RenderSpec;
use aq_pipeline::utils::ShowProgress;
use ndarray::array;
use netcdf::extent::Extents;

const FILL: f32 = -999.0;

fn write_swath(path: &Path, shape: (usize, usize), lat: &[f32], lon: &[f32], values: &[f32]) {
    write_swath_with_lon_columns(path, shape, shape.1, lat, lon, values)
}

/// Like `write_swath`, but longitude gets its own cross-track dimension of length `lon_columns`.
fn write_swath_with_lon_columns(path: &Path, shape: (usize, usize), lon_columns: usize, lat: &[f32], lon: &[f32], values: &[f32]) {
    let mut ds = netcdf::create(path).unwrap();

    {
        let mut geo = ds.add_group("geolocation").unwrap();
        geo.add_dimension("mirror_step", shape.0).unwrap();
        geo.add_dimension("xtrack", shape.1).unwrap();
        let lon_dim = if lon_columns == shape.1 {
            "xtrack"
        } else {
            geo.add_dimension("xtrack_lon", lon_columns).unwrap();
            "xtrack_lon"
        };
        {
            let mut var = geo.add_variable::<f32>("latitude", &["mirror_step", "xtrack"]).unwrap();
            var.put_values(lat, Extents::All).unwrap();
            var.add_attribute("units", "degrees_north").unwrap();
        }
        let mut var = geo.add_variable::<f32>("longitude", &["mirror_step", lon_dim]).unwrap();
        var.put_values(lon, Extents::All).unwrap();
    }

    let mut prod = ds.add_group("product").unwrap();
    prod.add_dimension("mirror_step", shape.0).unwrap();
    prod.add_dimension("xtrack", shape.1).unwrap();
    let mut var = prod.add_variable::<f32>("vertical_column_troposphere", &["mirror_step", "xtrack"]).unwrap();
    var.set_fill_value(FILL).unwrap();
    var.put_values(values, Extents::All).unwrap();
    var.add_attribute("units", "molecules/cm^2").unwrap();
}

fn write_gridded(path: &Path, group: &str, shape: (usize, usize), values: &[f32]) {
    let mut ds = netcdf::create(path).unwrap();
    let mut grp = ds.add_group(group).unwrap();
    grp.add_dimension("lat", shape.0).unwrap();
    grp.add_dimension("lon", shape.1).unwrap();
    let mut var = grp.add_variable::<f32>("no2", &["lat", "lon"]).unwrap();
    var.set_fill_value(FILL).unwrap();
    var.put_values(values, Extents::All).unwrap();
}

fn small_grid() -> GridConvention {
    GridConvention::CellCentered { lat_bounds: (0.0, 2.0), lon_bounds: (10.0, 12.0), resolution: 1.0 }
}

fn gridded_config(dir: &Path, files: Vec<PathBuf>) -> DatasetConfig {
    DatasetConfig {
        name: "no2_mean".to_owned(),
        format: DatasetFormat::Gridded(GriddedLayout {
            group_path: "Data Fields".to_owned(),
            value_var: "no2".to_owned(),
            grid: small_grid(),
        }),
        policy: ValidityPolicy::default(),
        post_policy: None,
        render: RenderSpec { title: "Mean NO2".to_owned(), width: 400, height: 300, ..Default::default() },
        inputs: InputSpec::from_files(files),
        output: dir.join("figures").join("no2_mean.svg"),
        inventory: Some(dir.join("figures").join("no2_inventory.csv")),
    }
}

/// Three 2x2 granules whose missing-aware mean is [[2, 6], [5, 5]].
fn write_three_granules(dir: &Path) -> Vec<PathBuf> {
    let grids = [
        [1.0, FILL, 2.0, 4.0],
        [3.0, 5.0, FILL, 6.0],
        [FILL, 7.0, 8.0, FILL],
    ];
    grids.iter()
        .enumerate()
        .map(|(i, g)| {
            let p = dir.join(format!("granule_{i}.nc"));
            write_gridded(&p, "Data Fields", (2, 2), g);
            p
        })
        .collect()
}

#[test]
fn test_load_swath_granule() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("tempo.nc");
    write_swath(&p, (2, 3),
        &[40.0, 40.0, 40.0, 41.0, 41.0, 41.0],
        &[-80.0, -79.0, -78.0, -80.0, -79.0, -78.0],
        &[1.0e15, FILL, -2.0e14, 3.0e15, 4.0e15, FILL]);

    let layout = SwathLayout::tempo("vertical_column_troposphere");
    let granule = Granule::load_swath(&p, &layout, &ValidityPolicy::at_least(0.0)).unwrap();
    assert_eq!(granule.shape(), &[2, 3]);
    // fill value comes from the file, negative value from the policy's lower bound
    assert_eq!(granule.values.n_valid(), 3);
    assert_eq!(granule.policy.fill_value, Some(FILL));
}

#[test]
fn test_missing_field_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("tempo.nc");
    write_swath(&p, (1, 2), &[40.0, 41.0], &[-80.0, -79.0], &[1.0, 2.0]);

    let layout = SwathLayout::tempo("nitrogen_dioxide_total");
    let err = Granule::load_swath(&p, &layout, &ValidityPolicy::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(matches!(err, AqError::NetcdfMissingVar { ref varname, .. } if varname == "nitrogen_dioxide_total"));

    let layout = SwathLayout { product_group: "support_data".to_owned(), ..SwathLayout::tempo("vertical_column_troposphere") };
    let err = Granule::load_swath(&p, &layout, &ValidityPolicy::default()).unwrap_err();
    assert!(matches!(err, AqError::NetcdfMissingGroup { .. }));
    assert!(err.to_string().contains("support_data"));
}

#[test]
fn test_longitude_shape_differs_from_field() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("tempo.nc");
    write_swath_with_lon_columns(&p, (2, 2), 3,
        &[40.0, 40.0, 41.0, 41.0],
        &[-80.0, -79.0, -78.0, -80.0, -79.0, -78.0],
        &[1.0, 2.0, 3.0, 4.0]);

    let layout = SwathLayout::tempo("vertical_column_troposphere");
    let err = Granule::load_swath(&p, &layout, &ValidityPolicy::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    match err {
        AqError::FieldShapeMismatch { file, varname, expected, got } => {
            assert_eq!(file, p);
            assert_eq!(varname, "longitude");
            assert_eq!(expected, vec![2, 2]);
            assert_eq!(got, vec![2, 3]);
        },
        e => panic!("unexpected error: {e}")
    }
}

#[test]
fn test_missing_file_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let layout = SwathLayout::tempo("vertical_column_troposphere");
    let err = Granule::load_swath(&dir.path().join("nope.nc"), &layout, &ValidityPolicy::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_inspect_lists_nested_variables() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("tempo.nc");
    write_swath(&p, (1, 2), &[40.0, 41.0], &[-80.0, -79.0], &[1.0, 2.0]);

    let vars = inspect(&p).unwrap();
    let lat = vars.iter().find(|v| v.path == "geolocation/latitude").unwrap();
    assert_eq!(lat.shape, vec![1, 2]);
    assert_eq!(lat.dimensions, vec!["mirror_step", "xtrack"]);
    assert_eq!(lat.units, "degrees_north");
    assert!(vars.iter().any(|v| v.path == "product/vertical_column_troposphere"));
}

#[test]
fn test_gridded_mean_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_three_granules(dir.path());
    let cfg = gridded_config(dir.path(), files.clone());

    let (field, inventory) = build_field(&cfg, &files, true, ShowProgress::No).unwrap();
    assert_eq!(inventory.len(), 3);
    assert_eq!(inventory[0].n_valid, 3);
    assert_eq!(inventory[0].shape, "2x2");
    assert_eq!(inventory[0].sha256.len(), 64);

    match field {
        RegriddedField::Gridded { latitude, longitude, values } => {
            assert_eq!(latitude, array![0.5, 1.5]);
            assert_eq!(longitude, array![10.5, 11.5]);
            assert_eq!(values.n_valid(), 4);
            assert_eq!(values.to_nan_filled(), array![[2.0, 6.0], [5.0, 5.0]]);
        },
        _ => panic!("expected a gridded field")
    }
}

#[test]
fn test_post_policy_masks_low_means() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_three_granules(dir.path());
    let mut cfg = gridded_config(dir.path(), files.clone());
    cfg.post_policy = Some(ValidityPolicy::at_least(5.0));

    let (field, _) = build_field(&cfg, &files, false, ShowProgress::No).unwrap();
    assert_eq!(field.n_valid(), 3);
    assert_eq!(field.value_range(), Some((5.0, 6.0)));
}

#[test]
fn test_shape_mismatch_across_granules() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.nc");
    let b = dir.path().join("b.nc");
    write_gridded(&a, "Data Fields", (2, 2), &[1.0, 2.0, 3.0, 4.0]);
    write_gridded(&b, "Data Fields", (2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let cfg = gridded_config(dir.path(), vec![a.clone(), b.clone()]);

    let err = build_field(&cfg, &[a, b], false, ShowProgress::No).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert!(matches!(err, AqError::ShapeMismatch { index: 1, .. }));
}

#[test]
fn test_declared_grid_must_match_data() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.nc");
    write_gridded(&a, "Data Fields", (2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let cfg = gridded_config(dir.path(), vec![a.clone()]);

    let err = build_field(&cfg, &[a], false, ShowProgress::No).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_run_gridded_dataset_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_three_granules(dir.path());
    let cfg = gridded_config(dir.path(), files);

    let out = run_dataset(&cfg, ShowProgress::No).unwrap();
    assert_eq!(out.files.len(), 3);
    assert!(out.figure.as_svg().contains("Mean NO2"));

    let svg = std::fs::read_to_string(&cfg.output).unwrap();
    assert!(svg.contains("<svg"));
    let csv = std::fs::read_to_string(cfg.inventory.as_ref().unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("path,sha256,shape,n_valid,min,max,mean"));
}

#[test]
fn test_failed_inventory_write_leaves_no_figure() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_three_granules(dir.path());
    let mut cfg = gridded_config(dir.path(), files);
    let inv_dir = dir.path().join("inventory_is_a_dir");
    std::fs::create_dir(&inv_dir).unwrap();
    cfg.inventory = Some(inv_dir.clone());

    let err = run_dataset(&cfg, ShowProgress::No).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!cfg.output.exists());
    assert!(inv_dir.is_dir());
}

#[test]
fn test_run_swath_mosaic_from_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    std::fs::create_dir(&cache).unwrap();
    write_swath(&cache.join("g1.nc"), (1, 3), &[40.0, 40.5, 41.0], &[-80.0, -79.5, -79.0], &[1.0, FILL, 3.0]);
    write_swath(&cache.join("g2.nc"), (2, 2), &[42.0, 42.0, 43.0, 43.0], &[-78.0, -77.0, -78.0, -77.0], &[4.0, 5.0, 6.0, FILL]);
    std::fs::write(cache.join("README.txt"), b"not a granule").unwrap();

    let cfg = DatasetConfig {
        name: "tempo".to_owned(),
        format: DatasetFormat::Swath(SwathLayout::tempo("vertical_column_troposphere")),
        policy: ValidityPolicy::default(),
        post_policy: None,
        render: RenderSpec { title: "TEMPO NO2".to_owned(), point_size: 3, width: 400, height: 300, ..Default::default() },
        inputs: InputSpec { files: vec![], cache_dir: Some(cache), extension: "nc".to_owned() },
        output: dir.path().join("tempo.svg"),
        inventory: None,
    };

    let out = run_dataset(&cfg, ShowProgress::No).unwrap();
    assert_eq!(out.files.len(), 2);
    assert!(out.inventory.is_empty());
    match &out.field {
        RegriddedField::Swath(points) => {
            assert_eq!(points.len(), 5);
            let mut vals = points.values.to_vec();
            vals.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(vals, vec![1.0, 3.0, 4.0, 5.0, 6.0]);
        },
        _ => panic!("expected a swath field")
    }
    assert!(cfg.output.exists());
}

#[test]
fn test_empty_inputs_rejected_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = gridded_config(dir.path(), vec![]);
    let err = run_dataset(&cfg, ShowProgress::No).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!cfg.output.exists());
}

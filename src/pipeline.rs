//! One dataset from granule files to a saved figure:
//! load and filter each granule, combine them, attach coordinates, render.
//!
//! Granules are processed one at a time and dropped once they have been
//! folded into the running result, so only one file's arrays are held in
//! memory besides the accumulator.

use std::path::PathBuf;

use ndarray::Ix2;

use crate::aggregate::GridMean;
use crate::config::DatasetConfig;
use crate::error::AqError;
use crate::export::{encode_table, save_encoded_table, GranuleInventoryRow};
use crate::filter::ValidityPolicy;
use crate::granule::{Coordinates, DatasetFormat, Granule};
use crate::regrid::{GridConvention, RegriddedField, SwathPoints};
use crate::render::{render_field, Figure};
use crate::utils::ShowProgress;

/// Everything a run produced. The figure has already been written to the
/// configured output path when this is returned.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: String,
    pub files: Vec<PathBuf>,
    pub field: RegriddedField,
    pub figure: Figure,
    pub inventory: Vec<GranuleInventoryRow>,
}

/// Running combination of granules of one format.
enum Combiner {
    Mosaic(SwathPoints),
    Mean { acc: Option<GridMean<Ix2>>, grid: GridConvention },
}

impl Combiner {
    fn for_format(format: &DatasetFormat) -> Self {
        match format {
            DatasetFormat::Swath(_) => Self::Mosaic(SwathPoints::default()),
            DatasetFormat::Gridded(layout) => Self::Mean { acc: None, grid: layout.grid.clone() },
        }
    }

    fn add(&mut self, granule: &Granule) -> Result<(), AqError> {
        match (self, &granule.coordinates) {
            (Self::Mosaic(points), Coordinates::Swath { latitude, longitude }) => {
                let new_points = SwathPoints::from_pixels(&granule.source, latitude, longitude, &granule.values)?;
                *points = std::mem::take(points).extend(new_points);
                Ok(())
            },
            (Self::Mean { acc, .. }, Coordinates::Gridded(_)) => {
                let values = granule.values_2d()?;
                acc.get_or_insert_with(|| GridMean::new(values.raw_dim()))
                    .add(&values)
            },
            _ => Err(AqError::InternalError(format!(
                "granule {} does not match the dataset format", granule.source.display()
            )))
        }
    }

    fn finish(self, post_policy: Option<&ValidityPolicy>) -> Result<RegriddedField, AqError> {
        match self {
            Self::Mosaic(points) => {
                let points = match post_policy {
                    Some(p) => points.retain(|v| p.is_valid(v)),
                    None => points
                };
                Ok(RegriddedField::Swath(points))
            },
            Self::Mean { acc, grid } => {
                let acc = acc.ok_or_else(|| AqError::Config("cannot aggregate an empty list of granules".to_owned()))?;
                let mut mean = acc.finish()?;
                if let Some(p) = post_policy {
                    mean = p.refine(mean);
                }
                RegriddedField::gridded(mean, &grid)
            }
        }
    }
}

/// Load, combine and regrid every input of `cfg` without rendering.
/// Inventory rows are collected only when `with_inventory` is set, since each
/// one needs a full read of the file for its checksum.
pub fn build_field(cfg: &DatasetConfig, files: &[PathBuf], with_inventory: bool, progress: ShowProgress)
-> Result<(RegriddedField, Vec<GranuleInventoryRow>), AqError> {
    if files.is_empty() {
        return Err(AqError::Config(format!("dataset '{}' resolved to no input files", cfg.name)));
    }

    let mut combiner = Combiner::for_format(&cfg.format);
    let mut inventory = Vec::new();
    let pb = progress.bar(files.len() as u64, &cfg.name);
    for file in files {
        let granule = Granule::load(file, &cfg.format, &cfg.policy)?;
        if with_inventory {
            inventory.push(GranuleInventoryRow::from_granule(&granule)?);
        }
        combiner.add(&granule)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let field = combiner.finish(cfg.post_policy.as_ref())?;
    log::debug!("Dataset '{}' has {} valid values after combining {} granule(s)", cfg.name, field.n_valid(), files.len());
    Ok((field, inventory))
}

/// Run one dataset end to end: validate, build the field, render and save
/// the figure, and write the inventory if one was requested. On error neither
/// output is left on disk.
pub fn run_dataset(cfg: &DatasetConfig, progress: ShowProgress) -> Result<PipelineOutput, AqError> {
    cfg.validate()?;
    let files = cfg.inputs.resolve()?;
    log::info!("Running dataset '{}' over {} granule(s)", cfg.name, files.len());

    let (field, inventory) = build_field(cfg, &files, cfg.inventory.is_some(), progress)?;
    if field.n_valid() == 0 {
        log::warn!("Dataset '{}' has no valid values; the figure will be empty", cfg.name);
    }

    let figure = render_field(&field, &cfg.render)?;
    let inventory_csv = match &cfg.inventory {
        Some(inv_path) => Some((inv_path, encode_table(&inventory)?)),
        None => None
    };

    figure.save(&cfg.output)?;
    if let Some((inv_path, table)) = inventory_csv {
        if let Err(e) = save_encoded_table(inv_path, &table) {
            // the figure and inventory are written together or not at all
            if let Err(rm_err) = std::fs::remove_file(&cfg.output) {
                log::warn!("Could not remove {} after a failed inventory write: {rm_err}", cfg.output.display());
            }
            return Err(e);
        }
        log::info!("Wrote {} inventory rows to {}", inventory.len(), inv_path.display());
    }

    Ok(PipelineOutput { dataset: cfg.name.clone(), files, field, figure, inventory })
}

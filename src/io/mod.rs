//! Data providers and sinks backed by GDAL

pub mod dem;
pub mod export;
pub mod metadata;
pub mod roi;
pub mod scene;

use crate::core::roi::RegionOfInterest;
use crate::types::{GeoTransform, Grid, Raster, RasterStack, Scene, SnowError, SnowResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;

pub use dem::GdalDemSource;
pub use export::ReportWriter;
pub use metadata::{LandsatMetadata, ProductId};
pub use roi::GdalRoiSource;
pub use scene::{GdalSceneDirectory, SceneFilter};

/// Source of time-stamped scenes on one grid
pub trait ImagerySource {
    fn scenes(&self) -> SnowResult<Vec<Scene>>;

    fn stack(&self) -> SnowResult<RasterStack> {
        RasterStack::from_scenes(self.scenes()?)
    }
}

/// Source of elevation on a requested grid
pub trait ElevationSource {
    fn elevation(&self, grid: &Grid) -> SnowResult<Raster>;
}

/// Source of the glacier outline
pub trait RoiSource {
    fn region(&self) -> SnowResult<RegionOfInterest>;
}

impl ImagerySource for RasterStack {
    fn scenes(&self) -> SnowResult<Vec<Scene>> {
        Ok(self.scenes().to_vec())
    }

    fn stack(&self) -> SnowResult<RasterStack> {
        Ok(self.clone())
    }
}

impl RoiSource for RegionOfInterest {
    fn region(&self) -> SnowResult<RegionOfInterest> {
        Ok(self.clone())
    }
}

/// Read band 1 of a raster file as f32 with its grid; no-data pixels are invalid
pub fn read_raster<P: AsRef<Path>>(path: P) -> SnowResult<Raster> {
    let path = path.as_ref();
    log::debug!("Reading raster {}", path.display());

    let dataset = open(path)?;
    let grid = dataset_grid(&dataset)?;
    let band = dataset.rasterband(1)?;
    let no_data = band.no_data_value();
    let buffer = band.read_as::<f32>((0, 0), (grid.cols, grid.rows), (grid.cols, grid.rows), None)?;

    let data = Array2::from_shape_vec(grid.shape(), buffer.data)
        .map_err(|e| SnowError::InvalidInput(format!("Failed to reshape {}: {}", path.display(), e)))?;
    let valid = data.mapv(|v| no_data.map_or(true, |nd| v as f64 != nd));

    Raster::new(data, valid, grid)
}

/// Read band 1 of an integer raster (QA bands) with its grid
pub fn read_band_u16<P: AsRef<Path>>(path: P) -> SnowResult<(Array2<u16>, Grid)> {
    let path = path.as_ref();
    let dataset = open(path)?;
    let grid = dataset_grid(&dataset)?;
    let buffer = dataset
        .rasterband(1)?
        .read_as::<u16>((0, 0), (grid.cols, grid.rows), (grid.cols, grid.rows), None)?;

    let data = Array2::from_shape_vec(grid.shape(), buffer.data)
        .map_err(|e| SnowError::InvalidInput(format!("Failed to reshape {}: {}", path.display(), e)))?;
    Ok((data, grid))
}

fn open(path: &Path) -> SnowResult<Dataset> {
    Dataset::open(path).map_err(|e| SnowError::UnreachableSource {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn dataset_grid(dataset: &Dataset) -> SnowResult<Grid> {
    let (width, height) = dataset.raster_size();
    let transform = dataset.geo_transform()?;
    Ok(Grid::new(height, width, GeoTransform::from_gdal(transform), dataset.projection()))
}

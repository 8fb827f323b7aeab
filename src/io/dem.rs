use crate::io::{read_raster, ElevationSource};
use crate::maybe_rayon::*;
use crate::types::{Grid, Raster, SnowError, SnowResult};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Digital elevation model read from a GDAL raster
///
/// The DEM must share the imagery CRS; it is bilinearly resampled onto the
/// requested grid.
#[derive(Debug, Clone)]
pub struct GdalDemSource {
    path: PathBuf,
}

impl GdalDemSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ElevationSource for GdalDemSource {
    fn elevation(&self, grid: &Grid) -> SnowResult<Raster> {
        log::info!("Reading DEM from: {}", self.path.display());
        let dem = read_raster(&self.path)?;
        log::debug!("DEM size: {}x{}", dem.grid().cols, dem.grid().rows);
        dem.elevation(grid)
    }
}

/// An in-memory DEM serves elevation by resampling itself
impl ElevationSource for Raster {
    fn elevation(&self, grid: &Grid) -> SnowResult<Raster> {
        if self.grid().is_aligned_with(grid) {
            return Ok(self.clone());
        }
        resample_bilinear(self, grid)
    }
}

/// Resample DEM to target grid using bilinear interpolation
///
/// Target pixel centres outside the DEM, or whose four neighbours include an
/// invalid cell, are invalid. A DEM in another projection is refused, it is
/// never reprojected.
pub fn resample_bilinear(dem: &Raster, target: &Grid) -> SnowResult<Raster> {
    if !dem.grid().same_crs(target) {
        return Err(SnowError::GridMismatch {
            what: "DEM projection".to_string(),
            expected: target.projection.clone(),
            found: dem.grid().projection.clone(),
        });
    }
    log::debug!("Resampling DEM to target grid {:?}", target.shape());

    let (source_height, source_width) = dem.dim();
    let source = dem.grid().transform;
    let (rows, cols) = target.shape();
    let data = dem.data();
    let valid = dem.valid();

    let resampled: Vec<Vec<f32>> = (0..rows)
        .into_par_iter()
        .map(|i| {
            (0..cols)
                .map(|j| {
                    let (x, y) = target.transform.pixel_center(i, j);
                    let (row, col) = source.to_pixel(x, y);
                    // Shift to cell-centre indices
                    let (row, col) = (row - 0.5, col - 0.5);

                    if !(row >= 0.0 && col >= 0.0) || row > (source_height - 1) as f64 || col > (source_width - 1) as f64 {
                        return f32::NAN;
                    }

                    let y1 = row.floor() as usize;
                    let x1 = col.floor() as usize;
                    let y2 = (y1 + 1).min(source_height - 1);
                    let x2 = (x1 + 1).min(source_width - 1);
                    if !(valid[[y1, x1]] && valid[[y1, x2]] && valid[[y2, x1]] && valid[[y2, x2]]) {
                        return f32::NAN;
                    }

                    let dx = col - x1 as f64;
                    let dy = row - y1 as f64;

                    let v11 = data[[y1, x1]] as f64;
                    let v12 = data[[y2, x1]] as f64;
                    let v21 = data[[y1, x2]] as f64;
                    let v22 = data[[y2, x2]] as f64;

                    (v11 * (1.0 - dx) * (1.0 - dy) + v21 * dx * (1.0 - dy) + v12 * (1.0 - dx) * dy + v22 * dx * dy)
                        as f32
                })
                .collect()
        })
        .collect();

    let out = Array2::from_shape_fn((rows, cols), |(i, j)| resampled[i][j]);
    let raster = Raster::from_data(out, target.clone())?;

    let missing = raster.grid().len() - raster.valid_count();
    if missing > 0 {
        log::warn!("{} target pixels have no DEM coverage", missing);
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;

    fn ramp_dem() -> Raster {
        // 30 m DEM, elevation = x coordinate of the pixel centre
        let transform = GeoTransform::from_gdal([0.0, 30.0, 0.0, 300.0, 0.0, -30.0]);
        let grid = Grid::new(10, 10, transform, "");
        Raster::from_data(Array2::from_shape_fn((10, 10), |(_, j)| (j as f32 + 0.5) * 30.0), grid).unwrap()
    }

    #[test]
    fn test_aligned_grid_returns_copy() {
        let dem = ramp_dem();
        let out = dem.elevation(dem.grid()).unwrap();
        assert_eq!(out, dem);
    }

    #[test]
    fn test_dem_in_other_projection_refused() {
        let dem = ramp_dem();
        let mut dem_grid = dem.grid().clone();
        dem_grid.projection = "EPSG:3413".to_string();
        let dem = Raster::from_data(dem.data().clone(), dem_grid).unwrap();

        let mut target = dem.grid().clone();
        target.projection = "EPSG:32633".to_string();

        let result = dem.elevation(&target);
        assert!(matches!(result, Err(SnowError::GridMismatch { .. })));

        // Unknown projection on one side is accepted
        target.projection.clear();
        assert!(dem.elevation(&target).is_ok());
    }

    #[test]
    fn test_bilinear_on_finer_grid() {
        let dem = ramp_dem();
        let target = Grid::new(
            10,
            10,
            GeoTransform::from_gdal([60.0, 10.0, 0.0, 240.0, 0.0, -10.0]),
            "",
        );

        let out = dem.elevation(&target).unwrap();
        for j in 0..10 {
            let expected = 60.0 + (j as f32 + 0.5) * 10.0;
            assert!((out.get(5, j).unwrap() - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_outside_dem_is_invalid() {
        let dem = ramp_dem();
        let target = Grid::new(
            2,
            2,
            GeoTransform::from_gdal([-1000.0, 30.0, 0.0, 300.0, 0.0, -30.0]),
            "",
        );
        assert_eq!(resample_bilinear(&dem, &target).unwrap().valid_count(), 0);
    }
}

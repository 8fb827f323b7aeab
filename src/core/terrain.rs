use crate::maybe_rayon::*;
use crate::types::{Grid, Raster, SnowError, SnowResult};
use ndarray::Array2;
use std::f64::consts::PI;

/// Parameters for slope/aspect computation
#[derive(Debug, Clone, Default)]
pub struct TerrainParams {
    /// DEM pixel spacing in meters (x, y); taken from the DEM geotransform when None
    pub pixel_spacing: Option<(f64, f64)>,
}

/// Slope and aspect rasters on the DEM grid, both in radians
#[derive(Debug, Clone)]
pub struct TerrainRasters {
    pub slope: Raster,
    pub aspect: Raster,
}

impl TerrainRasters {
    pub fn grid(&self) -> &Grid {
        self.slope.grid()
    }
}

/// Terrain derivatives from an elevation raster
#[derive(Debug, Clone, Default)]
pub struct TerrainModel {
    params: TerrainParams,
}

impl TerrainModel {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(TerrainParams::default())
    }

    /// Slope in radians
    pub fn slope(&self, dem: &Raster) -> SnowResult<Raster> {
        Ok(self.slope_aspect(dem)?.slope)
    }

    /// Aspect in radians
    pub fn aspect(&self, dem: &Raster) -> SnowResult<Raster> {
        Ok(self.slope_aspect(dem)?.aspect)
    }

    /// Compute slope and aspect from DEM
    ///
    /// Gradients use central differences over the four direct neighbours.
    /// Slope is 0-90 degrees and aspect is the downslope bearing, 0-360 degrees
    /// clockwise from north; both are then converted with `deg / 180 * PI`.
    pub fn slope_aspect(&self, dem: &Raster) -> SnowResult<TerrainRasters> {
        let (rows, cols) = dem.dim();
        if rows < 3 || cols < 3 {
            return Err(SnowError::InvalidInput(format!(
                "DEM of {}x{} pixels is too small for slope computation",
                rows, cols
            )));
        }

        let (dx, dy) = self
            .params
            .pixel_spacing
            .unwrap_or_else(|| dem.grid().transform.pixel_spacing());
        if !(dx > 0.0 && dy > 0.0) {
            return Err(SnowError::InvalidInput(format!(
                "Invalid DEM pixel spacing ({}, {})",
                dx, dy
            )));
        }

        log::debug!("Computing slope and aspect from {}x{} DEM, spacing ({}, {})", rows, cols, dx, dy);

        let elevation = dem.data();
        let valid = dem.valid();

        let interior: Vec<Vec<Option<(f32, f32)>>> = (1..rows - 1)
            .into_par_iter()
            .map(|i| {
                (1..cols - 1)
                    .map(|j| {
                        let stencil = [(i, j), (i, j - 1), (i, j + 1), (i - 1, j), (i + 1, j)];
                        if stencil.iter().any(|&(r, c)| !valid[[r, c]]) {
                            return None;
                        }

                        let dz_dx = (elevation[[i, j + 1]] - elevation[[i, j - 1]]) as f64 / (2.0 * dx);
                        // Rows increase southward on a north-up grid
                        let dz_dy = (elevation[[i + 1, j]] - elevation[[i - 1, j]]) as f64 / (2.0 * dy);

                        let slope_deg = dz_dx.hypot(dz_dy).atan().to_degrees();
                        let mut aspect_deg = (-dz_dx).atan2(dz_dy).to_degrees();
                        if aspect_deg < 0.0 {
                            aspect_deg += 360.0;
                        }

                        Some((
                            (slope_deg / 180.0 * PI) as f32,
                            (aspect_deg / 180.0 * PI) as f32,
                        ))
                    })
                    .collect()
            })
            .collect();

        let mut slope = Array2::from_elem((rows, cols), f32::NAN);
        let mut aspect = Array2::from_elem((rows, cols), f32::NAN);
        let mut ok = Array2::from_elem((rows, cols), false);

        for (row_offset, row) in interior.iter().enumerate() {
            for (col_offset, value) in row.iter().enumerate() {
                if let Some((s, a)) = value {
                    let idx = [row_offset + 1, col_offset + 1];
                    slope[idx] = *s;
                    aspect[idx] = *a;
                    ok[idx] = true;
                }
            }
        }

        Self::fill_edges(&mut slope);
        Self::fill_edges(&mut aspect);
        Self::fill_edges(&mut ok);

        let grid = dem.grid().clone();
        Ok(TerrainRasters {
            slope: Raster::new(slope, ok.clone(), grid.clone())?,
            aspect: Raster::new(aspect, ok, grid)?,
        })
    }

    /// Helper function to fill edge pixels from the nearest interior pixel
    fn fill_edges<T: Copy>(array: &mut Array2<T>) {
        let (rows, cols) = array.dim();

        // Fill top and bottom edges
        for j in 0..cols {
            array[[0, j]] = array[[1, j]];
            array[[rows - 1, j]] = array[[rows - 2, j]];
        }

        // Fill left and right edges
        for i in 0..rows {
            array[[i, 0]] = array[[i, 1]];
            array[[i, cols - 1]] = array[[i, cols - 2]];
        }
    }
}

use crate::maybe_rayon::*;
use crate::types::{Raster, RasterStack, SnowResult};

/// Linear DN to surface reflectance conversion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiometricParams {
    /// Multiplicative factor applied to digital numbers
    pub scale: f64,
    /// Additive offset applied after scaling
    pub offset: f64,
}

impl Default for RadiometricParams {
    fn default() -> Self {
        // Landsat Collection 2 Level-2 surface reflectance
        Self {
            scale: 0.0000275,
            offset: -0.2,
        }
    }
}

/// Radiometric calibration processor
#[derive(Debug, Clone, Default)]
pub struct RadiometricCorrector {
    params: RadiometricParams,
}

impl RadiometricCorrector {
    /// Create a new calibration processor
    pub fn new(params: RadiometricParams) -> Self {
        Self { params }
    }

    /// Create a processor for Landsat Collection 2 Level-2 products
    pub fn landsat_c2() -> Self {
        Self::new(RadiometricParams::default())
    }

    pub fn params(&self) -> &RadiometricParams {
        &self.params
    }

    /// Convert digital numbers to reflectance: `dn * scale + offset`
    pub fn correct(&self, raster: &Raster) -> Raster {
        let RadiometricParams { scale, offset } = self.params;
        raster.map_valid(move |dn| (dn as f64 * scale + offset) as f32)
    }

    /// Parallel calibration using Rayon (if available)
    #[cfg(feature = "parallel")]
    pub fn correct_parallel(&self, raster: &Raster) -> Raster {
        let RadiometricParams { scale, offset } = self.params;
        raster.par_map_valid(move |dn| (dn as f64 * scale + offset) as f32)
    }

    /// Inverse conversion: `(reflectance - offset) / scale`
    pub fn invert(&self, raster: &Raster) -> Raster {
        let RadiometricParams { scale, offset } = self.params;
        raster.map_valid(move |r| ((r as f64 - offset) / scale) as f32)
    }

    /// Calibrate every scene of a stack, scenes in parallel
    pub fn correct_stack(&self, stack: &RasterStack) -> SnowResult<RasterStack> {
        log::info!(
            "Applying radiometric calibration to {} scenes (scale {:e}, offset {})",
            stack.len(),
            self.params.scale,
            self.params.offset
        );

        let scenes = stack
            .scenes()
            .par_iter()
            .map(|scene| scene.with_raster(self.correct(&scene.raster)))
            .collect();

        RasterStack::new(stack.grid().clone(), scenes)
    }
}

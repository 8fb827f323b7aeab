use crate::core::roi::RoiMask;
use crate::types::{GeoTransform, Raster, SnowResult};
use ndarray::Zip;
use serde::Serialize;

/// Snow pixel count against the ROI size
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AarSample {
    pub snow_pixels: usize,
    pub roi_pixels: usize,
}

impl AarSample {
    /// Accumulation-area ratio; None for an empty ROI
    pub fn ratio(&self) -> Option<f64> {
        if self.roi_pixels == 0 {
            None
        } else {
            Some(self.snow_pixels as f64 / self.roi_pixels as f64)
        }
    }
}

/// Counts mask pixels inside the region of interest
#[derive(Debug, Clone, Default)]
pub struct AreaAggregator;

impl AreaAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Number of valid mask pixels inside the ROI
    pub fn count(&self, mask: &Raster, roi: &RoiMask) -> SnowResult<usize> {
        mask.grid().ensure_aligned(roi.grid(), "ROI mask")?;

        if roi.is_empty() {
            log::warn!("Region of interest covers no pixels of the imagery grid");
            return Ok(0);
        }

        let count = Zip::from(mask.valid())
            .and(roi.mask())
            .fold(0usize, |acc, &valid, &inside| acc + (valid && inside) as usize);
        Ok(count)
    }

    pub fn sample(&self, mask: &Raster, roi: &RoiMask) -> SnowResult<AarSample> {
        Ok(AarSample {
            snow_pixels: self.count(mask, roi)?,
            roi_pixels: roi.pixel_count(),
        })
    }

    /// Pixel count converted to squared CRS units
    pub fn area(count: usize, transform: &GeoTransform) -> f64 {
        count as f64 * transform.pixel_area()
    }
}

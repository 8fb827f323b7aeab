use crate::core::histogram::{Histogram, HistogramParams};
use crate::core::otsu::OtsuThresholder;
use crate::core::roi::RoiMask;
use crate::types::{Raster, SnowError, SnowResult};

/// Snow classification parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SnowMapParams {
    pub histogram: HistogramParams,
    /// Samples at or above this value are never snow (saturated or cloud residue)
    pub upper_bound: f64,
}

impl Default for SnowMapParams {
    fn default() -> Self {
        Self {
            histogram: HistogramParams::default(),
            upper_bound: 1.0,
        }
    }
}

/// Binary snow mask with the threshold that produced it
#[derive(Debug, Clone)]
pub struct SnowMap {
    /// Valid pixels hold 1.0 and are snow; everything else is invalid
    pub mask: Raster,
    pub threshold: f64,
    pub histogram: Histogram,
}

#[derive(Debug, Clone)]
pub enum SnowMapOutcome {
    Mapped(SnowMap),
    Unmapped { reason: String },
}

impl SnowMapOutcome {
    pub fn threshold(&self) -> Option<f64> {
        match self {
            SnowMapOutcome::Mapped(map) => Some(map.threshold),
            SnowMapOutcome::Unmapped { .. } => None,
        }
    }

    pub fn into_map(self) -> Option<SnowMap> {
        match self {
            SnowMapOutcome::Mapped(map) => Some(map),
            SnowMapOutcome::Unmapped { .. } => None,
        }
    }
}

/// Otsu-based snow/ice classifier
#[derive(Debug, Clone, Default)]
pub struct SnowMapper {
    params: SnowMapParams,
    otsu: OtsuThresholder,
}

impl SnowMapper {
    pub fn new(params: SnowMapParams) -> Self {
        Self {
            params,
            otsu: OtsuThresholder::new(),
        }
    }

    pub fn standard() -> Self {
        Self::new(SnowMapParams::default())
    }

    pub fn params(&self) -> &SnowMapParams {
        &self.params
    }

    /// Threshold the image over the ROI and build the snow mask
    ///
    /// A degenerate histogram gives `Unmapped` instead of an error. The mask
    /// is not clipped to the ROI.
    pub fn map(&self, raster: &Raster, roi: &RoiMask) -> SnowResult<SnowMapOutcome> {
        raster.grid().ensure_aligned(roi.grid(), "ROI mask")?;

        let histogram = Histogram::from_raster(raster, Some(roi.mask()), &self.params.histogram)?;
        let threshold = match self.otsu.threshold(&histogram) {
            Ok(t) => t,
            Err(SnowError::DegenerateHistogram { reason }) => {
                log::warn!("Snow mapping skipped: {}", reason);
                return Ok(SnowMapOutcome::Unmapped { reason });
            }
            Err(e) => return Err(e),
        };

        log::debug!(
            "Otsu threshold {:.4} from {} ROI samples in [{:.4}, {:.4}]",
            threshold,
            histogram.total(),
            histogram.min,
            histogram.max
        );

        Ok(SnowMapOutcome::Mapped(SnowMap {
            mask: self.mask_with_threshold(raster, threshold),
            threshold,
            histogram,
        }))
    }

    /// Snow where `threshold < v < upper_bound`
    pub fn mask_with_threshold(&self, raster: &Raster, threshold: f64) -> Raster {
        let upper = self.params.upper_bound;
        // NaN results drop out as invalid
        raster.map_valid(move |v| {
            let v = v as f64;
            if v > threshold && v < upper {
                1.0
            } else {
                f32::NAN
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_bimodal_image() {
        let data = Array2::from_shape_fn((10, 10), |(r, _)| if r < 6 { 0.85 } else { 0.15 });
        let raster = Raster::from_array(data);
        let roi = RoiMask::full(raster.grid());

        let map = SnowMapper::standard().map(&raster, &roi).unwrap().into_map().unwrap();
        assert!(map.threshold > 0.15 && map.threshold < 0.85);
        assert_eq!(map.mask.valid_count(), 60);
        assert_eq!(map.mask.get(0, 0), Some(1.0));
        assert_eq!(map.mask.get(9, 9), None);
    }

    #[test]
    fn test_uniform_image_is_unmapped() {
        let raster = Raster::from_array(Array2::from_elem((4, 4), 0.5_f32));
        let roi = RoiMask::full(raster.grid());

        match SnowMapper::standard().map(&raster, &roi).unwrap() {
            SnowMapOutcome::Unmapped { reason } => assert!(!reason.is_empty()),
            SnowMapOutcome::Mapped(_) => panic!("uniform image must not be thresholded"),
        }
    }

    #[test]
    fn test_upper_bound_excludes_saturated() {
        let raster = Raster::from_array(array![[0.2_f32, 0.9, 1.0, 1.4]]);
        let mask = SnowMapper::standard().mask_with_threshold(&raster, 0.5);
        assert_eq!(mask.get(0, 1), Some(1.0));
        assert_eq!(mask.get(0, 2), None);
        assert_eq!(mask.get(0, 3), None);
        assert_eq!(mask.valid_count(), 1);
    }

    #[test]
    fn test_mask_not_clipped_to_roi() {
        let raster = Raster::from_array(array![[0.1_f32, 0.1, 0.8, 0.8], [0.1, 0.1, 0.8, 0.8]]);
        let roi = RoiMask::new(array![[true, true, true, false], [true, true, true, false]], raster.grid().clone())
            .unwrap();

        let map = SnowMapper::standard().map(&raster, &roi).unwrap().into_map().unwrap();
        assert_eq!(map.mask.get(0, 3), Some(1.0));
        assert_eq!(map.histogram.total(), 6);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let raster = Raster::from_array(Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f32 / 64.0));
        let mapper = SnowMapper::standard();

        let mut previous = usize::MAX;
        for step in 0..=10 {
            let count = mapper.mask_with_threshold(&raster, step as f64 / 10.0).valid_count();
            assert!(count <= previous);
            previous = count;
        }
    }
}

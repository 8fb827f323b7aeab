use crate::core::terrain::TerrainRasters;
use crate::types::{Raster, SnowResult, SunAngles};
use ndarray::Zip;

/// Parameters for the Minnaert illumination correction
#[derive(Debug, Clone, PartialEq)]
pub struct TopographicParams {
    /// Minnaert constant
    pub minnaert_k: f64,
    /// Lower bound applied to cos(i) before dividing. None leaves the
    /// correction unguarded near grazing illumination.
    pub min_cos_incidence: Option<f64>,
}

impl Default for TopographicParams {
    fn default() -> Self {
        Self {
            minnaert_k: 1.0,
            min_cos_incidence: None,
        }
    }
}

/// Topographic illumination corrector
#[derive(Debug, Clone, Default)]
pub struct TopographicCorrector {
    params: TopographicParams,
}

impl TopographicCorrector {
    pub fn new(params: TopographicParams) -> Self {
        Self { params }
    }

    /// Corrector with k = 1 and no clamp
    pub fn standard() -> Self {
        Self::new(TopographicParams::default())
    }

    pub fn params(&self) -> &TopographicParams {
        &self.params
    }

    /// Cosine of the local solar incidence angle
    ///
    /// cos(i) = cos(zenith) cos(slope) + sin(zenith) sin(slope) cos(azimuth - aspect)
    pub fn cos_incidence(sun: &SunAngles, slope: f64, aspect: f64) -> f64 {
        let zenith = sun.zenith_rad();
        zenith.cos() * slope.cos() + zenith.sin() * slope.sin() * (sun.azimuth_rad() - aspect).cos()
    }

    /// Apply the correction: `image * cos(slope) / cos(i) * k`
    ///
    /// Refuses to run when terrain and image grids differ.
    pub fn correct(&self, raster: &Raster, sun: &SunAngles, terrain: &TerrainRasters) -> SnowResult<Raster> {
        raster.grid().ensure_aligned(terrain.grid(), "terrain slope/aspect")?;

        log::debug!(
            "Applying topographic correction (sun azimuth {:.2}, elevation {:.2}, k {})",
            sun.azimuth_deg,
            sun.elevation_deg,
            self.params.minnaert_k
        );

        let k = self.params.minnaert_k;
        let floor = self.params.min_cos_incidence;

        let mut valid = raster.valid().clone();
        let corrected = Zip::from(raster.data())
            .and(&mut valid)
            .and(terrain.slope.data())
            .and(terrain.aspect.data())
            .map_collect(|&value, ok, &slope, &aspect| {
                if !*ok || !slope.is_finite() || !aspect.is_finite() {
                    *ok = false;
                    return f32::NAN;
                }
                let slope = slope as f64;
                let mut cos_i = Self::cos_incidence(sun, slope, aspect as f64);
                if let Some(min) = floor {
                    cos_i = cos_i.max(min);
                }
                (value as f64 * (slope.cos() / cos_i) * k) as f32
            });

        let result = Raster::new(corrected, valid, raster.grid().clone())?;

        let dropped = raster.valid_count() - result.valid_count();
        if dropped > 0 {
            log::debug!("{} pixels lost validity during topographic correction", dropped);
        }

        Ok(result)
    }
}

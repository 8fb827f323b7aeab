//! JSON run configuration

use crate::core::calibrate::RadiometricParams;
use crate::core::composite::{CompositeMode, CompositeWindows, Period};
use crate::core::histogram::HistogramParams;
use crate::core::pipeline::{PipelineParams, SunGeometry};
use crate::core::snow_map::SnowMapParams;
use crate::core::topographic::TopographicParams;
use crate::io::SceneFilter;
use crate::types::{SnowError, SnowResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the glacier outline comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoiConfig {
    /// OGR vector file, optionally filtered on `field == value`
    File {
        path: PathBuf,
        #[serde(default)]
        layer: Option<String>,
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
    /// Polygon WKT in the imagery CRS
    Wkt { name: String, wkt: String },
}

/// Full configuration of one AAR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AarConfig {
    pub scenes_dir: PathBuf,
    #[serde(default = "default_band_suffix")]
    pub band_suffix: String,
    pub output_dir: PathBuf,
    pub roi: RoiConfig,
    #[serde(default)]
    pub dem_path: Option<PathBuf>,

    /// First day of the first window
    pub start: NaiveDate,
    /// Scenes on or after this day are ignored
    pub end: NaiveDate,
    #[serde(default)]
    pub doy_start: Option<u32>,
    #[serde(default)]
    pub doy_end: Option<u32>,
    #[serde(default = "default_period")]
    pub window_length: Period,
    #[serde(default = "default_period")]
    pub window_step: Period,

    /// Convert DN to reflectance; off when scenes already hold reflectance
    #[serde(default = "default_true")]
    pub calibrate: bool,
    #[serde(default = "default_scale")]
    pub reflectance_scale: f64,
    #[serde(default = "default_offset")]
    pub reflectance_offset: f64,

    #[serde(default)]
    pub topographic_correction: bool,
    #[serde(default = "default_minnaert_k")]
    pub minnaert_k: f64,
    #[serde(default)]
    pub min_cos_incidence: Option<f64>,
    #[serde(default)]
    pub sun_geometry: SunGeometry,
    #[serde(default)]
    pub composite_mode: CompositeMode,

    #[serde(default = "default_buckets")]
    pub histogram_buckets: usize,
    #[serde(default = "default_upper_bound")]
    pub snow_upper_bound: f64,

    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_true")]
    pub write_masks: bool,
}

fn default_band_suffix() -> String {
    "_SR_B5.TIF".to_string()
}

fn default_period() -> Period {
    Period::Years(1)
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    RadiometricParams::default().scale
}

fn default_offset() -> f64 {
    RadiometricParams::default().offset
}

fn default_minnaert_k() -> f64 {
    1.0
}

fn default_buckets() -> usize {
    HistogramParams::default().buckets
}

fn default_upper_bound() -> f64 {
    SnowMapParams::default().upper_bound
}

impl AarConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SnowResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> SnowResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SnowResult<()> {
        if self.start >= self.end {
            return Err(SnowError::Config(format!(
                "start {} must be before end {}",
                self.start, self.end
            )));
        }
        for doy in [self.doy_start, self.doy_end].into_iter().flatten() {
            if !(1..=366).contains(&doy) {
                return Err(SnowError::Config(format!("day of year {} is outside 1..=366", doy)));
            }
        }
        if let (Some(first), Some(last)) = (self.doy_start, self.doy_end) {
            if first > last {
                return Err(SnowError::Config(format!(
                    "doy_start {} is after doy_end {}",
                    first, last
                )));
            }
        }
        if self.histogram_buckets < 2 {
            return Err(SnowError::Config("histogram_buckets must be at least 2".to_string()));
        }
        if self.calibrate && (self.reflectance_scale == 0.0 || !self.reflectance_scale.is_finite()) {
            return Err(SnowError::Config("reflectance_scale must be finite and non-zero".to_string()));
        }
        if !self.minnaert_k.is_finite() {
            return Err(SnowError::Config("minnaert_k must be finite".to_string()));
        }
        if self.topographic_correction && self.dem_path.is_none() {
            return Err(SnowError::Config(
                "topographic_correction requires dem_path".to_string(),
            ));
        }
        if let RoiConfig::File { field, value, .. } = &self.roi {
            if field.is_some() != value.is_some() {
                return Err(SnowError::Config(
                    "roi field and value must be given together".to_string(),
                ));
            }
        }
        if self.composite_mode == CompositeMode::Windowed {
            self.windows().windows()?;
        }
        Ok(())
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(chrono::NaiveTime::MIN))
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.end.and_time(chrono::NaiveTime::MIN))
    }

    pub fn windows(&self) -> CompositeWindows {
        CompositeWindows {
            start: self.start_utc(),
            end: self.end_utc(),
            length: self.window_length,
            step: self.window_step,
        }
    }

    pub fn scene_filter(&self) -> SceneFilter {
        SceneFilter {
            start: Some(self.start_utc()),
            end: Some(self.end_utc()),
            doy_start: self.doy_start,
            doy_end: self.doy_end,
        }
    }

    pub fn pipeline_params(&self) -> PipelineParams {
        PipelineParams {
            radiometric: self.calibrate.then_some(RadiometricParams {
                scale: self.reflectance_scale,
                offset: self.reflectance_offset,
            }),
            topographic: self.topographic_correction.then_some(TopographicParams {
                minnaert_k: self.minnaert_k,
                min_cos_incidence: self.min_cos_incidence,
            }),
            sun_geometry: self.sun_geometry,
            windows: self.windows(),
            mode: self.composite_mode,
            snow_map: SnowMapParams {
                histogram: HistogramParams {
                    buckets: self.histogram_buckets,
                },
                upper_bound: self.snow_upper_bound,
            },
            threads: self.threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "scenes_dir": "/data/storglaciaren/landsat",
        "output_dir": "/tmp/aar",
        "roi": {"path": "/data/glims.shp", "field": "glac_name", "value": "Storglaciaren"},
        "start": "2013-01-01",
        "end": "2021-01-01",
        "doy_start": 182,
        "doy_end": 273
    }"#;

    #[test]
    fn test_defaults() {
        let config = AarConfig::from_json(MINIMAL).unwrap();

        assert_eq!(config.band_suffix, "_SR_B5.TIF");
        assert_eq!(config.window_length, Period::Years(1));
        assert!(config.calibrate);
        assert!(!config.topographic_correction);
        assert_eq!(config.sun_geometry, SunGeometry::CollectionFirstScene);
        assert_eq!(config.histogram_buckets, 256);
        assert_eq!(config.windows().windows().unwrap().len(), 8);

        let params = config.pipeline_params();
        assert_eq!(params.radiometric, Some(RadiometricParams::default()));
        assert!(params.topographic.is_none());
    }

    #[test]
    fn test_full_options() {
        let json = r#"{
            "scenes_dir": "scenes",
            "output_dir": "out",
            "roi": {"name": "box", "wkt": "POLYGON ((0 0, 1 0, 1 1, 0 0))"},
            "dem_path": "dem.tif",
            "start": "2015-06-01",
            "end": "2016-06-01",
            "window_length": {"months": 3},
            "window_step": {"months": 1},
            "topographic_correction": true,
            "min_cos_incidence": 0.05,
            "sun_geometry": "per_scene",
            "threads": 4
        }"#;
        let config = AarConfig::from_json(json).unwrap();

        assert!(matches!(config.roi, RoiConfig::Wkt { .. }));
        assert_eq!(config.windows().windows().unwrap().len(), 10);
        let params = config.pipeline_params();
        assert_eq!(params.topographic.unwrap().min_cos_incidence, Some(0.05));
        assert_eq!(params.sun_geometry, SunGeometry::PerScene);
        assert_eq!(params.threads, 4);
        assert_eq!(params.mode, CompositeMode::Windowed);
    }

    #[test]
    fn test_per_scene_mode_skips_window_checks() {
        // A window longer than the period is only an error when windows are built
        let per_scene = MINIMAL.replace(
            "\"doy_end\": 273",
            "\"doy_end\": 273, \"window_length\": {\"years\": 20}, \"composite_mode\": \"per_scene\"",
        );
        let config = AarConfig::from_json(&per_scene).unwrap();
        assert_eq!(config.pipeline_params().mode, CompositeMode::PerScene);

        let windowed = per_scene.replace("per_scene", "windowed");
        assert!(AarConfig::from_json(&windowed).is_err());
    }

    #[test]
    fn test_invalid_configs() {
        let reversed = MINIMAL.replace("\"2013-01-01\"", "\"2022-01-01\"");
        assert!(matches!(AarConfig::from_json(&reversed), Err(SnowError::Config(_))));

        let bad_doy = MINIMAL.replace("273", "400");
        assert!(AarConfig::from_json(&bad_doy).is_err());

        let topo_without_dem = MINIMAL.replace("\"doy_end\": 273", "\"doy_end\": 273, \"topographic_correction\": true");
        assert!(matches!(AarConfig::from_json(&topo_without_dem), Err(SnowError::Config(_))));

        let unknown = MINIMAL.replace("\"doy_end\": 273", "\"doy_end\": 273, \"colour\": \"blue\"");
        assert!(matches!(AarConfig::from_json(&unknown), Err(SnowError::Json(_))));
    }
}

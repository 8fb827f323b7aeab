//! snowline: glacier snow cover and accumulation-area ratio from optical imagery
//!
//! For a glacier outline and a time series of surface reflectance scenes the
//! library builds per-window minimum composites, optionally applies a Minnaert
//! topographic correction, thresholds each composite with Otsu's method inside
//! the outline and counts snow pixels into an AAR time series.

pub mod api;
pub mod config;
pub mod core;
pub mod io;
mod maybe_rayon;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::AarConfig;
pub use core::{
    AarPipeline, AarReport, CompositeWindows, OtsuThresholder, PipelineParams, RadiometricCorrector,
    RegionOfInterest, SnowMapper, SunGeometry, TemporalCompositor, TerrainModel, TopographicCorrector,
};
pub use io::{ElevationSource, ImagerySource, RoiSource};
pub use types::{GeoTransform, Grid, Raster, RasterStack, Scene, SnowError, SnowResult, SunAngles};

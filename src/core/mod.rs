//! Core snow mapping modules

pub mod area;
pub mod calibrate;
pub mod composite;
pub mod histogram;
pub mod otsu;
pub mod pipeline;
pub mod roi;
pub mod snow_map;
pub mod terrain;
pub mod topographic;

// Re-export main types
pub use area::{AarSample, AreaAggregator};
pub use calibrate::{RadiometricCorrector, RadiometricParams};
pub use composite::{
    Composite, CompositeMode, CompositeWarning, CompositeWindows, Period, TemporalCompositor, TimeWindow,
};
pub use histogram::{Histogram, HistogramParams};
pub use otsu::OtsuThresholder;
pub use pipeline::{AarPipeline, AarReport, PipelineParams, SunGeometry, WindowOutcome, WindowResult};
pub use roi::{RegionOfInterest, RoiMask};
pub use snow_map::{SnowMap, SnowMapOutcome, SnowMapParams, SnowMapper};
pub use terrain::{TerrainModel, TerrainParams, TerrainRasters};
pub use topographic::{TopographicCorrector, TopographicParams};

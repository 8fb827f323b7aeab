//! High-level entry points: run a configured AAR estimation from files, or
//! drive the pipeline from any set of providers.

use crate::config::{AarConfig, RoiConfig};
use crate::core::pipeline::{AarPipeline, AarReport, PipelineParams};
use crate::core::roi::RegionOfInterest;
use crate::core::terrain::TerrainModel;
use crate::io::roi::region_from_wkt;
use crate::io::{ElevationSource, GdalDemSource, GdalRoiSource, GdalSceneDirectory, ImagerySource, ReportWriter, RoiSource};
use crate::types::{SnowError, SnowResult};
use std::path::PathBuf;

/// Load scenes, outline and terrain from the providers and run the pipeline
///
/// Terrain is only derived when the parameters enable topographic correction.
pub fn estimate_aar(
    imagery: &dyn ImagerySource,
    elevation: Option<&dyn ElevationSource>,
    roi: &dyn RoiSource,
    params: PipelineParams,
) -> SnowResult<AarReport> {
    let stack = imagery.stack()?;
    let region = roi.region()?;

    let terrain = match (&params.topographic, elevation) {
        (Some(_), Some(source)) => {
            let dem = source.elevation(stack.grid())?;
            Some(TerrainModel::standard().slope_aspect(&dem)?)
        }
        (Some(_), None) => {
            return Err(SnowError::Config(
                "Topographic correction requires an elevation source".to_string(),
            ))
        }
        (None, _) => None,
    };

    AarPipeline::new(params).run(&stack, terrain.as_ref(), &region)
}

/// Run the estimation described by `config` and write its outputs
pub fn run_with_config(config: &AarConfig) -> SnowResult<(AarReport, Vec<PathBuf>)> {
    config.validate()?;

    let imagery = GdalSceneDirectory::new(&config.scenes_dir)
        .with_band_suffix(config.band_suffix.clone())
        .with_filter(config.scene_filter());
    let dem = config.dem_path.as_ref().map(GdalDemSource::new);
    let roi = roi_source(&config.roi);

    let report = estimate_aar(
        &imagery,
        dem.as_ref().map(|d| d as &dyn ElevationSource),
        roi.as_ref(),
        config.pipeline_params(),
    )?;

    let written = ReportWriter::new(&config.output_dir)
        .with_masks(config.write_masks)
        .write_all(&report)?;
    Ok((report, written))
}

fn roi_source(config: &RoiConfig) -> Box<dyn RoiSource> {
    match config {
        RoiConfig::File {
            path,
            layer,
            field,
            value,
        } => {
            let mut source = GdalRoiSource::new(path);
            if let Some(layer) = layer {
                source = source.with_layer(layer.clone());
            }
            if let (Some(field), Some(value)) = (field, value) {
                source = source.with_filter(field.clone(), value.clone());
            }
            Box::new(source)
        }
        RoiConfig::Wkt { name, wkt } => Box::new(WktRoi {
            name: name.clone(),
            wkt: wkt.clone(),
        }),
    }
}

struct WktRoi {
    name: String,
    wkt: String,
}

impl RoiSource for WktRoi {
    fn region(&self) -> SnowResult<RegionOfInterest> {
        region_from_wkt(&self.name, &self.wkt)
    }
}

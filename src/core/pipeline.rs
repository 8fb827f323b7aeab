use crate::core::area::AreaAggregator;
use crate::core::calibrate::{RadiometricCorrector, RadiometricParams};
use crate::core::composite::{Composite, CompositeMode, CompositeWindows, TemporalCompositor, TimeWindow};
use crate::core::roi::{RegionOfInterest, RoiMask};
use crate::core::snow_map::{SnowMapOutcome, SnowMapParams, SnowMapper};
use crate::core::terrain::TerrainRasters;
use crate::core::topographic::{TopographicCorrector, TopographicParams};
use crate::maybe_rayon::*;
use crate::types::{Raster, RasterStack, Scene, SnowError, SnowResult, SunAngles};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which scene supplies the sun angles for topographic correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunGeometry {
    /// Every scene is corrected with its own angles before compositing
    PerScene,
    /// Each composite is corrected with the first scene of its window
    WindowFirstScene,
    /// Every composite is corrected with the first scene of the collection
    #[default]
    CollectionFirstScene,
}

/// Parameters for a full AAR run
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// DN conversion; None when the scenes already hold reflectance
    pub radiometric: Option<RadiometricParams>,
    /// Illumination correction; None disables it
    pub topographic: Option<TopographicParams>,
    pub sun_geometry: SunGeometry,
    /// Calendar windows, or one composite per scene
    pub mode: CompositeMode,
    /// Window layout, used in `CompositeMode::Windowed`
    pub windows: CompositeWindows,
    pub snow_map: SnowMapParams,
    /// Worker threads, 0 for the global rayon pool
    pub threads: usize,
}

impl PipelineParams {
    pub fn new(windows: CompositeWindows) -> Self {
        Self {
            radiometric: Some(RadiometricParams::default()),
            topographic: None,
            sun_geometry: SunGeometry::default(),
            mode: CompositeMode::default(),
            windows,
            snow_map: SnowMapParams::default(),
            threads: 0,
        }
    }
}

/// Result of one composite window
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowOutcome {
    Mapped {
        threshold: f64,
        snow_pixels: usize,
        snow_area: f64,
        aar: Option<f64>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowResult {
    pub window: TimeWindow,
    pub scene_ids: Vec<String>,
    #[serde(flatten)]
    pub outcome: WindowOutcome,
    /// Snow mask of a mapped window, clipped to the outline
    #[serde(skip)]
    pub mask: Option<Raster>,
}

impl WindowResult {
    pub fn threshold(&self) -> Option<f64> {
        match self.outcome {
            WindowOutcome::Mapped { threshold, .. } => Some(threshold),
            WindowOutcome::Skipped { .. } => None,
        }
    }

    pub fn snow_pixels(&self) -> Option<usize> {
        match self.outcome {
            WindowOutcome::Mapped { snow_pixels, .. } => Some(snow_pixels),
            WindowOutcome::Skipped { .. } => None,
        }
    }

    pub fn aar(&self) -> Option<f64> {
        match self.outcome {
            WindowOutcome::Mapped { aar, .. } => aar,
            WindowOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, WindowOutcome::Skipped { .. })
    }
}

/// Batch report of an AAR run
#[derive(Debug, Clone, Serialize)]
pub struct AarReport {
    pub roi_name: String,
    pub roi_pixel_count: usize,
    /// Area of one pixel in squared CRS units
    pub pixel_area: f64,
    pub sun_geometry: SunGeometry,
    pub composite_mode: CompositeMode,
    pub topographic_correction: bool,
    pub acquisition_dates: Vec<DateTime<Utc>>,
    pub windows: Vec<WindowResult>,
}

impl AarReport {
    /// Thresholds in window order, None for skipped windows
    pub fn thresholds(&self) -> Vec<Option<f64>> {
        self.windows.iter().map(WindowResult::threshold).collect()
    }

    pub fn counts(&self) -> Vec<Option<usize>> {
        self.windows.iter().map(WindowResult::snow_pixels).collect()
    }

    pub fn skipped(&self) -> Vec<&WindowResult> {
        self.windows.iter().filter(|w| w.is_skipped()).collect()
    }

    pub fn mapped_count(&self) -> usize {
        self.windows.len() - self.skipped().len()
    }
}

/// Composite, correct, threshold and count a scene collection
#[derive(Debug, Clone)]
pub struct AarPipeline {
    params: PipelineParams,
}

impl AarPipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run the whole chain over `stack`
    ///
    /// Configuration problems (missing terrain or sun angles, grid mismatch)
    /// fail before any processing. Empty windows and degenerate histograms are
    /// reported as skipped windows.
    pub fn run(
        &self,
        stack: &RasterStack,
        terrain: Option<&TerrainRasters>,
        roi: &RegionOfInterest,
    ) -> SnowResult<AarReport> {
        let windows = self.validate(stack, terrain)?;

        #[cfg(feature = "parallel")]
        if self.params.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.threads)
                .build()
                .map_err(|e| SnowError::Config(format!("Failed to build thread pool: {}", e)))?;
            return pool.install(|| self.execute(stack, terrain, roi, &windows));
        }

        self.execute(stack, terrain, roi, &windows)
    }

    fn validate(&self, stack: &RasterStack, terrain: Option<&TerrainRasters>) -> SnowResult<Vec<TimeWindow>> {
        if stack.is_empty() {
            return Err(SnowError::InvalidInput("No scenes to process".to_string()));
        }
        let windows = match self.params.mode {
            CompositeMode::Windowed => self.params.windows.windows()?,
            CompositeMode::PerScene => Vec::new(),
        };

        if self.params.topographic.is_none() {
            return Ok(windows);
        }

        let terrain = terrain.ok_or_else(|| {
            SnowError::Config("Topographic correction requires slope and aspect rasters".to_string())
        })?;
        stack.grid().ensure_aligned(terrain.grid(), "terrain slope/aspect")?;

        let needs_sun: Vec<_> = match (self.params.sun_geometry, self.params.mode) {
            (SunGeometry::PerScene, _) | (SunGeometry::WindowFirstScene, CompositeMode::PerScene) => {
                stack.scenes().iter().collect()
            }
            (SunGeometry::WindowFirstScene, CompositeMode::Windowed) => windows
                .iter()
                .filter_map(|w| stack.scenes().iter().find(|s| w.contains(s.acquired)))
                .collect(),
            (SunGeometry::CollectionFirstScene, _) => stack.scenes().iter().take(1).collect(),
        };
        if let Some(scene) = needs_sun.iter().find(|s| s.sun.is_none()) {
            return Err(SnowError::InvalidInput(format!(
                "Scene {} has no sun angles, required for {:?} topographic correction",
                scene.id, self.params.sun_geometry
            )));
        }

        Ok(windows)
    }

    fn execute(
        &self,
        stack: &RasterStack,
        terrain: Option<&TerrainRasters>,
        roi: &RegionOfInterest,
        windows: &[TimeWindow],
    ) -> SnowResult<AarReport> {
        match self.params.mode {
            CompositeMode::Windowed => log::info!(
                "Processing {} scenes over {} windows for ROI '{}'",
                stack.len(),
                windows.len(),
                roi.name
            ),
            CompositeMode::PerScene => log::info!("Processing {} scenes one by one for ROI '{}'", stack.len(), roi.name),
        }

        let mut stack = match &self.params.radiometric {
            Some(params) => RadiometricCorrector::new(*params).correct_stack(stack)?,
            None => stack.clone(),
        };

        let corrector = self.params.topographic.clone().map(TopographicCorrector::new);
        let terrain_corrector = corrector.as_ref().zip(terrain);

        if let (Some((corrector, terrain)), SunGeometry::PerScene) = (terrain_corrector, self.params.sun_geometry) {
            log::info!("Applying per-scene topographic correction");
            let scenes = stack
                .scenes()
                .par_iter()
                .map(|scene| -> SnowResult<Scene> {
                    let sun = Self::required_sun(scene.sun, &scene.id)?;
                    Ok(scene.with_raster(corrector.correct(&scene.raster, &sun, terrain)?))
                })
                .collect::<SnowResult<Vec<_>>>()?;
            stack = RasterStack::new(stack.grid().clone(), scenes)?;
        }

        let composites = match self.params.mode {
            CompositeMode::Windowed => TemporalCompositor::new().composite(&stack, windows)?,
            CompositeMode::PerScene => TemporalCompositor::new().per_scene(&stack),
        };
        let roi_mask = roi.rasterize(stack.grid());
        let collection_sun = stack.scenes().first().and_then(|s| s.sun);

        let composite_corrector = match self.params.sun_geometry {
            SunGeometry::PerScene => None,
            _ => terrain_corrector,
        };

        let results = composites
            .into_par_iter()
            .map(|composite| self.process_window(composite, composite_corrector, collection_sun, &roi_mask))
            .collect::<SnowResult<Vec<_>>>()?;

        let report = AarReport {
            roi_name: roi.name.clone(),
            roi_pixel_count: roi_mask.pixel_count(),
            pixel_area: stack.grid().transform.pixel_area(),
            sun_geometry: self.params.sun_geometry,
            composite_mode: self.params.mode,
            topographic_correction: terrain_corrector.is_some(),
            acquisition_dates: stack.timestamps(),
            windows: results,
        };

        log::info!(
            "Mapped {} of {} windows, {} skipped",
            report.mapped_count(),
            report.windows.len(),
            report.skipped().len()
        );
        Ok(report)
    }

    fn process_window(
        &self,
        composite: Composite,
        corrector: Option<(&TopographicCorrector, &TerrainRasters)>,
        collection_sun: Option<SunAngles>,
        roi_mask: &RoiMask,
    ) -> SnowResult<WindowResult> {
        let Composite {
            window,
            raster,
            scene_ids,
            sun,
            ..
        } = composite;

        if scene_ids.is_empty() {
            return Ok(WindowResult {
                window,
                scene_ids,
                outcome: WindowOutcome::Skipped {
                    reason: format!("no scenes in window {}", window),
                },
                mask: None,
            });
        }

        let image = match corrector {
            Some((corrector, terrain)) => {
                let sun = match self.params.sun_geometry {
                    SunGeometry::CollectionFirstScene => collection_sun,
                    _ => sun,
                };
                let sun = Self::required_sun(sun, &window.to_string())?;
                corrector.correct(&raster, &sun, terrain)?
            }
            None => raster,
        };

        let mapper = SnowMapper::new(self.params.snow_map.clone());
        let (outcome, mask) = match mapper.map(&image, roi_mask)? {
            SnowMapOutcome::Mapped(map) => {
                let sample = AreaAggregator::new().sample(&map.mask, roi_mask)?;
                log::debug!(
                    "Window {}: threshold {:.4}, {} snow pixels",
                    window,
                    map.threshold,
                    sample.snow_pixels
                );
                (
                    WindowOutcome::Mapped {
                        threshold: map.threshold,
                        snow_pixels: sample.snow_pixels,
                        snow_area: AreaAggregator::area(sample.snow_pixels, &map.mask.grid().transform),
                        aar: sample.ratio(),
                    },
                    Some(roi_mask.clip(&map.mask)?),
                )
            }
            SnowMapOutcome::Unmapped { reason } => (WindowOutcome::Skipped { reason }, None),
        };

        Ok(WindowResult {
            window,
            scene_ids,
            outcome,
            mask,
        })
    }

    fn required_sun(sun: Option<SunAngles>, what: &str) -> SnowResult<SunAngles> {
        sun.ok_or_else(|| SnowError::InvalidInput(format!("No sun angles available for {}", what)))
    }
}

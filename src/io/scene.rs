use crate::io::metadata::{LandsatMetadata, ProductId};
use crate::io::{read_band_u16, read_raster, ImagerySource};
use crate::types::{Raster, Scene, SnowError, SnowResult, SunAngles};
use chrono::{DateTime, Datelike, Utc};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Acquisition date and season filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFilter {
    /// Earliest acquisition, inclusive
    pub start: Option<DateTime<Utc>>,
    /// Latest acquisition, exclusive
    pub end: Option<DateTime<Utc>>,
    /// Day-of-year range, inclusive on both ends
    pub doy_start: Option<u32>,
    pub doy_end: Option<u32>,
}

impl SceneFilter {
    pub fn accepts(&self, t: DateTime<Utc>) -> bool {
        if self.start.map_or(false, |s| t < s) || self.end.map_or(false, |e| t >= e) {
            return false;
        }
        let doy = t.ordinal();
        self.doy_start.map_or(true, |d| doy >= d) && self.doy_end.map_or(true, |d| doy <= d)
    }
}

/// QA_PIXEL: fill, dilated cloud, cirrus, cloud and cloud shadow bits all clear
pub fn qa_pixel_clear(qa: u16) -> bool {
    qa & 0b11111 == 0
}

/// QA_RADSAT: no saturated band
pub fn qa_radsat_clear(qa: u16) -> bool {
    qa == 0
}

/// Files making up one scene on disk
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFiles {
    pub stem: String,
    pub band: PathBuf,
    pub qa_pixel: Option<PathBuf>,
    pub qa_radsat: Option<PathBuf>,
    pub mtl: Option<PathBuf>,
}

/// Landsat scenes stored as per-band GeoTIFFs in one directory
///
/// Each scene is found through its reflectance band file, for example
/// `LC08_L2SP_195012_20200811_20200918_02_T1_SR_B5.TIF`. QA and MTL files with
/// the same stem are picked up when present.
#[derive(Debug, Clone)]
pub struct GdalSceneDirectory {
    dir: PathBuf,
    band_suffix: String,
    filter: SceneFilter,
}

impl GdalSceneDirectory {
    pub const DEFAULT_BAND_SUFFIX: &'static str = "_SR_B5.TIF";

    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            band_suffix: Self::DEFAULT_BAND_SUFFIX.to_string(),
            filter: SceneFilter::default(),
        }
    }

    pub fn with_band_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.band_suffix = suffix.into();
        self
    }

    pub fn with_filter(mut self, filter: SceneFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Scene file sets in the directory, sorted by stem
    pub fn discover(&self) -> SnowResult<Vec<SceneFiles>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| SnowError::UnreachableSource {
            source_name: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let suffix = self.band_suffix.to_uppercase();
        let mut scenes = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if !name.to_uppercase().ends_with(&suffix) {
                continue;
            }

            let stem = name[..name.len() - suffix.len()].to_string();
            let sibling = |tail: &str| {
                let candidate = self.dir.join(format!("{}{}", stem, tail));
                candidate.exists().then_some(candidate)
            };
            scenes.push(SceneFiles {
                qa_pixel: sibling("_QA_PIXEL.TIF"),
                qa_radsat: sibling("_QA_RADSAT.TIF"),
                mtl: sibling("_MTL.xml"),
                band: path,
                stem,
            });
        }

        scenes.sort_by(|a, b| a.stem.cmp(&b.stem));
        log::info!("Found {} scenes in {}", scenes.len(), self.dir.display());
        Ok(scenes)
    }

    /// Acquisition time and sun angles without reading pixels
    pub fn acquisition(files: &SceneFiles) -> SnowResult<(DateTime<Utc>, Option<SunAngles>)> {
        if let Some(mtl) = &files.mtl {
            let meta = LandsatMetadata::from_file(mtl)?;
            return Ok((meta.acquired, Some(meta.sun)));
        }

        match ProductId::find(&files.stem)? {
            Some(id) => {
                log::debug!("No MTL for {}, using product id date without sun angles", files.stem);
                Ok((id.acquired_utc(), None))
            }
            None => Err(SnowError::InvalidInput(format!(
                "Cannot determine acquisition date of {}",
                files.band.display()
            ))),
        }
    }

    /// Read the band and apply the QA masks
    pub fn read_scene(files: &SceneFiles) -> SnowResult<Scene> {
        let (acquired, sun) = Self::acquisition(files)?;
        let band = read_raster(&files.band)?;

        let mut valid = band.valid().clone();
        for (path, clear) in [
            (&files.qa_pixel, qa_pixel_clear as fn(u16) -> bool),
            (&files.qa_radsat, qa_radsat_clear),
        ] {
            if let Some(path) = path {
                let (qa, grid) = read_band_u16(path)?;
                band.grid().ensure_aligned(&grid, &path.display().to_string())?;
                Zip::from(&mut valid).and(&qa).for_each(|ok, &q| *ok = *ok && clear(q));
            }
        }

        let raster = Raster::new(band.data().clone(), valid, band.grid().clone())?;
        log::debug!("Scene {}: {} valid pixels", files.stem, raster.valid_count());

        let scene = Scene::new(files.stem.clone(), acquired, raster);
        Ok(match sun {
            Some(sun) => scene.with_sun(sun),
            None => scene,
        })
    }
}

impl ImagerySource for GdalSceneDirectory {
    fn scenes(&self) -> SnowResult<Vec<Scene>> {
        let mut scenes = Vec::new();
        for files in self.discover()? {
            let (acquired, _) = Self::acquisition(&files)?;
            if !self.filter.accepts(acquired) {
                log::debug!("Scene {} ({}) filtered out", files.stem, acquired.format("%Y-%m-%d"));
                continue;
            }
            scenes.push(Self::read_scene(&files)?);
        }

        if scenes.is_empty() {
            return Err(SnowError::InvalidInput(format!(
                "No scenes in {} pass the date filter",
                self.dir.display()
            )));
        }
        log::info!("Loaded {} scenes", scenes.len());
        Ok(scenes)
    }
}

use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Per-pixel reflectance samples (row x column)
pub type ReflectanceImage = Array2<f32>;

/// Per-pixel validity bits (true = usable sample)
pub type ValidityMask = Array2<bool>;

/// Geospatial transformation parameters (GDAL affine convention)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self {
            top_left_x: 0.0,
            pixel_width: 1.0,
            rotation_x: 0.0,
            top_left_y: 0.0,
            rotation_y: 0.0,
            pixel_height: -1.0,
        }
    }
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Fractional (row, col) of a map coordinate, pixel centres at .5
    /// Rotation terms are ignored.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (y - self.top_left_y) / self.pixel_height,
            (x - self.top_left_x) / self.pixel_width,
        )
    }

    /// Ground area covered by one pixel, in squared CRS units
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y).abs()
    }

    /// Ground sample distance (x, y) in CRS units
    pub fn pixel_spacing(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.rotation_y),
            self.pixel_height.hypot(self.rotation_x),
        )
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs())))
    }
}

/// Raster grid: dimensions plus georeferencing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    /// Projection WKT, empty when unknown
    pub projection: String,
}

impl Grid {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, projection: impl Into<String>) -> Self {
        Self {
            rows,
            cols,
            transform,
            projection: projection.into(),
        }
    }

    /// Ungeoreferenced grid with unit pixels
    pub fn pixel_grid(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, GeoTransform::default(), "")
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_aligned_with(&self, other: &Grid) -> bool {
        if self.shape() != other.shape() || !self.transform.approx_eq(&other.transform) {
            return false;
        }
        self.same_crs(other)
    }

    /// Projections agree, or at least one side is unknown
    pub fn same_crs(&self, other: &Grid) -> bool {
        self.projection.is_empty() || other.projection.is_empty() || self.projection == other.projection
    }

    /// Fail with `GridMismatch` unless `other` lies on this grid
    pub fn ensure_aligned(&self, other: &Grid, what: &str) -> SnowResult<()> {
        if self.is_aligned_with(other) {
            Ok(())
        } else {
            Err(SnowError::GridMismatch {
                what: what.to_string(),
                expected: self.describe(),
                found: other.describe(),
            })
        }
    }

    fn describe(&self) -> String {
        format!(
            "{}x{} @ ({:.3}, {:.3}) step ({:.3}, {:.3})",
            self.rows,
            self.cols,
            self.transform.top_left_x,
            self.transform.top_left_y,
            self.transform.pixel_width,
            self.transform.pixel_height
        )
    }
}

/// Single-band floating point raster with an explicit validity mask.
///
/// Invalid pixels always hold NaN in `data`; non-finite samples handed to a
/// constructor are marked invalid.
#[derive(Debug, Clone)]
pub struct Raster {
    data: ReflectanceImage,
    valid: ValidityMask,
    grid: Grid,
}

/// Rasters are equal when grid and validity agree and every valid sample matches
impl PartialEq for Raster {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self.valid == other.valid
            && Zip::from(&self.data)
                .and(&other.data)
                .and(&self.valid)
                .all(|&a, &b, &ok| !ok || a == b)
    }
}

impl Raster {
    /// Create a raster from samples and validity on a grid
    pub fn new(data: ReflectanceImage, valid: ValidityMask, grid: Grid) -> SnowResult<Self> {
        if data.dim() != valid.dim() {
            return Err(SnowError::InvalidInput(format!(
                "Data {:?} and validity {:?} arrays must have same dimensions",
                data.dim(),
                valid.dim()
            )));
        }
        if data.dim() != grid.shape() {
            return Err(SnowError::InvalidInput(format!(
                "Data {:?} does not match grid {:?}",
                data.dim(),
                grid.shape()
            )));
        }
        Ok(Self::normalized(data, valid, grid))
    }

    /// Create a raster where every finite sample is valid
    pub fn from_data(data: ReflectanceImage, grid: Grid) -> SnowResult<Self> {
        let valid = data.mapv(f32::is_finite);
        Self::new(data, valid, grid)
    }

    /// Ungeoreferenced raster, NaN marks invalid pixels
    pub fn from_array(data: ReflectanceImage) -> Self {
        let (rows, cols) = data.dim();
        let valid = data.mapv(f32::is_finite);
        Self::normalized(data, valid, Grid::pixel_grid(rows, cols))
    }

    /// All-invalid raster on a grid
    pub fn invalid(grid: &Grid) -> Self {
        Self {
            data: Array2::from_elem(grid.shape(), f32::NAN),
            valid: Array2::from_elem(grid.shape(), false),
            grid: grid.clone(),
        }
    }

    fn normalized(mut data: ReflectanceImage, mut valid: ValidityMask, grid: Grid) -> Self {
        Zip::from(&mut data).and(&mut valid).for_each(|v, ok| {
            if !*ok || !v.is_finite() {
                *ok = false;
                *v = f32::NAN;
            }
        });
        Self { data, valid, grid }
    }

    pub fn data(&self) -> &ReflectanceImage {
        &self.data
    }

    pub fn valid(&self) -> &ValidityMask {
        &self.valid
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Sample at (row, col) if the pixel is valid
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        match self.valid.get((row, col)) {
            Some(true) => Some(self.data[[row, col]]),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Apply `f` to every valid sample; invalid pixels stay invalid and
    /// non-finite results become invalid.
    pub fn map_valid<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = Zip::from(&self.data)
            .and(&self.valid)
            .map_collect(|&v, &ok| if ok { f(v) } else { f32::NAN });
        Self::normalized(data, self.valid.clone(), self.grid.clone())
    }

    /// Same as [`Raster::map_valid`], using rayon
    #[cfg(feature = "parallel")]
    pub fn par_map_valid<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = Zip::from(&self.data)
            .and(&self.valid)
            .par_map_collect(|&v, &ok| if ok { f(v) } else { f32::NAN });
        Self::normalized(data, self.valid.clone(), self.grid.clone())
    }

    /// Minimum and maximum over valid samples
    pub fn valid_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .zip(self.valid.iter())
            .filter(|(_, &ok)| ok)
            .fold(None, |acc, (&v, _)| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Sun position at scene acquisition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

impl SunAngles {
    pub fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }

    pub fn azimuth_rad(&self) -> f64 {
        self.azimuth_deg * std::f64::consts::PI / 180.0
    }

    pub fn zenith_rad(&self) -> f64 {
        (90.0 - self.elevation_deg) * std::f64::consts::PI / 180.0
    }
}

/// One acquisition: raster plus timestamp and scene metadata
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub sun: Option<SunAngles>,
    pub raster: Raster,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, raster: Raster) -> Self {
        Self {
            id: id.into(),
            acquired,
            sun: None,
            raster,
        }
    }

    pub fn with_sun(mut self, sun: SunAngles) -> Self {
        self.sun = Some(sun);
        self
    }

    /// Same scene with a replacement raster
    pub fn with_raster(&self, raster: Raster) -> Self {
        Self {
            id: self.id.clone(),
            acquired: self.acquired,
            sun: self.sun,
            raster,
        }
    }
}

/// Time-ordered scenes sharing one grid
#[derive(Debug, Clone)]
pub struct RasterStack {
    grid: Grid,
    scenes: Vec<Scene>,
}

impl RasterStack {
    pub fn new(grid: Grid, mut scenes: Vec<Scene>) -> SnowResult<Self> {
        for scene in &scenes {
            grid.ensure_aligned(scene.raster.grid(), &format!("scene {}", scene.id))?;
        }
        scenes.sort_by_key(|s| s.acquired);
        Ok(Self { grid, scenes })
    }

    /// Build a stack on the grid of the first scene
    pub fn from_scenes(scenes: Vec<Scene>) -> SnowResult<Self> {
        let grid = scenes
            .first()
            .map(|s| s.raster.grid().clone())
            .ok_or_else(|| SnowError::InvalidInput("Cannot build a raster stack from zero scenes".to_string()))?;
        Self::new(grid, scenes)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.scenes.iter().map(|s| s.acquired).collect()
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }
}

/// Error types for snow mapping
#[derive(Debug, thiserror::Error)]
pub enum SnowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Date parsing error: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("Degenerate histogram: {reason}")]
    DegenerateHistogram { reason: String },

    #[error("Composite window {window} contains no scenes")]
    EmptyCompositeWindow { window: String },

    #[error("Grid mismatch for {what}: expected {expected}, found {found}")]
    GridMismatch {
        what: String,
        expected: String,
        found: String,
    },

    #[error("Unreachable {source_name} source: {reason}")]
    UnreachableSource { source_name: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for snow mapping operations
pub type SnowResult<T> = Result<T, SnowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_invalid_pixels_hold_nan() {
        let data = array![[0.1_f32, 0.2], [f32::INFINITY, 0.4]];
        let valid = array![[true, false], [true, true]];
        let raster = Raster::new(data, valid, Grid::pixel_grid(2, 2)).unwrap();

        assert_eq!(raster.get(0, 0), Some(0.1));
        assert_eq!(raster.get(0, 1), None);
        assert_eq!(raster.get(1, 0), None);
        assert!(raster.data()[[0, 1]].is_nan());
        assert_eq!(raster.valid_count(), 2);
    }

    #[test]
    fn test_map_valid_propagates_invalidity() {
        let raster = Raster::from_array(array![[1.0_f32, f32::NAN], [0.0, 2.0]]);
        let mapped = raster.map_valid(|v| 1.0 / v);

        assert_eq!(mapped.get(0, 0), Some(1.0));
        assert_eq!(mapped.get(0, 1), None);
        // 1/0 is not finite
        assert_eq!(mapped.get(1, 0), None);
        assert_eq!(mapped.get(1, 1), Some(0.5));
    }

    #[test]
    fn test_equality_ignores_invalid_samples() {
        let raster = Raster::from_array(array![[0.1_f32, f32::NAN, 0.6], [0.8, 0.25, 1.2]]);
        assert_eq!(raster, raster.clone());

        let shifted = Raster::from_array(array![[0.1_f32, 0.3, f32::NAN], [0.8, 0.25, 1.2]]);
        assert_ne!(raster, shifted);

        let changed = Raster::from_array(array![[0.1_f32, f32::NAN, 0.6], [0.8, 0.25, 1.3]]);
        assert_ne!(raster, changed);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let data = Array2::<f32>::zeros((2, 3));
        let valid = Array2::from_elem((3, 2), true);
        assert!(Raster::new(data, valid, Grid::pixel_grid(2, 3)).is_err());
    }

    #[test]
    fn test_grid_alignment() {
        let transform = GeoTransform::from_gdal([500000.0, 30.0, 0.0, 7500000.0, 0.0, -30.0]);
        let a = Grid::new(10, 10, transform, "");
        let mut b = a.clone();
        assert!(a.is_aligned_with(&b));

        b.transform.top_left_x += 15.0;
        assert!(!a.is_aligned_with(&b));
        assert!(matches!(
            a.ensure_aligned(&b, "dem"),
            Err(SnowError::GridMismatch { .. })
        ));

        let c = Grid::new(10, 11, transform, "");
        assert!(!a.is_aligned_with(&c));
    }

    #[test]
    fn test_pixel_center_and_area() {
        let transform = GeoTransform::from_gdal([100.0, 30.0, 0.0, 200.0, 0.0, -30.0]);
        assert_eq!(transform.pixel_center(0, 0), (115.0, 185.0));
        assert_eq!(transform.pixel_area(), 900.0);
        assert_eq!(transform.to_pixel(115.0, 185.0), (0.5, 0.5));
    }

    #[test]
    fn test_stack_sorted_by_time() {
        let grid = Grid::pixel_grid(1, 1);
        let r = Raster::from_array(array![[0.5_f32]]);
        let late = Scene::new("b", "2020-08-01T00:00:00Z".parse().unwrap(), r.clone());
        let early = Scene::new("a", "2020-07-01T00:00:00Z".parse().unwrap(), r);
        let stack = RasterStack::new(grid, vec![late, early]).unwrap();
        assert_eq!(stack.scenes()[0].id, "a");
        assert_eq!(stack.len(), 2);
    }
}

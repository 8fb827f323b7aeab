use crate::maybe_rayon::*;
use crate::types::{Grid, Raster, SnowError, SnowResult};
use geo::{BoundingRect, Contains, MultiPolygon, Point, Polygon};
use ndarray::Array2;

/// Glacier outline in the imagery CRS
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl RegionOfInterest {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    pub fn from_polygon(name: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(name, MultiPolygon::new(vec![polygon]))
    }

    /// Rasterise onto `grid`: a pixel is inside when its centre is
    pub fn rasterize(&self, grid: &Grid) -> RoiMask {
        let (rows, cols) = grid.shape();
        let bounds = self.geometry.bounding_rect();
        let transform = grid.transform;

        let inside: Vec<Vec<bool>> = (0..rows)
            .into_par_iter()
            .map(|r| {
                (0..cols)
                    .map(|c| {
                        let (x, y) = transform.pixel_center(r, c);
                        match bounds {
                            Some(rect) => {
                                let (min, max) = (rect.min(), rect.max());
                                x >= min.x
                                    && x <= max.x
                                    && y >= min.y
                                    && y <= max.y
                                    && self.geometry.contains(&Point::new(x, y))
                            }
                            None => false,
                        }
                    })
                    .collect()
            })
            .collect();

        let mask = Array2::from_shape_fn((rows, cols), |(r, c)| inside[r][c]);
        let roi = RoiMask {
            mask,
            grid: grid.clone(),
        };
        log::debug!("ROI '{}' covers {} of {} pixels", self.name, roi.pixel_count(), grid.len());
        roi
    }
}

/// Rasterised region of interest on one grid
#[derive(Debug, Clone, PartialEq)]
pub struct RoiMask {
    mask: Array2<bool>,
    grid: Grid,
}

impl RoiMask {
    pub fn new(mask: Array2<bool>, grid: Grid) -> SnowResult<Self> {
        if mask.dim() != grid.shape() {
            return Err(SnowError::InvalidInput(format!(
                "ROI mask {:?} does not match grid {:?}",
                mask.dim(),
                grid.shape()
            )));
        }
        Ok(Self { mask, grid })
    }

    /// Every pixel of the grid inside the region
    pub fn full(grid: &Grid) -> Self {
        Self {
            mask: Array2::from_elem(grid.shape(), true),
            grid: grid.clone(),
        }
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.mask.get((row, col)).copied().unwrap_or(false)
    }

    /// Total ROI pixels, the AAR denominator
    pub fn pixel_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Copy of `raster` with every pixel outside the region invalid
    pub fn clip(&self, raster: &Raster) -> SnowResult<Raster> {
        self.grid.ensure_aligned(raster.grid(), "clipped raster")?;
        let valid = raster.valid() & &self.mask;
        let data = ndarray::Zip::from(raster.data())
            .and(&valid)
            .map_collect(|&v, &ok| if ok { v } else { f32::NAN });
        Raster::new(data, valid, self.grid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use geo::{polygon, LineString};

    fn grid() -> Grid {
        // 10 x 10 pixels of 30 m starting at (1000, 2000)
        Grid::new(
            10,
            10,
            GeoTransform::from_gdal([1000.0, 30.0, 0.0, 2000.0, 0.0, -30.0]),
            "",
        )
    }

    #[test]
    fn test_rectangle_uses_pixel_centres() {
        // Covers x 1000..1090 and y 1910..2000, i.e. the top-left 3 x 3 pixels
        let roi = RegionOfInterest::from_polygon(
            "box",
            polygon![
                (x: 1000.0, y: 1910.0),
                (x: 1090.0, y: 1910.0),
                (x: 1090.0, y: 2000.0),
                (x: 1000.0, y: 2000.0),
            ],
        );

        let mask = roi.rasterize(&grid());
        assert_eq!(mask.pixel_count(), 9);
        assert!(mask.contains(0, 0));
        assert!(mask.contains(2, 2));
        assert!(!mask.contains(3, 0));
        assert!(!mask.contains(0, 3));
    }

    #[test]
    fn test_polygon_with_hole() {
        let exterior = LineString::from(vec![
            (1000.0, 1700.0),
            (1300.0, 1700.0),
            (1300.0, 2000.0),
            (1000.0, 2000.0),
            (1000.0, 1700.0),
        ]);
        let hole = LineString::from(vec![
            (1120.0, 1820.0),
            (1180.0, 1820.0),
            (1180.0, 1880.0),
            (1120.0, 1880.0),
            (1120.0, 1820.0),
        ]);
        let roi = RegionOfInterest::from_polygon("holed", Polygon::new(exterior, vec![hole]));

        let mask = roi.rasterize(&grid());
        // pixel centres at 1135/1165 x 1865/1835 fall in the hole
        assert_eq!(mask.pixel_count(), 100 - 4);
        assert!(!mask.contains(4, 4));
    }

    #[test]
    fn test_outline_outside_grid() {
        let roi = RegionOfInterest::from_polygon(
            "elsewhere",
            polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)],
        );
        assert!(roi.rasterize(&grid()).is_empty());
    }

    #[test]
    fn test_mask_dimension_check() {
        assert!(RoiMask::new(Array2::from_elem((3, 3), true), grid()).is_err());
        assert_eq!(RoiMask::full(&grid()).pixel_count(), 100);
    }

    #[test]
    fn test_clip_invalidates_outside() {
        let mut mask = Array2::from_elem((10, 10), false);
        mask[[2, 3]] = true;
        mask[[2, 4]] = true;
        let roi = RoiMask::new(mask, grid()).unwrap();
        let mut data = Array2::from_elem((10, 10), 1.0f32);
        data[[2, 4]] = f32::NAN;
        let raster = Raster::from_data(data, grid()).unwrap();

        let clipped = roi.clip(&raster).unwrap();
        assert_eq!(clipped.valid_count(), 1);
        assert_eq!(clipped.get(2, 3), Some(1.0));
        assert_eq!(clipped.get(0, 0), None);
    }
}

use crate::core::roi::RegionOfInterest;
use crate::io::RoiSource;
use crate::types::{SnowError, SnowResult};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use geo::{MultiPolygon, Polygon};
use std::path::{Path, PathBuf};

/// Glacier outlines from an OGR vector file
///
/// With an attribute filter only matching features are kept, e.g.
/// `glac_name == "Storglaciaren"` on a GLIMS extract. All kept polygons form
/// one region.
#[derive(Debug, Clone)]
pub struct GdalRoiSource {
    path: PathBuf,
    layer: Option<String>,
    filter: Option<(String, String)>,
}

impl GdalRoiSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            layer: None,
            filter: None,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    fn region_name(&self) -> String {
        match &self.filter {
            Some((_, value)) => value.clone(),
            None => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "roi".to_string()),
        }
    }
}

impl RoiSource for GdalRoiSource {
    fn region(&self) -> SnowResult<RegionOfInterest> {
        log::info!("Reading glacier outline from {}", self.path.display());

        let dataset = Dataset::open(&self.path).map_err(|e| SnowError::UnreachableSource {
            source_name: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut layer = match &self.layer {
            Some(name) => dataset.layer_by_name(name)?,
            None => dataset.layer(0)?,
        };

        let mut polygons = Vec::new();
        let mut matched = 0usize;
        for feature in layer.features() {
            if let Some((field, value)) = &self.filter {
                if feature.field_as_string_by_name(field)?.as_deref() != Some(value.as_str()) {
                    continue;
                }
            }
            matched += 1;
            polygons.extend(polygons_of(feature.geometry_by_index(0)?)?);
        }

        if polygons.is_empty() {
            return Err(SnowError::InvalidInput(format!(
                "No polygon features in {}{}",
                self.path.display(),
                match &self.filter {
                    Some((f, v)) => format!(" with {} == {}", f, v),
                    None => String::new(),
                }
            )));
        }

        log::debug!("{} features, {} polygons in ROI", matched, polygons.len());
        Ok(RegionOfInterest::new(self.region_name(), MultiPolygon::new(polygons)))
    }
}

/// Region from WKT in the imagery CRS
pub fn region_from_wkt(name: &str, wkt: &str) -> SnowResult<RegionOfInterest> {
    let geometry = Geometry::from_wkt(wkt)?;
    let polygons = polygons_of(&geometry)?;
    if polygons.is_empty() {
        return Err(SnowError::InvalidInput(format!("WKT for '{}' holds no polygon", name)));
    }
    Ok(RegionOfInterest::new(name, MultiPolygon::new(polygons)))
}

fn polygons_of(geometry: &Geometry) -> SnowResult<Vec<Polygon<f64>>> {
    flatten(geometry.to_geo()?)
}

fn flatten(geometry: geo::Geometry<f64>) -> SnowResult<Vec<Polygon<f64>>> {
    match geometry {
        geo::Geometry::Polygon(p) => Ok(vec![p]),
        geo::Geometry::MultiPolygon(mp) => Ok(mp.0),
        geo::Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc.0 {
                polygons.extend(flatten(g)?);
            }
            Ok(polygons)
        }
        other => Err(SnowError::InvalidInput(format!(
            "Glacier outline must be polygonal, found {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_wkt() {
        let roi = region_from_wkt("box", "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap();
        assert_eq!(roi.name, "box");
        assert_eq!(roi.geometry.0.len(), 1);
    }

    #[test]
    fn test_multipolygon_wkt() {
        let roi = region_from_wkt(
            "pair",
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
        )
        .unwrap();
        assert_eq!(roi.geometry.0.len(), 2);
    }

    #[test]
    fn test_non_polygon_rejected() {
        assert!(region_from_wkt("line", "LINESTRING (0 0, 1 1)").is_err());
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let result = GdalRoiSource::new("/nonexistent/glims.shp").region();
        assert!(matches!(result, Err(SnowError::UnreachableSource { .. })));
    }
}

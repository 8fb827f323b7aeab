use crate::types::{SnowError, SnowResult, SunAngles};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// Landsat Collection 2 `*_MTL.xml` structures
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MtlRoot {
    pub product_contents: Option<ProductContents>,
    pub image_attributes: ImageAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProductContents {
    pub landsat_product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ImageAttributes {
    pub spacecraft_id: Option<String>,
    pub date_acquired: String,
    pub scene_center_time: Option<String>,
    pub cloud_cover: Option<f64>,
    pub sun_azimuth: f64,
    pub sun_elevation: f64,
}

/// Acquisition metadata of one Landsat scene
#[derive(Debug, Clone, PartialEq)]
pub struct LandsatMetadata {
    pub product_id: Option<String>,
    pub spacecraft: Option<String>,
    pub acquired: DateTime<Utc>,
    pub sun: SunAngles,
    pub cloud_cover: Option<f64>,
}

impl LandsatMetadata {
    pub fn from_file<P: AsRef<Path>>(path: P) -> SnowResult<Self> {
        log::debug!("Reading scene metadata {}", path.as_ref().display());
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Parse MTL XML content
    pub fn parse(xml: &str) -> SnowResult<Self> {
        let root: MtlRoot = from_str(xml)?;
        let attrs = root.image_attributes;

        let date = NaiveDate::parse_from_str(attrs.date_acquired.trim(), "%Y-%m-%d")?;
        let time = match attrs.scene_center_time.as_deref() {
            Some(t) => Self::parse_center_time(t)?,
            None => NaiveTime::MIN,
        };

        Ok(Self {
            product_id: root.product_contents.and_then(|p| p.landsat_product_id),
            spacecraft: attrs.spacecraft_id,
            acquired: Utc.from_utc_datetime(&date.and_time(time)),
            sun: SunAngles::new(attrs.sun_azimuth, attrs.sun_elevation),
            cloud_cover: attrs.cloud_cover,
        })
    }

    /// `10:12:34.1234560Z`, optionally quoted
    fn parse_center_time(raw: &str) -> SnowResult<NaiveTime> {
        let trimmed = raw.trim().trim_matches('"').trim_end_matches('Z');
        Ok(NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")?)
    }
}

/// Landsat Collection product identifier, e.g.
/// `LC08_L2SP_195012_20200811_20200918_02_T1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub id: String,
    pub sensor: String,
    pub level: String,
    pub path: u16,
    pub row: u16,
    pub acquired: NaiveDate,
    pub processed: NaiveDate,
    pub collection: u8,
    pub tier: String,
}

impl ProductId {
    const PATTERN: &'static str =
        r"(L[COTEM]0[4-9])_(L[12][A-Z0-9]{2})_(\d{3})(\d{3})_(\d{8})_(\d{8})_(\d{2})_(T1|T2|RT)";

    /// Find a product identifier anywhere in `text` (typically a file name)
    pub fn find(text: &str) -> SnowResult<Option<Self>> {
        let regex = regex::Regex::new(Self::PATTERN)
            .map_err(|e| SnowError::InvalidInput(format!("Bad product id pattern: {}", e)))?;

        let captures = match regex.captures(text) {
            Some(c) => c,
            None => return Ok(None),
        };
        let group = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();
        let number = |i: usize| {
            group(i)
                .parse::<u16>()
                .map_err(|e| SnowError::InvalidInput(format!("Bad product id field '{}': {}", group(i), e)))
        };

        Ok(Some(Self {
            id: group(0).to_string(),
            sensor: group(1).to_string(),
            level: group(2).to_string(),
            path: number(3)?,
            row: number(4)?,
            acquired: NaiveDate::parse_from_str(group(5), "%Y%m%d")?,
            processed: NaiveDate::parse_from_str(group(6), "%Y%m%d")?,
            collection: number(7)? as u8,
            tier: group(8).to_string(),
        }))
    }

    /// Acquisition date at midnight UTC
    pub fn acquired_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.acquired.and_time(NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const MTL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<LANDSAT_METADATA_FILE>
  <PRODUCT_CONTENTS>
    <ORIGIN>Image courtesy of the U.S. Geological Survey</ORIGIN>
    <LANDSAT_PRODUCT_ID>LC08_L2SP_195012_20200811_20200918_02_T1</LANDSAT_PRODUCT_ID>
    <PROCESSING_LEVEL>L2SP</PROCESSING_LEVEL>
  </PRODUCT_CONTENTS>
  <IMAGE_ATTRIBUTES>
    <SPACECRAFT_ID>LANDSAT_8</SPACECRAFT_ID>
    <SENSOR_ID>OLI_TIRS</SENSOR_ID>
    <DATE_ACQUIRED>2020-08-11</DATE_ACQUIRED>
    <SCENE_CENTER_TIME>10:12:34.1234560Z</SCENE_CENTER_TIME>
    <CLOUD_COVER>12.34</CLOUD_COVER>
    <SUN_AZIMUTH>174.52398432</SUN_AZIMUTH>
    <SUN_ELEVATION>35.21703944</SUN_ELEVATION>
    <EARTH_SUN_DISTANCE>1.0136517</EARTH_SUN_DISTANCE>
  </IMAGE_ATTRIBUTES>
</LANDSAT_METADATA_FILE>"#;

    #[test]
    fn test_parse_mtl() {
        let meta = LandsatMetadata::parse(MTL).unwrap();

        assert_eq!(meta.product_id.as_deref(), Some("LC08_L2SP_195012_20200811_20200918_02_T1"));
        assert_eq!(meta.spacecraft.as_deref(), Some("LANDSAT_8"));
        assert_eq!(meta.acquired.date_naive(), NaiveDate::from_ymd_opt(2020, 8, 11).unwrap());
        assert_eq!(meta.acquired.hour(), 10);
        assert_eq!(meta.acquired.minute(), 12);
        assert!((meta.sun.azimuth_deg - 174.52398432).abs() < 1e-9);
        assert!((meta.sun.elevation_deg - 35.21703944).abs() < 1e-9);
        assert_eq!(meta.cloud_cover, Some(12.34));
    }

    #[test]
    fn test_mtl_missing_sun_is_error() {
        let xml = "<LANDSAT_METADATA_FILE><IMAGE_ATTRIBUTES><DATE_ACQUIRED>2020-08-11</DATE_ACQUIRED>\
                   </IMAGE_ATTRIBUTES></LANDSAT_METADATA_FILE>";
        assert!(LandsatMetadata::parse(xml).is_err());
    }

    #[test]
    fn test_product_id_from_file_name() {
        let id = ProductId::find("LC08_L2SP_195012_20200811_20200918_02_T1_SR_B5.TIF")
            .unwrap()
            .unwrap();

        assert_eq!(id.sensor, "LC08");
        assert_eq!(id.level, "L2SP");
        assert_eq!((id.path, id.row), (195, 12));
        assert_eq!(id.acquired.year(), 2020);
        assert_eq!(id.acquired.ordinal(), 224);
        assert_eq!(id.collection, 2);
        assert_eq!(id.tier, "T1");
        assert_eq!(id.acquired_utc().to_rfc3339(), "2020-08-11T00:00:00+00:00");
    }

    #[test]
    fn test_product_id_absent() {
        assert_eq!(ProductId::find("dem_10m.tif").unwrap(), None);
    }
}

use crate::core::composite::CompositeMode;
use crate::core::pipeline::{AarReport, WindowOutcome};
use crate::types::{Raster, SnowResult};
use gdal::raster::Buffer;
use gdal::DriverManager;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes report tables and snow masks into one output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    write_masks: bool,
}

impl ReportWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_masks: true,
        }
    }

    pub fn with_masks(mut self, write_masks: bool) -> Self {
        self.write_masks = write_masks;
        self
    }

    /// Write every output and return the paths written
    pub fn write_all(&self, report: &AarReport) -> SnowResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;

        let mut written = vec![
            self.write_acquisition_dates(report)?,
            self.write_aar_table(report)?,
            self.write_json(report)?,
        ];

        if self.write_masks {
            for result in &report.windows {
                if let Some(mask) = &result.mask {
                    let label = match (report.composite_mode, result.scene_ids.first()) {
                        (CompositeMode::PerScene, Some(id)) => id.clone(),
                        _ => result.window.start.format("%Y-%m-%d").to_string(),
                    };
                    let path = self.dir.join(format!("snowmap_{}.tif", label));
                    write_mask_geotiff(mask, &path)?;
                    written.push(path);
                }
            }
        }

        log::info!("Wrote {} files to {}", written.len(), self.dir.display());
        Ok(written)
    }

    /// `acquisition_dates.csv`: one acquisition timestamp per line
    pub fn write_acquisition_dates(&self, report: &AarReport) -> SnowResult<PathBuf> {
        let path = self.dir.join("acquisition_dates.csv");
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "acquired")?;
        for t in &report.acquisition_dates {
            writeln!(out, "{}", t.to_rfc3339())?;
        }
        out.flush()?;
        Ok(path)
    }

    /// `aar.csv`: threshold, snow count and AAR per window; empty cells for skipped windows
    pub fn write_aar_table(&self, report: &AarReport) -> SnowResult<PathBuf> {
        let path = self.dir.join("aar.csv");
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(
            out,
            "window_start,window_end,scenes,threshold,snow_pixels,roi_pixels,snow_area,aar,status"
        )?;

        for result in &report.windows {
            let start = result.window.start.format("%Y-%m-%d");
            let end = result.window.end.format("%Y-%m-%d");
            let scenes = result.scene_ids.len();
            match &result.outcome {
                WindowOutcome::Mapped {
                    threshold,
                    snow_pixels,
                    snow_area,
                    aar,
                } => writeln!(
                    out,
                    "{},{},{},{:.6},{},{},{:.1},{},mapped",
                    start,
                    end,
                    scenes,
                    threshold,
                    snow_pixels,
                    report.roi_pixel_count,
                    snow_area,
                    aar.map(|a| format!("{:.6}", a)).unwrap_or_default()
                )?,
                WindowOutcome::Skipped { .. } => writeln!(
                    out,
                    "{},{},{},,,{},,,skipped",
                    start, end, scenes, report.roi_pixel_count
                )?,
            }
        }
        out.flush()?;
        Ok(path)
    }

    /// `report.json`: the full report including skip reasons
    pub fn write_json(&self, report: &AarReport) -> SnowResult<PathBuf> {
        let path = self.dir.join("report.json");
        let out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(out, report)?;
        Ok(path)
    }
}

/// Save a snow mask as a single-band u8 GeoTIFF: 1 = snow, 0 = no data
pub fn write_mask_geotiff<P: AsRef<Path>>(mask: &Raster, output_path: P) -> SnowResult<()> {
    log::debug!("Saving snow mask as GeoTIFF: {}", output_path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = mask.dim();
    let grid = mask.grid();

    let mut dataset = driver.create_with_band_type::<u8, _>(output_path.as_ref(), width as isize, height as isize, 1)?;
    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<u8> = mask.valid().iter().map(|&v| v as u8).collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(0.0))?;

    Ok(())
}

use crate::maybe_rayon::*;
use crate::types::{Grid, Raster, RasterStack, SnowError, SnowResult, SunAngles};
use chrono::{DateTime, Duration, Months, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar period used for window length and step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl Period {
    fn is_zero(&self) -> bool {
        matches!(self, Period::Days(0) | Period::Months(0) | Period::Years(0))
    }

    /// `start` advanced by `times` whole periods
    pub fn advance(&self, start: DateTime<Utc>, times: u32) -> Option<DateTime<Utc>> {
        match *self {
            Period::Days(n) => start.checked_add_signed(Duration::days(n as i64 * times as i64)),
            Period::Months(n) => start.checked_add_months(Months::new(n.checked_mul(times)?)),
            Period::Years(n) => start.checked_add_months(Months::new(n.checked_mul(times)?.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Days(n) => write!(f, "{} day(s)", n),
            Period::Months(n) => write!(f, "{} month(s)", n),
            Period::Years(n) => write!(f, "{} year(s)", n),
        }
    }
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Zero-length window dated at a single acquisition
    pub fn instant(t: DateTime<Utc>) -> Self {
        Self { start: t, end: t }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// How scenes are grouped before snow mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Minimum composite per calendar window
    #[default]
    Windowed,
    /// Every scene is mapped on its own
    PerScene,
}

/// Regular sequence of composite windows
///
/// Window `i` covers `[start + i*step, start + i*step + length)`; windows are
/// generated while their end does not pass `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWindows {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub length: Period,
    pub step: Period,
}

impl CompositeWindows {
    /// One-year windows stepped yearly
    pub fn yearly(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            length: Period::Years(1),
            step: Period::Years(1),
        }
    }

    pub fn windows(&self) -> SnowResult<Vec<TimeWindow>> {
        if self.length.is_zero() || self.step.is_zero() {
            return Err(SnowError::Config(format!(
                "Window length ({}) and step ({}) must be positive",
                self.length, self.step
            )));
        }
        if self.start >= self.end {
            return Err(SnowError::Config(format!(
                "Window range start {} is not before end {}",
                self.start, self.end
            )));
        }

        let mut windows = Vec::new();
        for i in 0.. {
            let window_start = match self.step.advance(self.start, i) {
                Some(t) => t,
                None => break,
            };
            let window_end = match self.length.advance(window_start, 1) {
                Some(t) if t <= self.end => t,
                _ => break,
            };
            windows.push(TimeWindow::new(window_start, window_end));
        }

        if windows.is_empty() {
            return Err(SnowError::Config(format!(
                "A window of {} does not fit between {} and {}",
                self.length, self.start, self.end
            )));
        }
        Ok(windows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeWarning {
    /// No scene fell inside the window; the raster is an all-invalid placeholder
    EmptyWindow,
}

/// Minimum composite of one window
#[derive(Debug, Clone)]
pub struct Composite {
    pub window: TimeWindow,
    pub raster: Raster,
    /// Contributing scenes, in acquisition order
    pub scene_ids: Vec<String>,
    /// Sun angles of the first contributing scene
    pub sun: Option<SunAngles>,
    pub warning: Option<CompositeWarning>,
}

impl Composite {
    pub fn is_empty(&self) -> bool {
        self.warning == Some(CompositeWarning::EmptyWindow)
    }
}

/// Per-pixel minimum compositor
#[derive(Debug, Clone, Default)]
pub struct TemporalCompositor;

impl TemporalCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Composite every window of `windows`, windows in parallel.
    ///
    /// The output has one entry per window in the same order; empty windows
    /// yield a placeholder carrying `CompositeWarning::EmptyWindow`.
    pub fn composite(&self, stack: &RasterStack, windows: &[TimeWindow]) -> SnowResult<Vec<Composite>> {
        log::info!("Compositing {} scenes into {} windows", stack.len(), windows.len());

        let composites: Vec<Composite> = windows
            .par_iter()
            .map(|window| self.composite_window(stack, window))
            .collect::<SnowResult<Vec<_>>>()?;

        let empty = composites.iter().filter(|c| c.is_empty()).count();
        if empty > 0 {
            log::warn!("{} of {} composite windows contain no scenes", empty, composites.len());
        }
        Ok(composites)
    }

    /// Minimum composite of the scenes inside a single window
    pub fn composite_window(&self, stack: &RasterStack, window: &TimeWindow) -> SnowResult<Composite> {
        let members: Vec<_> = stack.scenes().iter().filter(|s| window.contains(s.acquired)).collect();

        if members.is_empty() {
            log::warn!("{}", SnowError::EmptyCompositeWindow { window: window.to_string() });
            return Ok(Composite {
                window: *window,
                raster: Raster::invalid(stack.grid()),
                scene_ids: Vec::new(),
                sun: None,
                warning: Some(CompositeWarning::EmptyWindow),
            });
        }

        let rasters: Vec<&Raster> = members.iter().map(|s| &s.raster).collect();
        let raster = Self::minimum(&rasters, stack.grid())?;
        log::debug!(
            "Window {}: {} scenes, {} valid pixels",
            window,
            members.len(),
            raster.valid_count()
        );

        Ok(Composite {
            window: *window,
            raster,
            scene_ids: members.iter().map(|s| s.id.clone()).collect(),
            sun: members[0].sun,
            warning: None,
        })
    }

    /// One composite per scene, in acquisition order
    ///
    /// Each entry carries the scene raster unchanged, its id and sun angles,
    /// and an instant window at the acquisition time.
    pub fn per_scene(&self, stack: &RasterStack) -> Vec<Composite> {
        log::info!("Mapping {} scenes individually", stack.len());
        stack
            .scenes()
            .iter()
            .map(|scene| Composite {
                window: TimeWindow::instant(scene.acquired),
                raster: scene.raster.clone(),
                scene_ids: vec![scene.id.clone()],
                sun: scene.sun,
                warning: None,
            })
            .collect()
    }

    /// Per-pixel minimum over the valid samples of `rasters`
    ///
    /// A pixel is valid iff at least one input is valid there.
    pub fn minimum(rasters: &[&Raster], grid: &Grid) -> SnowResult<Raster> {
        let mut data = Array2::from_elem(grid.shape(), f32::NAN);
        let mut valid = Array2::from_elem(grid.shape(), false);

        for raster in rasters {
            grid.ensure_aligned(raster.grid(), "composite input")?;
            Zip::from(&mut data)
                .and(&mut valid)
                .and(raster.data())
                .and(raster.valid())
                .for_each(|acc, acc_ok, &v, &ok| {
                    if ok && (!*acc_ok || v < *acc) {
                        *acc = v;
                        *acc_ok = true;
                    }
                });
        }

        Raster::new(data, valid, grid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scene;
    use ndarray::array;

    fn date(s: &str) -> DateTime<Utc> {
        format!("{}T00:00:00Z", s).parse().unwrap()
    }

    fn scene(id: &str, day: &str, data: Array2<f32>) -> Scene {
        Scene::new(id, date(day), Raster::from_array(data))
    }

    #[test]
    fn test_yearly_windows() {
        let windows = CompositeWindows::yearly(date("2013-01-01"), date("2021-01-01"))
            .windows()
            .unwrap();

        assert_eq!(windows.len(), 8);
        assert_eq!(windows[0], TimeWindow::new(date("2013-01-01"), date("2014-01-01")));
        assert_eq!(windows[7], TimeWindow::new(date("2020-01-01"), date("2021-01-01")));
    }

    #[test]
    fn test_overlapping_windows() {
        let windows = CompositeWindows {
            start: date("2020-01-01"),
            end: date("2020-12-31"),
            length: Period::Months(3),
            step: Period::Months(2),
        }
        .windows()
        .unwrap();

        // starts Jan, Mar, May, Jul, Sep; a November window would end in February
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[1].start, date("2020-03-01"));
        assert_eq!(windows[1].end, date("2020-06-01"));
    }

    #[test]
    fn test_bad_window_config() {
        let zero = CompositeWindows {
            start: date("2020-01-01"),
            end: date("2021-01-01"),
            length: Period::Days(0),
            step: Period::Days(10),
        };
        assert!(matches!(zero.windows(), Err(SnowError::Config(_))));

        let too_long = CompositeWindows::yearly(date("2020-01-01"), date("2020-06-01"));
        assert!(too_long.windows().is_err());
    }

    #[test]
    fn test_window_is_half_open() {
        let w = TimeWindow::new(date("2020-01-01"), date("2021-01-01"));
        assert!(w.contains(date("2020-01-01")));
        assert!(w.contains(date("2020-12-31")));
        assert!(!w.contains(date("2021-01-01")));
    }

    #[test]
    fn test_minimum_with_mixed_validity() {
        let stack = RasterStack::from_scenes(vec![
            scene("a", "2020-07-01", array![[0.2_f32, 0.7], [f32::NAN, f32::NAN]]),
            scene("b", "2020-08-01", array![[0.5_f32, 0.3], [0.9, f32::NAN]]),
            scene("c", "2020-09-01", array![[f32::NAN, 0.4], [f32::NAN, f32::NAN]]),
        ])
        .unwrap();
        let window = TimeWindow::new(date("2020-01-01"), date("2021-01-01"));

        let composite = TemporalCompositor::new().composite_window(&stack, &window).unwrap();

        assert_eq!(composite.raster.get(0, 0), Some(0.2));
        assert_eq!(composite.raster.get(0, 1), Some(0.3));
        assert_eq!(composite.raster.get(1, 0), Some(0.9));
        assert_eq!(composite.raster.get(1, 1), None);
        assert_eq!(composite.scene_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_scene_is_identity() {
        let data = array![[0.1_f32, f32::NAN, 0.6], [0.8, 0.25, 1.2]];
        let stack = RasterStack::from_scenes(vec![scene("only", "2019-08-15", data)]).unwrap();
        let window = TimeWindow::new(date("2019-01-01"), date("2020-01-01"));

        let composite = TemporalCompositor::new().composite_window(&stack, &window).unwrap();
        assert_eq!(composite.raster, stack.scenes()[0].raster);
    }

    #[test]
    fn test_empty_window_placeholder() {
        let stack = RasterStack::from_scenes(vec![
            scene("a", "2018-07-01", array![[0.3_f32, 0.4]]),
            scene("b", "2020-07-01", array![[0.5_f32, 0.1]]),
        ])
        .unwrap();
        let windows = CompositeWindows::yearly(date("2018-01-01"), date("2021-01-01"))
            .windows()
            .unwrap();

        let composites = TemporalCompositor::new().composite(&stack, &windows).unwrap();

        assert_eq!(composites.len(), 3);
        assert!(!composites[0].is_empty());
        assert!(composites[1].is_empty());
        assert_eq!(composites[1].raster.valid_count(), 0);
        assert_eq!(composites[1].raster.dim(), (1, 2));
        assert_eq!(composites[2].raster.get(0, 1), Some(0.1));
    }

    #[test]
    fn test_window_sun_from_first_scene() {
        let first = scene("a", "2020-07-01", array![[0.3_f32]]).with_sun(SunAngles::new(150.0, 40.0));
        let second = scene("b", "2020-08-01", array![[0.2_f32]]).with_sun(SunAngles::new(160.0, 35.0));
        let stack = RasterStack::from_scenes(vec![second, first]).unwrap();
        let window = TimeWindow::new(date("2020-01-01"), date("2021-01-01"));

        let composite = TemporalCompositor::new().composite_window(&stack, &window).unwrap();
        assert_eq!(composite.sun, Some(SunAngles::new(150.0, 40.0)));
    }

    #[test]
    fn test_per_scene_keeps_same_day_scenes_apart() {
        let a = scene("a", "2020-07-01", array![[0.3_f32, f32::NAN]]).with_sun(SunAngles::new(150.0, 40.0));
        let b = scene("b", "2020-07-01", array![[0.2_f32, 0.5]]);
        let c = scene("c", "2020-06-15", array![[0.9_f32, 0.1]]);
        let stack = RasterStack::from_scenes(vec![a, b, c]).unwrap();

        let composites = TemporalCompositor::new().per_scene(&stack);

        assert_eq!(composites.len(), 3);
        assert_eq!(composites[0].scene_ids, vec!["c".to_string()]);
        assert_eq!(composites[0].window, TimeWindow::instant(date("2020-06-15")));
        let a = composites.iter().find(|c| c.scene_ids[0] == "a").unwrap();
        assert_eq!(a.raster, stack.scenes()[1].raster);
        assert_eq!(a.sun, Some(SunAngles::new(150.0, 40.0)));
        assert!(composites.iter().all(|c| !c.is_empty()));
    }
}

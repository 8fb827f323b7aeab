use chrono::{DateTime, Utc};
use ndarray::{array, Array2};
use snowline::core::{CompositeWindows, Period, TemporalCompositor, TimeWindow};
use snowline::{Grid, Raster, RasterStack, Scene, SnowError};

fn date(s: &str) -> DateTime<Utc> {
    format!("{}T10:30:00Z", s).parse().unwrap()
}

fn scene(id: &str, day: &str, data: Array2<f32>) -> Scene {
    Scene::new(id, date(day), Raster::from_array(data))
}

#[test]
fn test_pixel_minimum_ignores_invalid_samples() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stack = RasterStack::from_scenes(vec![
        scene("s1", "2016-07-10", array![[0.2_f32]]),
        scene("s2", "2016-08-11", array![[0.5_f32]]),
        scene("s3", "2016-09-12", array![[f32::NAN]]),
    ])
    .unwrap();
    let windows = CompositeWindows::yearly(date("2016-01-01"), date("2017-01-01"))
        .windows()
        .unwrap();

    let composites = TemporalCompositor::new().composite(&stack, &windows).unwrap();

    assert_eq!(composites.len(), 1);
    assert_eq!(composites[0].raster.get(0, 0), Some(0.2));
    assert_eq!(composites[0].scene_ids.len(), 3);
}

#[test]
fn test_minimum_law_over_many_scenes() {
    let (rows, cols) = (12, 9);
    let scenes: Vec<Scene> = (0..6)
        .map(|k| {
            let data = Array2::from_shape_fn((rows, cols), |(r, c)| {
                if (r + c + k) % 5 == 0 {
                    f32::NAN
                } else {
                    ((r * 7 + c * 3 + k * 11) % 23) as f32 / 23.0
                }
            });
            scene(&format!("s{}", k), &format!("2018-0{}-15", k + 3), data)
        })
        .collect();
    let stack = RasterStack::from_scenes(scenes).unwrap();
    let window = TimeWindow::new(date("2018-01-01"), date("2019-01-01"));

    let composite = TemporalCompositor::new().composite_window(&stack, &window).unwrap();

    for r in 0..rows {
        for c in 0..cols {
            let expected = stack
                .scenes()
                .iter()
                .filter_map(|s| s.raster.get(r, c))
                .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.min(v))));
            assert_eq!(composite.raster.get(r, c), expected, "pixel ({}, {})", r, c);
        }
    }
}

#[test]
fn test_windows_keep_order_and_mark_gaps() {
    let stack = RasterStack::from_scenes(vec![
        scene("a", "2014-08-01", array![[0.3_f32, 0.6]]),
        scene("b", "2016-08-01", array![[0.4_f32, 0.2]]),
        scene("c", "2016-09-01", array![[0.1_f32, f32::NAN]]),
    ])
    .unwrap();
    let windows = CompositeWindows::yearly(date("2013-01-01"), date("2017-01-01"))
        .windows()
        .unwrap();

    let composites = TemporalCompositor::new().composite(&stack, &windows).unwrap();

    let empties: Vec<bool> = composites.iter().map(|c| c.is_empty()).collect();
    assert_eq!(empties, vec![true, false, true, false]);
    assert_eq!(composites[3].raster.get(0, 0), Some(0.1));
    assert_eq!(composites[3].raster.get(0, 1), Some(0.2));
    assert!(composites.iter().all(|c| c.raster.dim() == (1, 2)));
}

#[test]
fn test_multi_year_windows() {
    let windows = CompositeWindows {
        start: date("2013-01-01"),
        end: date("2021-01-01"),
        length: Period::Years(3),
        step: Period::Years(2),
    }
    .windows()
    .unwrap();

    // 2013-16, 2015-18, 2017-20
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[2].end, date("2020-01-01"));
}

#[test]
fn test_scenes_on_different_grids_rejected() {
    let a = Scene::new("a", date("2019-08-01"), Raster::from_array(Array2::zeros((4, 4))));
    let b = Scene::new(
        "b",
        date("2019-08-02"),
        Raster::from_data(Array2::zeros((4, 5)), Grid::pixel_grid(4, 5)).unwrap(),
    );

    let result = RasterStack::from_scenes(vec![a, b]);
    assert!(matches!(result, Err(SnowError::GridMismatch { .. })));
}

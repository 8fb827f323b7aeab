//! Python bindings (`python` feature)

use crate::core::area::AreaAggregator;
use crate::core::calibrate::RadiometricCorrector;
use crate::core::composite::TemporalCompositor;
use crate::core::histogram::{Histogram, HistogramParams};
use crate::core::otsu::OtsuThresholder;
use crate::core::roi::RoiMask;
use crate::core::snow_map::{SnowMapOutcome, SnowMapParams, SnowMapper};
use crate::types::{Raster, SnowError};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Convert PyReadonlyArray2 to ndarray Array2
fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
where
    T: Copy + numpy::Element,
{
    arr.as_array().to_owned()
}

fn to_py_err(e: SnowError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Otsu threshold of a bucketed histogram; None when degenerate
#[pyfunction]
fn otsu_threshold(counts: Vec<u64>, means: Vec<f64>) -> PyResult<Option<f64>> {
    let histogram = Histogram::from_parts(counts, means).map_err(to_py_err)?;
    match OtsuThresholder::new().threshold(&histogram) {
        Ok(t) => Ok(Some(t)),
        Err(SnowError::DegenerateHistogram { .. }) => Ok(None),
        Err(e) => Err(to_py_err(e)),
    }
}

/// DN to reflectance; NaN marks invalid pixels
#[pyfunction]
fn radiometric_correction(py: Python, data: PyReadonlyArray2<f32>) -> PyResult<PyObject> {
    let raster = Raster::from_array(numpy_to_array2(data));
    let corrected = RadiometricCorrector::landsat_c2().correct(&raster);
    Ok(corrected.data().to_pyarray(py).into())
}

/// Per-pixel minimum over images of equal shape; NaN marks invalid pixels
#[pyfunction]
fn minimum_composite(py: Python, images: Vec<PyReadonlyArray2<f32>>) -> PyResult<PyObject> {
    let rasters: Vec<Raster> = images
        .into_iter()
        .map(|a| Raster::from_array(numpy_to_array2(a)))
        .collect();
    let first = rasters
        .first()
        .ok_or_else(|| PyValueError::new_err("minimum_composite needs at least one image"))?;
    let grid = first.grid().clone();

    let refs: Vec<&Raster> = rasters.iter().collect();
    let composite = TemporalCompositor::minimum(&refs, &grid).map_err(to_py_err)?;
    Ok(composite.data().to_pyarray(py).into())
}

/// Otsu snow map of one reflectance image inside an optional region
#[pyfunction]
#[pyo3(signature = (image, roi=None, buckets=256))]
fn snow_map(
    py: Python,
    image: PyReadonlyArray2<f32>,
    roi: Option<PyReadonlyArray2<bool>>,
    buckets: usize,
) -> PyResult<PyObject> {
    let raster = Raster::from_array(numpy_to_array2(image));
    let roi = match roi {
        Some(mask) => RoiMask::new(numpy_to_array2(mask), raster.grid().clone()).map_err(to_py_err)?,
        None => RoiMask::full(raster.grid()),
    };

    let mapper = SnowMapper::new(SnowMapParams {
        histogram: HistogramParams { buckets },
        ..SnowMapParams::default()
    });

    let result = PyDict::new(py);
    match mapper.map(&raster, &roi).map_err(to_py_err)? {
        SnowMapOutcome::Mapped(map) => {
            let count = AreaAggregator::new().count(&map.mask, &roi).map_err(to_py_err)?;
            result.set_item("mask", map.mask.valid().to_pyarray(py))?;
            result.set_item("threshold", map.threshold)?;
            result.set_item("snow_pixels", count)?;
        }
        SnowMapOutcome::Unmapped { reason } => {
            result.set_item("mask", py.None())?;
            result.set_item("threshold", py.None())?;
            result.set_item("reason", reason)?;
        }
    }
    result.set_item("roi_pixels", roi.pixel_count())?;

    Ok(result.into())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(otsu_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(radiometric_correction, m)?)?;
    m.add_function(wrap_pyfunction!(minimum_composite, m)?)?;
    m.add_function(wrap_pyfunction!(snow_map, m)?)?;
    Ok(())
}

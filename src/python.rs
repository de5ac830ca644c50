//! Python bindings (feature `python`)

use crate::core::GranuleProcessor;
use crate::encoder::QuadtreeEncoder;
use crate::io::{
    inspect_sidecar, BinarySidecarStore, MemorySwathReader, ProductProfile, SidecarStore,
};
use crate::types::{CoverLevelPolicy, GeoError, PerimeterSource, SidecarConfig};
use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::Path;

fn to_py_err(err: GeoError) -> PyErr {
    match err {
        GeoError::Io(e) => PyIOError::new_err(e.to_string()),
        GeoError::NotFound(msg) => PyKeyError::new_err(msg),
        e @ (GeoError::InvalidConfig(_) | GeoError::InvalidGrid(_) | GeoError::InvalidPlan(_)) => {
            PyValueError::new_err(e.to_string())
        }
        e => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Convert PyReadonlyArray2 to ndarray Array2
fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
where
    T: Copy + numpy::Element,
{
    arr.as_array().to_owned()
}

/// Build and write a sidecar from decoded geolocation arrays.
///
/// The product plan is detected from `granule` when given; otherwise the
/// arrays are treated as a single generic grid.
#[pyfunction]
#[pyo3(signature = (
    latitude,
    longitude,
    output,
    granule = None,
    cover_level = "auto",
    perimeter = "strided-walk",
    archive_metadata = None,
    threads = None
))]
#[allow(clippy::too_many_arguments)]
fn build_sidecar(
    py: Python,
    latitude: PyReadonlyArray2<f64>,
    longitude: PyReadonlyArray2<f64>,
    output: String,
    granule: Option<String>,
    cover_level: &str,
    perimeter: &str,
    archive_metadata: Option<String>,
    threads: Option<usize>,
) -> PyResult<PyObject> {
    let latitude = numpy_to_array2(latitude);
    let longitude = numpy_to_array2(longitude);

    let config = SidecarConfig {
        cover_level: cover_level.parse::<CoverLevelPolicy>().map_err(to_py_err)?,
        perimeter_source: perimeter.parse::<PerimeterSource>().map_err(to_py_err)?,
        worker_threads: threads,
        ..Default::default()
    };

    let mut reader = match &granule {
        Some(path) => MemorySwathReader::for_granule(path, latitude, longitude),
        None => MemorySwathReader::new("granule", ProductProfile::generic(), latitude, longitude),
    }
    .map_err(to_py_err)?;
    if let Some(text) = archive_metadata {
        reader = reader.with_archive_metadata(text);
    }

    let encoder = QuadtreeEncoder::new();
    let processor = GranuleProcessor::new(&encoder, config).map_err(to_py_err)?;
    let outcome = processor.process(&reader).map_err(to_py_err)?;
    if let Some(e) = outcome.cover_failure {
        if e.is_recoverable() {
            return Err(PyRuntimeError::new_err(format!(
                "{}; retry with perimeter=\"strided-walk\"",
                e
            )));
        }
        return Err(to_py_err(e));
    }

    BinarySidecarStore::new()
        .write(&outcome.dataset, Path::new(&output))
        .map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("path", &output)?;
    result.set_item(
        "resolution_sets",
        outcome
            .dataset
            .resolution_sets()
            .iter()
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>(),
    )?;
    if let Some(cover) = outcome.dataset.cover_sets().first() {
        result.set_item("cover_level", cover.resolution_level)?;
        result.set_item("cover_cells", cover.len())?;
    }
    result.set_item(
        "failures",
        outcome
            .resolution_failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>(),
    )?;
    Ok(result.into())
}

/// Index values geolocating `variable` in a sidecar
#[pyfunction]
fn read_sidecar_indices<'py>(
    py: Python<'py>,
    path: &str,
    variable: &str,
) -> PyResult<&'py PyArray2<u64>> {
    let dataset = BinarySidecarStore::new()
        .read(Path::new(path))
        .map_err(to_py_err)?;
    let indices = dataset.indices_for_variable(variable).map_err(to_py_err)?;
    Ok(indices.to_pyarray(py))
}

/// Human-readable listing of a sidecar's contents
#[pyfunction]
fn describe_sidecar(path: &str) -> PyResult<String> {
    inspect_sidecar(path).map(|s| s.to_string()).map_err(to_py_err)
}

/// Python module definition
#[pymodule]
fn geosidecar(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(build_sidecar, m)?)?;
    m.add_function(wrap_pyfunction!(read_sidecar_indices, m)?)?;
    m.add_function(wrap_pyfunction!(describe_sidecar, m)?)?;
    Ok(())
}

//! Interface between Rust and Python.
//!
//! The real work happens in [`crate::rtm`]; this module only converts numpy
//! arrays into its inputs and results back into numpy arrays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use numpy::prelude::*;
use numpy::{PyArray2, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::ForwardError;
use crate::rtm::{
    AbsorberId, AtmosphericProfile, ChannelCoefficients, ForwardModel, ForwardOptions,
    ForwardProgress, RadianceResult, ReferencePhysics, SensorCatalog, SensorKind, SurfaceState,
    ViewGeometry,
};

/// How often the main thread checks for Python signals.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How often progress is logged.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

impl From<ForwardError> for PyErr {
    fn from(e: ForwardError) -> Self {
        match e {
            ForwardError::Validation(_) => PyValueError::new_err(e.to_string()),
            ForwardError::Stage { .. } | ForwardError::Cancelled => {
                PyRuntimeError::new_err(e.to_string())
            }
        }
    }
}

/// Forward model output.
///
/// A container of numpy arrays, each dimensioned as (`num_points`,
/// `num_channels`).
#[pyclass]
struct ForwardOutput {
    radiance: Array2<f64>,
    brightness_temperature: Array2<f64>,
}

#[pymethods]
impl ForwardOutput {
    #[getter]
    fn radiance<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.radiance.to_pyarray(py)
    }

    #[getter]
    fn brightness_temperature<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.brightness_temperature.to_pyarray(py)
    }
}

impl ForwardOutput {
    fn from_results(results: &Array2<RadianceResult>) -> Self {
        let radiance = results.t().map(|r| r.radiance);
        let brightness_temperature = results.t().map(|r| r.brightness_temperature);
        Self {
            radiance,
            brightness_temperature,
        }
    }
}

fn shape_error(name: &str, found: &[usize], expected: &[usize]) -> PyErr {
    PyValueError::new_err(format!("{name} has shape {found:?}, expected {expected:?}"))
}

/// Run the forward model with the reference physics for one sensor.
///
/// Profiles are ordered from the top of the atmosphere down to the surface.
///
/// `level_pressure`: level pressures in hPa, shape (`num_points`,
/// `num_levels`)
///
/// The following are layer profiles with shape (`num_points`,
/// `num_levels - 1`):
///
/// `temperature`: layer temperature in K
///
/// `water_vapor`: water vapor volume mixing ratio in ppmv
///
/// `ozone`: ozone volume mixing ratio in ppmv
///
/// The following have shape (`num_points`, ):
///
/// `surface_temperature`: land skin temperature in K
///
/// `sensor_zenith`: sensor zenith angle in degrees
///
/// The channels are given by `wavenumber` in cm⁻¹ with shape
/// (`num_channels`, ) and their gas `absorption` coefficients with shape
/// (`num_channels`, `num_coefficients`). `sensor_kind` is one of
/// "microwave", "infrared", "visible" or "ultraviolet".
///
/// `emissivity`, if given, overrides the surface emissivity and has shape
/// (`num_points`, `num_channels`).
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to automatically choose the number of threads.
///
/// The returned radiances and brightness temperatures are each dimensioned
/// as (`num_points`, `num_channels`).
#[pyfunction]
#[pyo3(signature = (level_pressure, temperature, water_vapor, ozone, surface_temperature, sensor_zenith, wavenumber, absorption, sensor_kind, emissivity=None, num_threads=None))]
#[allow(clippy::too_many_arguments)]
fn compute_forward(
    py: Python<'_>,
    level_pressure: PyReadonlyArray2<'_, f64>,
    temperature: PyReadonlyArray2<'_, f64>,
    water_vapor: PyReadonlyArray2<'_, f64>,
    ozone: PyReadonlyArray2<'_, f64>,
    surface_temperature: PyReadonlyArray1<'_, f64>,
    sensor_zenith: PyReadonlyArray1<'_, f64>,
    wavenumber: PyReadonlyArray1<'_, f64>,
    absorption: PyReadonlyArray2<'_, f64>,
    sensor_kind: &str,
    emissivity: Option<PyReadonlyArray2<'_, f64>>,
    num_threads: Option<usize>,
) -> PyResult<ForwardOutput> {
    let [num_points, num_levels] = [level_pressure.shape()[0], level_pressure.shape()[1]];
    let num_layers = num_levels.saturating_sub(1);
    let num_channels = wavenumber.len();

    // Check shapes of all inputs
    let layer_shape = [num_points, num_layers];
    for (name, array) in [
        ("temperature", &temperature),
        ("water_vapor", &water_vapor),
        ("ozone", &ozone),
    ] {
        if array.shape() != layer_shape {
            return Err(shape_error(name, array.shape(), &layer_shape));
        }
    }
    for (name, array) in [
        ("surface_temperature", &surface_temperature),
        ("sensor_zenith", &sensor_zenith),
    ] {
        if array.len() != num_points {
            return Err(shape_error(name, array.shape(), &[num_points]));
        }
    }
    if absorption.shape()[0] != num_channels {
        return Err(shape_error(
            "absorption",
            absorption.shape(),
            &[num_channels, absorption.shape()[1]],
        ));
    }
    if let Some(emissivity) = &emissivity {
        if emissivity.shape() != [num_points, num_channels] {
            return Err(shape_error(
                "emissivity",
                emissivity.shape(),
                &[num_points, num_channels],
            ));
        }
    }
    let kind = SensorKind::parse(sensor_kind)
        .ok_or_else(|| PyValueError::new_err(format!("unknown sensor kind {sensor_kind:?}")))?;
    debug!("input shapes are consistent");

    let level_pressure = level_pressure.as_array();
    let temperature = temperature.as_array();
    let water_vapor = water_vapor.as_array();
    let ozone = ozone.as_array();
    let profiles: Vec<AtmosphericProfile> = (0..num_points)
        .map(|point| {
            let row = |array: &ArrayView2<'_, f64>| array.index_axis(Axis(0), point).to_vec();
            AtmosphericProfile::from_levels(row(&level_pressure), row(&temperature))
                .with_absorber(AbsorberId::H2o, row(&water_vapor))
                .with_absorber(AbsorberId::O3, row(&ozone))
        })
        .collect();
    let surfaces: Vec<SurfaceState> = surface_temperature
        .as_array()
        .iter()
        .map(|&t| SurfaceState::land(t))
        .collect();
    let mut geometries: Vec<ViewGeometry> = sensor_zenith
        .as_array()
        .iter()
        .map(|&z| ViewGeometry::with_sensor_zenith(z))
        .collect();
    let options: Option<Vec<ForwardOptions>> = emissivity.map(|emissivity| {
        emissivity
            .as_array()
            .rows()
            .into_iter()
            .map(|row| ForwardOptions::default().with_emissivity(row.to_vec()))
            .collect()
    });

    let absorption = absorption.as_array();
    let coefficients = wavenumber
        .as_array()
        .iter()
        .zip(absorption.rows())
        .enumerate()
        .map(|(channel, (&wavenumber, coefficients))| {
            ChannelCoefficients::new(channel + 1, wavenumber)
                .with_absorption(&coefficients.to_vec())
        })
        .collect();
    let sensors = [SensorCatalog::new(sensor_kind, kind, coefficients)];

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    info!("Processing forward model for {num_points} profiles and {num_channels} channels");

    let model = ForwardModel::new(ReferencePhysics::default());
    let mut results = Array2::default([num_channels, num_points]);

    // Shared with the workers: how many profiles are done and whether to
    // stop early
    let progress = ForwardProgress::default();
    let finished = AtomicBool::new(false);
    let mut outcome = None;

    pool.in_place_scope(|s| -> Result<(), PyErr> {
        s.spawn(|_| {
            outcome = Some(model.forward_parallel_with(
                &profiles,
                &surfaces,
                &mut geometries,
                &sensors,
                options.as_deref(),
                &mut results,
                &progress,
            ));
            finished.store(true, Ordering::Relaxed);
        });

        // The work is done in the thread pool. Back here in the main
        // thread, report progress and check for early cancellation
        let mut last_report = Instant::now();
        while !finished.load(Ordering::Relaxed) {
            if let Err(e) = py.check_signals() {
                progress.cancel();
                return Err(e);
            }

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                let completed = progress.completed();
                let percent = completed as f64 / num_points as f64 * 100.;
                info!("Completed {completed}/{num_points} profiles ({percent:0.2}%)");
                last_report = Instant::now();
            }

            py.allow_threads(|| std::thread::sleep(POLL_INTERVAL));
        }

        Ok(())
    })?;

    let report = outcome.unwrap_or(Err(ForwardError::Cancelled))?;
    info!(
        "Completed forward model for {} profiles with {} cleanup warnings",
        report.profiles,
        report.warnings.len()
    );

    debug!("copying forward model output");
    Ok(ForwardOutput::from_results(&results))
}

/// A Python module implemented in Rust.
#[pymodule]
fn rtm_forward(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(compute_forward, m)?)?;
    m.add_class::<ForwardOutput>()?;
    Ok(())
}

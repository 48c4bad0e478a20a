//! Radiative transfer forward model
//!
//! The [`rtm`] module holds the forward driver and its data model. The
//! physics itself (gas absorption, scattering, the radiative transfer solver)
//! is supplied through the [`rtm::ForwardPhysics`] trait, with
//! [`rtm::ReferencePhysics`] as a simple built-in backend.
//!
//! With the `python` feature, the crate also builds a Python extension
//! module. Only that layer uses `pyo3`.

pub mod error;
pub mod rtm;

#[cfg(feature = "python")]
mod python;

pub use error::{BackendError, CleanupWarning, ForwardError, Stage, StageContext, ValidationError};
pub use rtm::{ForwardModel, ForwardReport, RadianceResult};

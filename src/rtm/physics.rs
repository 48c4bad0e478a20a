//! Interface to the physics collaborators driven by the forward model.
//!
//! The driver owns the call order, scoping and error context; a
//! [`ForwardPhysics`] implementation supplies the numerics. Workspaces are
//! associated types so each backend can keep whatever internal state it needs
//! for the scope that owns it.

use super::atmosphere::ExtendedAtmosphere;
use super::geometry::ViewGeometry;
use super::optics::CombinedOpticalState;
use super::sensor::{ChannelRef, SensorCatalog, SensorInput};
use super::surface::{SurfaceOpticalState, SurfaceState};
use super::RadianceResult;
use crate::error::BackendError;

/// Stream count chosen for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSetup {
    /// Number of streams (Legendre terms).
    pub n_streams: usize,
    /// Whether the channel needs a scattering solution.
    pub scattering: bool,
}

/// One azimuthal Fourier component of a channel's solution.
///
/// The driver weights component `m` by `cos(m * relative_azimuth)` before
/// adding it to the result.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FourierComponent {
    /// Top-of-atmosphere radiance.
    pub radiance: f64,
    /// Upwelling atmospheric radiance.
    pub up_radiance: f64,
    /// Downwelling atmospheric radiance at the surface.
    pub down_radiance: f64,
    /// Downwelling solar radiance at the surface.
    pub down_solar_radiance: f64,
    /// Surface Planck radiance.
    pub surface_planck_radiance: f64,
}

/// Everything the radiative transfer solver sees for one channel.
#[derive(Debug, Clone, Copy)]
pub struct SolveInput<'a> {
    /// Extended atmosphere.
    pub atmosphere: &'a ExtendedAtmosphere,
    /// Surface state.
    pub surface: &'a SurfaceState,
    /// Combined optics of the channel.
    pub optics: &'a CombinedOpticalState,
    /// Surface optics of the channel.
    pub surface_optics: &'a SurfaceOpticalState,
    /// Derived viewing geometry.
    pub geometry: &'a ViewGeometry,
    /// The sensor.
    pub sensor: &'a SensorCatalog,
    /// The channel.
    pub channel: ChannelRef<'a>,
    /// Whether the sun contributes to the channel.
    pub solar: bool,
}

/// Physics collaborators of the forward model.
///
/// Every method is called synchronously. Profile workspaces live for one
/// profile iteration; sensor workspaces and predictors live for one sensor
/// iteration within a profile. The driver releases each workspace exactly
/// once, on every exit path.
pub trait ForwardPhysics {
    /// Scratch state owned by one profile iteration, e.g. for cloud and
    /// aerosol scattering.
    type ProfileWorkspace;
    /// Scratch state owned by one sensor iteration, e.g. for absorption and
    /// the solver's internal state shared across Fourier orders.
    type SensorWorkspace;
    /// Absorption predictors for one sensor within one profile.
    type Predictor;

    /// Fill in the derived geometry.
    fn derive_geometry(&self, geometry: &mut ViewGeometry) -> Result<(), BackendError> {
        geometry.derive()
    }

    /// Allocate profile-scope scratch state.
    fn allocate_profile_workspace(
        &self,
        atmosphere: &ExtendedAtmosphere,
    ) -> Result<Self::ProfileWorkspace, BackendError>;

    /// Release profile-scope scratch state.
    fn release_profile_workspace(
        &self,
        workspace: Self::ProfileWorkspace,
    ) -> Result<(), BackendError>;

    /// Allocate sensor-scope scratch state.
    fn allocate_sensor_workspace(
        &self,
        atmosphere: &ExtendedAtmosphere,
        sensor: &SensorCatalog,
    ) -> Result<Self::SensorWorkspace, BackendError>;

    /// Release sensor-scope scratch state.
    fn release_sensor_workspace(
        &self,
        workspace: Self::SensorWorkspace,
    ) -> Result<(), BackendError>;

    /// Build the absorption predictors for a sensor.
    fn build_predictors(
        &self,
        atmosphere: &ExtendedAtmosphere,
        sensor: &SensorCatalog,
        geometry: &ViewGeometry,
        workspace: &mut Self::SensorWorkspace,
    ) -> Result<Self::Predictor, BackendError>;

    /// Release the predictors of a sensor.
    fn release_predictors(&self, predictor: Self::Predictor) -> Result<(), BackendError> {
        drop(predictor);
        Ok(())
    }

    /// Choose the number of streams for a channel.
    fn stream_count(
        &self,
        atmosphere: &ExtendedAtmosphere,
        sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
    ) -> Result<StreamSetup, BackendError>;

    /// Accumulate gas absorption.
    #[allow(clippy::too_many_arguments)]
    fn gas_absorption(
        &self,
        sensor_input: Option<&SensorInput>,
        sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
        atmosphere: &ExtendedAtmosphere,
        predictor: &Self::Predictor,
        workspace: &mut Self::SensorWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError>;

    /// Accumulate molecular (Rayleigh) scattering at `wavenumber` in cm⁻¹.
    fn molecular_scatter(
        &self,
        wavenumber: f64,
        atmosphere: &ExtendedAtmosphere,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError>;

    /// Accumulate cloud scattering. Only called for profiles with clouds.
    fn cloud_scatter(
        &self,
        atmosphere: &ExtendedAtmosphere,
        sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
        workspace: &mut Self::ProfileWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError>;

    /// Accumulate aerosol scattering. Only called for profiles with aerosols.
    fn aerosol_scatter(
        &self,
        atmosphere: &ExtendedAtmosphere,
        sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
        workspace: &mut Self::ProfileWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError>;

    /// Combine the accumulated contributions.
    fn combine(&self, optics: &mut CombinedOpticalState) {
        optics.combine();
    }

    /// Set the effective surface temperature.
    fn surface_temperature(
        &self,
        surface: &SurfaceState,
        surface_optics: &mut SurfaceOpticalState,
    ) {
        surface_optics.set_temperature(surface);
    }

    /// Solve the radiative transfer equation for one Fourier order.
    fn solve(
        &self,
        input: &SolveInput<'_>,
        fourier_order: usize,
        workspace: &mut Self::SensorWorkspace,
    ) -> Result<FourierComponent, BackendError>;

    /// Correct a channel result for the sensor's antenna pattern at field of
    /// view `fov`.
    fn apply_antenna_correction(
        &self,
        _geometry: &ViewGeometry,
        sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
        fov: usize,
        result: &mut RadianceResult,
    ) {
        if let Some(pattern) = &sensor.antenna {
            pattern.correct(fov, channel, result);
        }
    }
}

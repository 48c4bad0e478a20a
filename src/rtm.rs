//! Forward model orchestration
//!
//! A [`ForwardModel`] drives a [`ForwardPhysics`] backend over every
//! (profile, sensor, channel) combination, writing one [`RadianceResult`] per
//! channel and profile.

mod accumulate;
pub mod antenna;
pub mod atmosphere;
pub mod config;
mod driver;
mod fourier;
pub mod geometry;
pub mod optics;
pub mod options;
pub mod physics;
mod planck;
pub mod reference;
pub mod sensor;
pub mod surface;
mod workspace;


pub use self::antenna::AntennaPattern;
pub use self::atmosphere::{
    Absorber, AbsorberId, Aerosol, AerosolKind, AtmosphereExtender, AtmosphericProfile, Cloud,
    CloudKind, ExtendedAtmosphere, ExtensionSource, ExtensionState,
};
pub use self::config::ForwardConfig;
pub use self::driver::{ForwardModel, ForwardProgress, ForwardReport};
pub use self::geometry::{DerivedGeometry, ViewGeometry};
pub use self::optics::CombinedOpticalState;
pub use self::options::ForwardOptions;
pub use self::physics::{ForwardPhysics, FourierComponent, SolveInput, StreamSetup};
pub use self::reference::ReferencePhysics;
pub use self::sensor::{ChannelCoefficients, ChannelRef, SensorCatalog, SensorInput, SensorKind};
pub use self::surface::{SurfaceOpticalState, SurfaceState};

/// Solution for one channel of one profile.
///
/// Storage is owned by the caller and reused across calls. Every field is
/// overwritten when the channel is computed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RadianceResult {
    /// Identifier of the sensor the channel belongs to.
    pub sensor_id: String,
    /// Channel number as the sensor defines it.
    pub sensor_channel: usize,
    /// Top-of-atmosphere radiance in mW/(m² sr cm⁻¹).
    pub radiance: f64,
    /// Brightness temperature in K. Zero for sensors without one, such as
    /// visible sensors.
    pub brightness_temperature: f64,
    /// Number of streams (Legendre terms) used.
    pub n_full_streams: usize,
    /// Whether a scattering solution was required.
    pub scattering: bool,
    /// Whether the sun contributed.
    pub solar: bool,
    /// Whether the azimuthal Fourier expansion was used.
    pub visible: bool,
    /// Number of Fourier orders solved.
    pub fourier_orders: usize,
    /// Surface emissivity at the sensor angle.
    pub surface_emissivity: f64,
    /// Surface reflectivity at the sensor angle.
    pub surface_reflectivity: f64,
    /// Upwelling atmospheric radiance.
    pub up_radiance: f64,
    /// Downwelling atmospheric radiance at the surface.
    pub down_radiance: f64,
    /// Downwelling solar radiance at the surface.
    pub down_solar_radiance: f64,
    /// Surface Planck radiance.
    pub surface_planck_radiance: f64,
    /// Combined optical depth of each of the profile's own layers, top first.
    pub layer_optical_depth: Vec<f64>,
}

impl RadianceResult {
    /// Clear the result in place, keeping its allocations.
    pub fn reset(&mut self) {
        let mut sensor_id = std::mem::take(&mut self.sensor_id);
        let mut layer_optical_depth = std::mem::take(&mut self.layer_optical_depth);
        sensor_id.clear();
        layer_optical_depth.clear();
        *self = Self {
            sensor_id,
            layer_optical_depth,
            ..Self::default()
        };
    }
}

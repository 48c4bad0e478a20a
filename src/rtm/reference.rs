//! A simple physics backend.
//!
//! Gas absorption is linear in a few layer predictors, clouds and aerosols
//! are grey Henyey-Greenstein scatterers, and the solver integrates thermal
//! emission along the line of sight without multiple scattering. Reflected
//! sunlight is added for channels with a solar contribution. Only the
//! azimuth-averaged Fourier order is non-zero.

use ndarray::Array2;

use super::atmosphere::{AbsorberId, AerosolKind, CloudKind, ExtendedAtmosphere};
use super::geometry::ViewGeometry;
use super::optics::CombinedOpticalState;
use super::physics::{ForwardPhysics, FourierComponent, SolveInput, StreamSetup};
use super::sensor::{ChannelRef, SensorCatalog, SensorInput};
use super::surface::SurfaceState;
use crate::error::BackendError;

/// Standard surface pressure in hPa.
const P_STANDARD: f64 = 1013.25;

/// Normalized Legendre coefficients of the Rayleigh phase function.
const RAYLEIGH_PHASE: [f64; 3] = [1.0, 0.0, 0.5];

/// Number of layer predictors.
const NUM_PREDICTORS: usize = 3;

/// Effective radius in µm above which particles need more streams.
const LARGE_PARTICLE_RADIUS: f64 = 100.0;

/// Grey optical properties of a particle type: mass extinction coefficient
/// in m²/kg, single-scatter albedo and asymmetry factor.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ParticleOptics {
    mass_extinction: f64,
    single_scatter_albedo: f64,
    asymmetry: f64,
}

impl ParticleOptics {
    const fn new(mass_extinction: f64, single_scatter_albedo: f64, asymmetry: f64) -> Self {
        Self {
            mass_extinction,
            single_scatter_albedo,
            asymmetry,
        }
    }

    fn cloud(kind: CloudKind) -> Self {
        match kind {
            CloudKind::Water => Self::new(60.0, 0.55, 0.85),
            CloudKind::Ice => Self::new(35.0, 0.75, 0.80),
            CloudKind::Rain => Self::new(4.0, 0.45, 0.90),
            CloudKind::Snow => Self::new(3.0, 0.65, 0.88),
            CloudKind::Graupel => Self::new(2.5, 0.60, 0.90),
            CloudKind::Hail => Self::new(1.5, 0.60, 0.92),
        }
    }

    fn aerosol(kind: AerosolKind) -> Self {
        match kind {
            AerosolKind::Dust => Self::new(800.0, 0.90, 0.72),
            AerosolKind::SeaSalt => Self::new(1500.0, 0.99, 0.78),
            AerosolKind::OrganicCarbon => Self::new(4000.0, 0.93, 0.65),
            AerosolKind::BlackCarbon => Self::new(9000.0, 0.25, 0.55),
            AerosolKind::Sulfate => Self::new(5000.0, 0.99, 0.68),
        }
    }
}

/// Default surface emissivities, applied when the caller doesn't override
/// them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceEmissivity {
    /// Land emissivity.
    pub land: f64,
    /// Open water emissivity.
    pub water: f64,
    /// Snow emissivity.
    pub snow: f64,
    /// Sea ice emissivity.
    pub ice: f64,
}

impl Default for SurfaceEmissivity {
    fn default() -> Self {
        Self {
            land: 0.95,
            water: 0.98,
            snow: 0.99,
            ice: 0.97,
        }
    }
}

impl SurfaceEmissivity {
    /// Coverage-weighted emissivity of a surface. A surface with no
    /// coverage at all is treated as a blackbody.
    pub fn of(&self, surface: &SurfaceState) -> f64 {
        let parts = [
            (surface.land_coverage, self.land),
            (surface.water_coverage, self.water),
            (surface.snow_coverage, self.snow),
            (surface.ice_coverage, self.ice),
        ];
        let total: f64 = parts.iter().map(|(f, _)| f).sum();
        if total > 0.0 {
            parts.iter().map(|(f, e)| f * e).sum::<f64>() / total
        } else {
            1.0
        }
    }
}

/// Physics backend for testing and quick-look simulations.
#[derive(Debug, Clone, Default)]
pub struct ReferencePhysics {
    /// Emissivities used when the caller doesn't supply one.
    pub surface_emissivity: SurfaceEmissivity,
}

/// Scratch space for phase function coefficients.
#[derive(Debug, Default)]
pub struct ScatterWorkspace {
    coefficients: Vec<f64>,
}

/// Per-sensor solver scratch space.
#[derive(Debug, Default)]
pub struct SolverWorkspace {
    transmittance: Vec<f64>,
}

/// Layer predictors: the layer's share of a standard column, and the same
/// weighted by the water vapor and ozone volume mixing ratios.
///
/// Shaped as (`num_layers`, 3).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPredictors(Array2<f64>);

impl LayerPredictors {
    /// The predictor values.
    pub fn values(&self) -> &Array2<f64> {
        &self.0
    }
}

impl ReferencePhysics {
    /// Add `particle` scattering to every layer with positive `mass`.
    fn add_particles(
        optics: &mut CombinedOpticalState,
        workspace: &mut ScatterWorkspace,
        particle: ParticleOptics,
        mass: &[f64],
    ) {
        let n_terms = optics.n_legendre_terms();
        let coefficients = &mut workspace.coefficients;
        coefficients.clear();
        coefficients.extend((0..=n_terms).map(|k| particle.asymmetry.powi(k as i32)));

        for (layer, &mass) in mass.iter().enumerate() {
            if mass > 0.0 {
                optics.add_scattering(
                    layer,
                    particle.mass_extinction * mass,
                    particle.single_scatter_albedo,
                    coefficients,
                );
            }
        }
    }
}

impl ForwardPhysics for ReferencePhysics {
    type ProfileWorkspace = ScatterWorkspace;
    type SensorWorkspace = SolverWorkspace;
    type Predictor = LayerPredictors;

    fn allocate_profile_workspace(
        &self,
        _atmosphere: &ExtendedAtmosphere,
    ) -> Result<ScatterWorkspace, BackendError> {
        Ok(ScatterWorkspace::default())
    }

    fn release_profile_workspace(&self, workspace: ScatterWorkspace) -> Result<(), BackendError> {
        drop(workspace);
        Ok(())
    }

    fn allocate_sensor_workspace(
        &self,
        atmosphere: &ExtendedAtmosphere,
        _sensor: &SensorCatalog,
    ) -> Result<SolverWorkspace, BackendError> {
        Ok(SolverWorkspace {
            transmittance: Vec::with_capacity(atmosphere.num_layers()),
        })
    }

    fn release_sensor_workspace(&self, workspace: SolverWorkspace) -> Result<(), BackendError> {
        drop(workspace);
        Ok(())
    }

    fn build_predictors(
        &self,
        atmosphere: &ExtendedAtmosphere,
        _sensor: &SensorCatalog,
        _geometry: &ViewGeometry,
        _workspace: &mut SolverWorkspace,
    ) -> Result<LayerPredictors, BackendError> {
        let profile = atmosphere.profile();
        let num_layers = atmosphere.num_layers();
        let h2o = profile.absorber(AbsorberId::H2o);
        let o3 = profile.absorber(AbsorberId::O3);

        let mut predictors = Array2::zeros([num_layers, NUM_PREDICTORS]);
        for (layer, mut row) in predictors.rows_mut().into_iter().enumerate() {
            let column = profile.layer_thickness(layer) / P_STANDARD;
            row[0] = column;
            row[1] = h2o.map_or(0.0, |q| q[layer] * 1e-6 * column);
            row[2] = o3.map_or(0.0, |q| q[layer] * 1e-6 * column);
        }
        Ok(LayerPredictors(predictors))
    }

    fn stream_count(
        &self,
        atmosphere: &ExtendedAtmosphere,
        _sensor: &SensorCatalog,
        _channel: ChannelRef<'_>,
    ) -> Result<StreamSetup, BackendError> {
        let profile = atmosphere.profile();
        if profile.clouds.is_empty() && profile.aerosols.is_empty() {
            return Ok(StreamSetup::default());
        }

        let large_particles = profile
            .clouds
            .iter()
            .flat_map(|c| &c.effective_radius)
            .chain(profile.aerosols.iter().flat_map(|a| &a.effective_radius))
            .any(|&r| r > LARGE_PARTICLE_RADIUS);
        Ok(StreamSetup {
            n_streams: if large_particles { 8 } else { 4 },
            scattering: true,
        })
    }

    fn gas_absorption(
        &self,
        _sensor_input: Option<&SensorInput>,
        _sensor: &SensorCatalog,
        channel: ChannelRef<'_>,
        atmosphere: &ExtendedAtmosphere,
        predictor: &LayerPredictors,
        _workspace: &mut SolverWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError> {
        let coefficients = &channel.coefficients.absorption;
        if coefficients.len() > NUM_PREDICTORS {
            return Err(BackendError::new(format!(
                "channel {} has {} absorption coefficients, but only {NUM_PREDICTORS} predictors exist",
                channel.sensor_channel(),
                coefficients.len()
            )));
        }

        for layer in 0..atmosphere.num_layers() {
            let od: f64 = coefficients
                .iter()
                .zip(predictor.0.row(layer))
                .map(|(c, x)| c * x)
                .sum();
            if od < 0.0 {
                return Err(BackendError::new(format!(
                    "negative absorption optical depth {od} in layer {layer}"
                )));
            }
            optics.add_absorption(layer, od);
        }
        Ok(())
    }

    fn molecular_scatter(
        &self,
        wavenumber: f64,
        atmosphere: &ExtendedAtmosphere,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError> {
        if !(wavenumber > 0.0) {
            return Err(BackendError::new(format!("invalid wavenumber {wavenumber}")));
        }

        // Optical depth of the full standard column, with the wavelength in µm
        let lambda = 1e4 / wavenumber;
        let column_od = 0.008569
            * lambda.powi(-4)
            * (1.0 + 0.0113 * lambda.powi(-2) + 0.00013 * lambda.powi(-4));

        let profile = atmosphere.profile();
        for layer in 0..atmosphere.num_layers() {
            let od = column_od * profile.layer_thickness(layer) / P_STANDARD;
            optics.add_scattering(layer, od, 1.0, &RAYLEIGH_PHASE);
        }
        Ok(())
    }

    fn cloud_scatter(
        &self,
        atmosphere: &ExtendedAtmosphere,
        _sensor: &SensorCatalog,
        _channel: ChannelRef<'_>,
        workspace: &mut ScatterWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError> {
        for cloud in &atmosphere.profile().clouds {
            let particle = ParticleOptics::cloud(cloud.kind);
            Self::add_particles(optics, workspace, particle, &cloud.water_content);
        }
        Ok(())
    }

    fn aerosol_scatter(
        &self,
        atmosphere: &ExtendedAtmosphere,
        _sensor: &SensorCatalog,
        _channel: ChannelRef<'_>,
        workspace: &mut ScatterWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<(), BackendError> {
        for aerosol in &atmosphere.profile().aerosols {
            let particle = ParticleOptics::aerosol(aerosol.kind);
            Self::add_particles(optics, workspace, particle, &aerosol.concentration);
        }
        Ok(())
    }

    fn solve(
        &self,
        input: &SolveInput<'_>,
        fourier_order: usize,
        workspace: &mut SolverWorkspace,
    ) -> Result<FourierComponent, BackendError> {
        if fourier_order > 0 {
            return Ok(FourierComponent::default());
        }

        let channel = input.channel.coefficients;
        let temperature = &input.atmosphere.profile().temperature;
        let optical_depth = &input.optics.optical_depth;
        let derived = &input.geometry.derived;

        let transmittance = &mut workspace.transmittance;
        transmittance.clear();
        transmittance.extend(
            optical_depth
                .iter()
                .map(|od| f64::exp(-od * derived.secant_sensor_zenith)),
        );

        // Emission of each layer, attenuated by the layers above it on the way
        // up and by the layers below it on the way down
        let (up_radiance, _) = temperature.iter().zip(transmittance.iter()).fold(
            (0.0, 1.0),
            |(sum, above), (&t, &tran)| {
                (sum + channel.planck_radiance(t) * (1.0 - tran) * above, above * tran)
            },
        );
        let (down_radiance, total_transmittance) = temperature
            .iter()
            .zip(transmittance.iter())
            .rev()
            .fold((0.0, 1.0), |(sum, below), (&t, &tran)| {
                (sum + channel.planck_radiance(t) * (1.0 - tran) * below, below * tran)
            });

        let (emissivity, reflectivity, direct_reflectivity) = if input.surface_optics.is_computed()
        {
            let e = self.surface_emissivity.of(input.surface);
            (e, 1.0 - e, 1.0 - e)
        } else {
            (
                input.surface_optics.sensor_emissivity(),
                input.surface_optics.sensor_reflectivity(),
                input.surface_optics.sensor_direct_reflectivity(),
            )
        };

        let down_solar_radiance = if input.solar && derived.secant_source_zenith > 0.0 {
            let column_od: f64 = optical_depth.sum();
            channel.solar_irradiance
                * derived.cos_source_zenith
                * f64::exp(-column_od * derived.secant_source_zenith)
                / std::f64::consts::PI
        } else {
            0.0
        };

        let surface_planck_radiance = channel.planck_radiance(input.surface_optics.temperature);
        let surface_radiance = emissivity * surface_planck_radiance
            + reflectivity * down_radiance
            + direct_reflectivity * down_solar_radiance;

        Ok(FourierComponent {
            radiance: up_radiance + total_transmittance * surface_radiance,
            up_radiance,
            down_radiance,
            down_solar_radiance,
            surface_planck_radiance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtm::atmosphere::{AtmosphereExtender, AtmosphericProfile};
    use crate::rtm::options::ForwardOptions;
    use crate::rtm::sensor::{ChannelCoefficients, SensorKind};
    use crate::rtm::{ForwardModel, RadianceResult};
    use approx::assert_relative_eq;

    fn profile() -> AtmosphericProfile {
        AtmosphericProfile::from_levels(
            vec![0.005, 1.0, 100.0, 500.0, 850.0, 1000.0],
            vec![220.0, 230.0, 220.0, 260.0, 285.0],
        )
        .with_absorber(AbsorberId::H2o, vec![5.0, 5.0, 500.0, 5000.0, 15000.0])
    }

    fn run(
        sensor: SensorCatalog,
        surface: SurfaceState,
        geometry: ViewGeometry,
        options: Option<ForwardOptions>,
    ) -> RadianceResult {
        let model = ForwardModel::new(ReferencePhysics::default());
        let options = options.map(|o| vec![o]);
        let mut results = Array2::default([sensor.num_channels(), 1]);
        model
            .forward(
                &[profile()],
                &[surface],
                &mut [geometry],
                &[sensor],
                options.as_deref(),
                &mut results,
            )
            .unwrap();
        results[[0, 0]].clone()
    }

    #[test]
    fn transparent_blackbody_sees_the_surface() {
        let sensor = SensorCatalog::new(
            "window",
            SensorKind::Infrared,
            vec![ChannelCoefficients::new(1, 900.0)],
        );
        let options = ForwardOptions::default().with_emissivity(vec![1.0]);
        let result = run(
            sensor,
            SurfaceState::water(295.0),
            ViewGeometry::with_sensor_zenith(30.0),
            Some(options),
        );

        assert_relative_eq!(result.brightness_temperature, 295.0, epsilon = 1e-6);
        assert_eq!(result.up_radiance, 0.0);
        assert_eq!(result.n_full_streams, 0);
        assert!(!result.scattering);
    }

    #[test]
    fn opaque_atmosphere_sees_the_top_layer() {
        let sensor = SensorCatalog::new(
            "sounder",
            SensorKind::Microwave,
            vec![ChannelCoefficients::from_frequency(1, 60.0).with_absorption(&[1e8])],
        );
        let result = run(
            sensor,
            SurfaceState::land(300.0),
            ViewGeometry::with_sensor_zenith(0.0),
            None,
        );

        let (extended, _) = AtmosphereExtender.extend(&profile()).unwrap();
        assert_relative_eq!(
            result.brightness_temperature,
            extended.profile().temperature[0],
            max_relative = 1e-6
        );
    }

    #[test]
    fn water_vapor_cools_a_warm_surface() {
        let window = |absorption: &[f64]| {
            SensorCatalog::new(
                "window",
                SensorKind::Infrared,
                vec![ChannelCoefficients::new(1, 1000.0).with_absorption(absorption)],
            )
        };
        let clear = run(
            window(&[]),
            SurfaceState::land(300.0),
            ViewGeometry::with_sensor_zenith(0.0),
            None,
        );
        let moist = run(
            window(&[0.0, 200.0]),
            SurfaceState::land(300.0),
            ViewGeometry::with_sensor_zenith(0.0),
            None,
        );
        assert!(moist.brightness_temperature < clear.brightness_temperature);
        assert!(moist.up_radiance > 0.0);
    }

    #[test]
    fn sunlit_visible_channel_reflects_sunlight() {
        let sensor = SensorCatalog::new(
            "imager",
            SensorKind::Visible,
            vec![ChannelCoefficients::new(1, 15000.0).with_solar_irradiance(1500.0)],
        );
        let geometry = ViewGeometry {
            sensor_zenith: 20.0,
            source_zenith: 40.0,
            ..ViewGeometry::default()
        };
        let options = ForwardOptions::default().with_emissivity(vec![0.9]);
        let result = run(sensor, SurfaceState::land(290.0), geometry, Some(options));

        assert!(result.solar);
        assert!(result.visible);
        assert_eq!(result.n_full_streams, 4);
        assert_eq!(result.fourier_orders, 17);
        assert!(result.down_solar_radiance > 0.0);
        assert!(result.radiance > 0.0);
        assert_eq!(result.brightness_temperature, 0.0);
    }

    #[test]
    fn grey_clouds_use_henyey_greenstein_coefficients() {
        let mut optics = CombinedOpticalState::new(2, 16, 1);
        optics.reset(4, true);
        let mut workspace = ScatterWorkspace::default();
        let particle = ParticleOptics::cloud(CloudKind::Water);
        ReferencePhysics::add_particles(&mut optics, &mut workspace, particle, &[0.0, 0.01]);

        assert_eq!(optics.optical_depth[0], 0.0);
        assert_relative_eq!(optics.optical_depth[1], 0.6);
        assert_relative_eq!(optics.single_scatter[1], 0.6 * 0.55);
        assert_relative_eq!(
            optics.phase_coefficient[[2, 0, 1]],
            0.6 * 0.55 * 0.85 * 0.85,
            max_relative = 1e-12
        );
    }
}

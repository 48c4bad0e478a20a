//! Per-channel accumulation of the combined optical state.

use log::trace;

use super::atmosphere::ExtendedAtmosphere;
use super::config::{ForwardConfig, RAYLEIGH_STREAMS};
use super::geometry::ViewGeometry;
use super::optics::CombinedOpticalState;
use super::options::ResolvedOptions;
use super::physics::ForwardPhysics;
use super::sensor::{ChannelRef, SensorCatalog};
use crate::error::{BackendError, ForwardError, Stage, StageContext};

/// What the accumulation decided about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ChannelFlags {
    /// Legendre terms in use after every contributor ran.
    pub n_streams: usize,
    pub scattering: bool,
    /// The sun contributes to the channel.
    pub solar: bool,
    /// The sun contributes and the sensor measures reflected sunlight, so
    /// the azimuthal Fourier expansion is needed.
    pub visible: bool,
}

/// Borrowed state for accumulating the optics of one channel.
pub(crate) struct ChannelAccumulation<'a, P: ForwardPhysics + ?Sized> {
    pub physics: &'a P,
    pub config: &'a ForwardConfig,
    pub options: &'a ResolvedOptions<'a>,
    pub atmosphere: &'a ExtendedAtmosphere,
    pub geometry: &'a ViewGeometry,
    pub sensor: &'a SensorCatalog,
    pub context: &'a StageContext,
}

impl<P: ForwardPhysics + ?Sized> ChannelAccumulation<'_, P> {
    /// Reset `optics` and accumulate every contribution for `channel`.
    ///
    /// Molecular scattering runs first so that its stream widening applies to
    /// the gas, cloud and aerosol steps that follow.
    pub fn run(
        &self,
        channel: ChannelRef<'_>,
        predictor: &P::Predictor,
        sensor_workspace: &mut P::SensorWorkspace,
        profile_workspace: &mut P::ProfileWorkspace,
        optics: &mut CombinedOpticalState,
    ) -> Result<ChannelFlags, ForwardError> {
        let context = &self.context.with_channel(channel.sensor_channel());
        let fail = |stage| move |e: BackendError| ForwardError::stage(stage, context, e);

        let mut setup = self
            .physics
            .stream_count(self.atmosphere, self.sensor, channel)
            .map_err(fail(Stage::StreamCount))?;
        if let Some(n_streams) = self.options.n_streams {
            setup.n_streams = n_streams;
            setup.scattering = true;
        }
        self.check_stream_limits(setup.n_streams)
            .map_err(fail(Stage::StreamCount))?;

        optics.reset(setup.n_streams, self.options.include_scattering);

        let solar = channel.coefficients.solar_irradiance > 0.0
            && self.geometry.source_zenith < self.config.max_solar_zenith;
        let visible = solar && self.sensor.kind.is_visible();
        if visible {
            optics
                .widen_legendre_terms(RAYLEIGH_STREAMS)
                .map_err(fail(Stage::StreamCount))?;
            setup.scattering = true;
            self.physics
                .molecular_scatter(channel.wavenumber(), self.atmosphere, optics)
                .map_err(fail(Stage::MolecularScatter))?;
        }

        self.physics
            .gas_absorption(
                self.options.sensor_input,
                self.sensor,
                channel,
                self.atmosphere,
                predictor,
                sensor_workspace,
                optics,
            )
            .map_err(fail(Stage::Absorption))?;

        if self.atmosphere.num_clouds() > 0 {
            self.physics
                .cloud_scatter(self.atmosphere, self.sensor, channel, profile_workspace, optics)
                .map_err(fail(Stage::CloudScatter))?;
        }
        if self.atmosphere.num_aerosols() > 0 {
            self.physics
                .aerosol_scatter(self.atmosphere, self.sensor, channel, profile_workspace, optics)
                .map_err(fail(Stage::AerosolScatter))?;
        }

        self.physics.combine(optics);

        let flags = ChannelFlags {
            n_streams: optics.n_legendre_terms(),
            scattering: setup.scattering,
            solar,
            visible,
        };
        trace!("{context}: {flags:?}");
        Ok(flags)
    }

    fn check_stream_limits(&self, n_streams: usize) -> Result<(), BackendError> {
        if n_streams > self.config.max_legendre_terms {
            return Err(BackendError::new(format!(
                "{n_streams} streams exceeds the maximum of {} Legendre terms",
                self.config.max_legendre_terms
            )));
        }
        if n_streams / 2 > self.config.max_angles {
            return Err(BackendError::new(format!(
                "{n_streams} streams needs more than the maximum of {} angles",
                self.config.max_angles
            )));
        }
        Ok(())
    }
}

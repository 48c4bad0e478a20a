//! Top-level forward driver.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, info, warn};
use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;

use super::accumulate::ChannelAccumulation;
use super::antenna::correction_fov;
use super::atmosphere::{AtmosphereExtender, AtmosphericProfile};
use super::config::ForwardConfig;
use super::fourier;
use super::geometry::ViewGeometry;
use super::optics::CombinedOpticalState;
use super::options::{ForwardOptions, ResolvedOptions};
use super::physics::{ForwardPhysics, SolveInput};
use super::sensor::SensorCatalog;
use super::surface::{SurfaceOpticalState, SurfaceState};
use super::workspace::Scoped;
use super::RadianceResult;
use crate::error::{
    BackendError, CleanupWarning, ForwardError, InputName, Scope, Stage, StageContext,
    ValidationError,
};

/// Summary of a successful forward call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardReport {
    /// Number of profiles processed.
    pub profiles: usize,
    /// Number of channels computed per profile.
    pub channels: usize,
    /// Workspace releases that failed. The results are still valid.
    pub warnings: Vec<CleanupWarning>,
}

/// Shared progress counter and cancellation flag for
/// [`ForwardModel::forward_parallel_with`].
///
/// Another thread may watch [`ForwardProgress::completed`] and call
/// [`ForwardProgress::cancel`] while the forward call runs.
#[derive(Debug, Default)]
pub struct ForwardProgress {
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl ForwardProgress {
    /// Number of profiles finished or skipped so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Skip every profile that hasn't started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`ForwardProgress::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Forward model over a physics backend.
#[derive(Debug, Clone, Default)]
pub struct ForwardModel<P> {
    physics: P,
    config: ForwardConfig,
    extender: AtmosphereExtender,
}

/// Inputs shared by every profile of one call.
struct Batch<'a> {
    sensors: &'a [SensorCatalog],
    num_channels: usize,
}

/// Inputs for one profile of a call.
struct ProfileInput<'a> {
    index: usize,
    profile: &'a AtmosphericProfile,
    surface: &'a SurfaceState,
    options: Option<&'a ForwardOptions>,
}

impl<P: ForwardPhysics> ForwardModel<P> {
    /// Create a model with the default configuration.
    pub fn new(physics: P) -> Self {
        Self {
            physics,
            config: ForwardConfig::default(),
            extender: AtmosphereExtender,
        }
    }

    /// Create a model with a custom configuration.
    pub fn with_config(physics: P, config: ForwardConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            physics,
            config,
            extender: AtmosphereExtender,
        })
    }

    /// The physics backend.
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// The configuration.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Compute every selected channel of every sensor for every profile.
    ///
    /// `results` is indexed by (channel, profile). Its channel rows are the
    /// concatenation of each sensor's selected channels in catalog order,
    /// and it must have at least that many rows and exactly one column per
    /// profile. `geometries` gain their derived fields. `options`, if given,
    /// has one entry per profile.
    ///
    /// Inputs are validated before any profile runs. The first failing
    /// profile aborts the call, leaving `results` partially written.
    pub fn forward(
        &self,
        profiles: &[AtmosphericProfile],
        surfaces: &[SurfaceState],
        geometries: &mut [ViewGeometry],
        sensors: &[SensorCatalog],
        options: Option<&[ForwardOptions]>,
        results: &mut Array2<RadianceResult>,
    ) -> Result<ForwardReport, ForwardError> {
        let Some(batch) = self.validate(profiles, surfaces, geometries, sensors, options, results)?
        else {
            return Ok(ForwardReport::default());
        };

        let num_profiles = profiles.len();
        info!(
            "Running forward model for {num_profiles} profiles and {} channels",
            batch.num_channels
        );

        let mut warnings = Vec::new();
        for (index, (geometry, column)) in geometries
            .iter_mut()
            .zip(results.axis_iter_mut(Axis(1)))
            .enumerate()
        {
            let input = ProfileInput {
                index,
                profile: &profiles[index],
                surface: &surfaces[index],
                options: options.map(|o| &o[index]),
            };
            self.run_profile(&batch, &input, geometry, column, &mut warnings)?;
        }

        info!(
            "Forward model finished for {num_profiles} profiles with {} cleanup warnings",
            warnings.len()
        );
        Ok(ForwardReport {
            profiles: num_profiles,
            channels: batch.num_channels,
            warnings,
        })
    }

    /// Like [`ForwardModel::forward`], but processes profiles in parallel on
    /// the current rayon thread pool.
    ///
    /// Once a profile fails, profiles after it are skipped. The error
    /// returned is that of the lowest-indexed failing profile, the same one
    /// [`ForwardModel::forward`] would return.
    pub fn forward_parallel(
        &self,
        profiles: &[AtmosphericProfile],
        surfaces: &[SurfaceState],
        geometries: &mut [ViewGeometry],
        sensors: &[SensorCatalog],
        options: Option<&[ForwardOptions]>,
        results: &mut Array2<RadianceResult>,
    ) -> Result<ForwardReport, ForwardError>
    where
        P: Sync,
    {
        self.forward_parallel_with(
            profiles,
            surfaces,
            geometries,
            sensors,
            options,
            results,
            &ForwardProgress::default(),
        )
    }

    /// [`ForwardModel::forward_parallel`] with progress reporting and early
    /// cancellation through `progress`.
    ///
    /// A cancelled call returns [`ForwardError::Cancelled`] unless some
    /// profile that did run failed, in which case that failure is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn forward_parallel_with(
        &self,
        profiles: &[AtmosphericProfile],
        surfaces: &[SurfaceState],
        geometries: &mut [ViewGeometry],
        sensors: &[SensorCatalog],
        options: Option<&[ForwardOptions]>,
        results: &mut Array2<RadianceResult>,
        progress: &ForwardProgress,
    ) -> Result<ForwardReport, ForwardError>
    where
        P: Sync,
    {
        let Some(batch) = self.validate(profiles, surfaces, geometries, sensors, options, results)?
        else {
            return Ok(ForwardReport::default());
        };

        let num_profiles = profiles.len();
        info!(
            "Running forward model in parallel for {num_profiles} profiles and {} channels",
            batch.num_channels
        );

        // Lowest index of a failed profile so far
        let first_failure = AtomicUsize::new(usize::MAX);

        let columns: Vec<ArrayViewMut1<'_, RadianceResult>> =
            results.axis_iter_mut(Axis(1)).collect();
        let outcomes: Vec<Result<Vec<CleanupWarning>, ForwardError>> = columns
            .into_par_iter()
            .zip(geometries.par_iter_mut())
            .enumerate()
            .map(|(index, (column, geometry))| {
                if progress.is_cancelled() || index > first_failure.load(Ordering::Relaxed) {
                    return Err(ForwardError::Cancelled);
                }

                let input = ProfileInput {
                    index,
                    profile: &profiles[index],
                    surface: &surfaces[index],
                    options: options.map(|o| &o[index]),
                };
                let mut warnings = Vec::new();
                match self.run_profile(&batch, &input, geometry, column, &mut warnings) {
                    Ok(()) => Ok(warnings),
                    Err(e) => {
                        first_failure.fetch_min(index, Ordering::Relaxed);
                        Err(e)
                    }
                }
            })
            .inspect(|_| {
                progress.completed.fetch_add(1, Ordering::Relaxed);
            })
            .collect();

        // A profile skipped after a failure always comes after that failure
        let mut warnings = Vec::new();
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                Ok(w) => warnings.extend(w),
                Err(ForwardError::Cancelled) => cancelled = true,
                Err(e) => return Err(e),
            }
        }
        if cancelled {
            info!("Forward model cancelled early");
            return Err(ForwardError::Cancelled);
        }

        info!(
            "Forward model finished for {num_profiles} profiles with {} cleanup warnings",
            warnings.len()
        );
        Ok(ForwardReport {
            profiles: num_profiles,
            channels: batch.num_channels,
            warnings,
        })
    }

    /// Check the input dimensions. Returns `None` when there are no channels
    /// to compute.
    fn validate<'a>(
        &self,
        profiles: &[AtmosphericProfile],
        surfaces: &[SurfaceState],
        geometries: &[ViewGeometry],
        sensors: &'a [SensorCatalog],
        options: Option<&[ForwardOptions]>,
        results: &Array2<RadianceResult>,
    ) -> Result<Option<Batch<'a>>, ValidationError> {
        let num_channels: usize = sensors.iter().map(SensorCatalog::num_channels).sum();
        if num_channels == 0 {
            debug!("no channels requested, nothing to do");
            return Ok(None);
        }

        let (rows, columns) = results.dim();
        if rows < num_channels {
            return Err(ValidationError::ResultChannels {
                rows,
                required: num_channels,
            });
        }

        let num_profiles = profiles.len();
        if num_profiles > self.config.max_profiles {
            return Err(ValidationError::TooManyProfiles {
                count: num_profiles,
                max: self.config.max_profiles,
            });
        }

        let lengths = [
            (InputName::Surfaces, Some(surfaces.len())),
            (InputName::Geometries, Some(geometries.len())),
            (InputName::ResultProfiles, Some(columns)),
            (InputName::Options, options.map(<[_]>::len)),
        ];
        for (input, found) in lengths {
            match found {
                Some(found) if found != num_profiles => {
                    return Err(ValidationError::Dimension {
                        input,
                        found,
                        expected: num_profiles,
                    });
                }
                _ => {}
            }
        }

        for sensor in sensors {
            sensor.check_subset()?;
            sensor.check_antenna()?;
        }

        Ok(Some(Batch {
            sensors,
            num_channels,
        }))
    }

    /// Run every sensor and channel of one profile.
    fn run_profile(
        &self,
        batch: &Batch<'_>,
        input: &ProfileInput<'_>,
        geometry: &mut ViewGeometry,
        mut results: ArrayViewMut1<'_, RadianceResult>,
        warnings: &mut Vec<CleanupWarning>,
    ) -> Result<(), ForwardError> {
        let context = &StageContext::profile(input.index);
        let fail = |stage| move |e: BackendError| ForwardError::stage(stage, context, e);

        let options = ResolvedOptions::resolve(input.options, batch.num_channels)
            .map_err(fail(Stage::Options))?;
        if options.check_input {
            input
                .profile
                .check_physical()
                .and_then(|()| input.surface.check_physical())
                .map_err(fail(Stage::InputCheck))?;
        }

        self.physics
            .derive_geometry(geometry)
            .map_err(fail(Stage::Geometry))?;
        let geometry: &ViewGeometry = geometry;

        let (atmosphere, extension) = self
            .extender
            .extend(input.profile)
            .map_err(fail(Stage::Extension))?;
        debug!(
            "{context}: {} layers after adding {} ({:?})",
            atmosphere.num_layers(),
            extension.added_layers(),
            extension.source()
        );

        let workspace = self
            .physics
            .allocate_profile_workspace(&atmosphere)
            .map_err(fail(Stage::Allocation))?;
        let mut profile_workspace = Scoped::new(
            &self.physics,
            P::release_profile_workspace,
            Scope::Profile,
            context,
            workspace,
        );

        let mut optics = CombinedOpticalState::new(
            atmosphere.num_layers(),
            self.config.max_legendre_terms,
            self.config.max_phase_elements,
        );
        let mut surface_optics =
            SurfaceOpticalState::new(self.config.max_angles, self.config.max_stokes);
        self.physics
            .surface_temperature(input.surface, &mut surface_optics);

        // Running channel index across sensors
        let mut ln = 0;
        for sensor in batch.sensors {
            let sensor_context = &context.with_sensor(&sensor.sensor_id);
            let fail = |stage| move |e: BackendError| ForwardError::stage(stage, sensor_context, e);
            debug!("{sensor_context}: {} channels", sensor.num_channels());

            let workspace = self
                .physics
                .allocate_sensor_workspace(&atmosphere, sensor)
                .map_err(fail(Stage::Allocation))?;
            let mut sensor_workspace = Scoped::new(
                &self.physics,
                P::release_sensor_workspace,
                Scope::Sensor,
                sensor_context,
                workspace,
            );
            let predictor = self
                .physics
                .build_predictors(&atmosphere, sensor, geometry, &mut *sensor_workspace)
                .map_err(fail(Stage::Predictors))?;
            let predictor = Scoped::new(
                &self.physics,
                P::release_predictors,
                Scope::Predictor,
                sensor_context,
                predictor,
            );

            let accumulation = ChannelAccumulation {
                physics: &self.physics,
                config: &self.config,
                options: &options,
                atmosphere: &atmosphere,
                geometry,
                sensor,
                context: sensor_context,
            };
            let antenna_fov = correction_fov(&options, sensor, geometry).map(|(_, fov)| fov);

            for channel in sensor.channels() {
                let channel_context = sensor_context.with_channel(channel.sensor_channel());
                let result = &mut results[ln];
                result.reset();
                result.sensor_id.push_str(&sensor.sensor_id);
                result.sensor_channel = channel.sensor_channel();

                let flags = accumulation.run(
                    channel,
                    &*predictor,
                    &mut *sensor_workspace,
                    &mut *profile_workspace,
                    &mut optics,
                )?;
                result.n_full_streams = flags.n_streams;
                result.scattering = flags.scattering;
                result.solar = flags.solar;
                result.visible = flags.visible;

                surface_optics.build(&options, ln, flags.n_streams);
                result.surface_emissivity = surface_optics.sensor_emissivity();
                result.surface_reflectivity = surface_optics.sensor_reflectivity();

                let solve_input = SolveInput {
                    atmosphere: &atmosphere,
                    surface: input.surface,
                    optics: &optics,
                    surface_optics: &surface_optics,
                    geometry,
                    sensor,
                    channel,
                    solar: flags.solar,
                };
                let max_order = if flags.visible {
                    self.config.max_azimuth_order
                } else {
                    0
                };
                fourier::solve_channel(
                    &self.physics,
                    &solve_input,
                    max_order,
                    &mut *sensor_workspace,
                    &channel_context,
                    result,
                )?;

                result.layer_optical_depth.extend(
                    extension
                        .user_layers(optics.num_layers())
                        .map(|layer| optics.optical_depth[layer]),
                );

                if let Some(fov) = antenna_fov {
                    self.physics
                        .apply_antenna_correction(geometry, sensor, channel, fov, result);
                }
                ln += 1;
            }

            collect_warning(warnings, predictor.finish());
            collect_warning(warnings, sensor_workspace.finish());
        }

        collect_warning(warnings, profile_workspace.finish());
        Ok(())
    }
}

fn collect_warning(warnings: &mut Vec<CleanupWarning>, warning: Option<CleanupWarning>) {
    if let Some(warning) = warning {
        warn!("{warning}");
        warnings.push(warning);
    }
}

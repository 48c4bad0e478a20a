//! Per-profile forward options.

use super::sensor::SensorInput;
use crate::error::BackendError;

/// Optional per-profile overrides and switches.
///
/// Override arrays are indexed by the running channel index of the profile:
/// the concatenation of every sensor's selected channels in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOptions {
    /// Replace the model surface emissivity with `emissivity`.
    pub use_emissivity: bool,
    /// Surface emissivity per channel.
    pub emissivity: Vec<f64>,
    /// Replace the direct (solar) surface reflectivity with
    /// `direct_reflectivity`. Only used together with `use_emissivity`.
    pub use_direct_reflectivity: bool,
    /// Direct surface reflectivity per channel.
    pub direct_reflectivity: Vec<f64>,
    /// Apply the antenna correction for sensors that have an antenna pattern.
    pub use_antenna_correction: bool,
    /// Number of streams to use instead of the model's choice.
    pub n_streams: Option<usize>,
    /// Include scattering in the combined optics.
    pub include_scattering: bool,
    /// Check the profile and surface for physical validity.
    pub check_input: bool,
    /// Sensor-specific auxiliary input.
    pub sensor_input: Option<SensorInput>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            use_emissivity: false,
            emissivity: Vec::new(),
            use_direct_reflectivity: false,
            direct_reflectivity: Vec::new(),
            use_antenna_correction: false,
            n_streams: None,
            include_scattering: true,
            check_input: true,
            sensor_input: None,
        }
    }
}

impl ForwardOptions {
    /// Override the surface emissivity.
    pub fn with_emissivity(mut self, emissivity: Vec<f64>) -> Self {
        self.use_emissivity = true;
        self.emissivity = emissivity;
        self
    }

    /// Override the direct surface reflectivity.
    pub fn with_direct_reflectivity(mut self, direct_reflectivity: Vec<f64>) -> Self {
        self.use_direct_reflectivity = true;
        self.direct_reflectivity = direct_reflectivity;
        self
    }

    /// Apply the antenna correction.
    pub fn with_antenna_correction(mut self) -> Self {
        self.use_antenna_correction = true;
        self
    }

    /// Use a fixed number of streams.
    pub fn with_n_streams(mut self, n_streams: usize) -> Self {
        self.n_streams = Some(n_streams);
        self
    }

    /// Exclude scattering from the combined optics.
    pub fn without_scattering(mut self) -> Self {
        self.include_scattering = false;
        self
    }

    /// Skip the physical validity checks.
    pub fn without_input_check(mut self) -> Self {
        self.check_input = false;
        self
    }

    /// Attach sensor-specific input.
    pub fn with_sensor_input(mut self, sensor_input: SensorInput) -> Self {
        self.sensor_input = Some(sensor_input);
        self
    }
}

/// Options for one profile after checking them against its channel count.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedOptions<'a> {
    pub emissivity: Option<&'a [f64]>,
    pub direct_reflectivity: Option<&'a [f64]>,
    pub antenna_correction: bool,
    pub n_streams: Option<usize>,
    pub include_scattering: bool,
    pub check_input: bool,
    pub sensor_input: Option<&'a SensorInput>,
}

impl<'a> ResolvedOptions<'a> {
    /// Resolve the options of a profile with `num_channels` channels. No
    /// options means model surface optics and default switches.
    pub fn resolve(
        options: Option<&'a ForwardOptions>,
        num_channels: usize,
    ) -> Result<Self, BackendError> {
        let Some(options) = options else {
            let defaults = ForwardOptions::default();
            return Ok(Self {
                emissivity: None,
                direct_reflectivity: None,
                antenna_correction: defaults.use_antenna_correction,
                n_streams: defaults.n_streams,
                include_scattering: defaults.include_scattering,
                check_input: defaults.check_input,
                sensor_input: None,
            });
        };

        let mut emissivity = None;
        let mut direct_reflectivity = None;
        if options.use_emissivity {
            if options.emissivity.len() < num_channels {
                return Err(BackendError::new(format!(
                    "emissivity override has {} values, less than the {num_channels} requested channels",
                    options.emissivity.len()
                )));
            }
            emissivity = Some(options.emissivity.as_slice());

            if options.use_direct_reflectivity {
                if options.direct_reflectivity.len() < num_channels {
                    return Err(BackendError::new(format!(
                        "direct reflectivity override has {} values, less than the {num_channels} requested channels",
                        options.direct_reflectivity.len()
                    )));
                }
                direct_reflectivity = Some(options.direct_reflectivity.as_slice());
            }
        }

        Ok(Self {
            emissivity,
            direct_reflectivity,
            antenna_correction: options.use_antenna_correction,
            n_streams: options.n_streams,
            include_scattering: options.include_scattering,
            check_input: options.check_input,
            sensor_input: options.sensor_input.as_ref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_options_use_model_surface() {
        let resolved = ResolvedOptions::resolve(None, 5).unwrap();
        assert!(resolved.emissivity.is_none());
        assert!(resolved.direct_reflectivity.is_none());
        assert!(!resolved.antenna_correction);
        assert!(resolved.include_scattering);
        assert!(resolved.check_input);
    }

    #[test]
    fn short_emissivity_is_an_error() {
        let options = ForwardOptions::default().with_emissivity(vec![0.9, 0.9]);
        assert!(ResolvedOptions::resolve(Some(&options), 3).is_err());
        assert!(ResolvedOptions::resolve(Some(&options), 2).is_ok());
    }

    #[test]
    fn short_array_is_fine_without_the_switch() {
        let options = ForwardOptions {
            emissivity: vec![0.9],
            ..ForwardOptions::default()
        };
        let resolved = ResolvedOptions::resolve(Some(&options), 3).unwrap();
        assert!(resolved.emissivity.is_none());
    }

    #[test]
    fn direct_reflectivity_needs_emissivity_override() {
        let options = ForwardOptions::default().with_direct_reflectivity(vec![0.1]);
        let resolved = ResolvedOptions::resolve(Some(&options), 1).unwrap();
        assert!(resolved.direct_reflectivity.is_none());

        let options = options.with_emissivity(vec![0.9]);
        let resolved = ResolvedOptions::resolve(Some(&options), 1).unwrap();
        assert_eq!(resolved.direct_reflectivity, Some(&[0.1][..]));
    }
}

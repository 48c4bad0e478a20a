//! Errors and warnings reported by the forward model.

use std::fmt;

use thiserror::Error;

/// Possible forward-model errors.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The inputs don't have the expected shape(s). Detected before any
    /// profile is processed.
    #[error("invalid inputs: {0}")]
    Validation(#[from] ValidationError),
    /// A pipeline stage failed for a specific profile/sensor/channel.
    #[error("{stage} failed for {context}: {source}")]
    Stage {
        /// The stage that failed
        stage: Stage,
        /// Where in the loop nest it failed
        context: StageContext,
        /// The collaborator's own error
        #[source]
        source: BackendError,
    },
    /// The operation was aborted early because another profile failed
    #[error("operation cancelled early")]
    Cancelled,
}

impl ForwardError {
    pub(crate) fn stage(stage: Stage, context: &StageContext, source: BackendError) -> Self {
        Self::Stage {
            stage,
            context: context.clone(),
            source,
        }
    }

    /// The failing stage, if this is a stage error.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Input dimension and consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The results container has fewer channel rows than requested channels
    #[error("results have {rows} channel rows, but {required} channels were requested")]
    ResultChannels {
        /// Rows in the results container
        rows: usize,
        /// Total requested channels across all sensors
        required: usize,
    },
    /// Too many profiles in one call
    #[error("{count} profiles exceeds the maximum of {max}")]
    TooManyProfiles {
        /// Number of profiles passed in
        count: usize,
        /// Configured maximum
        max: usize,
    },
    /// A per-profile input has the wrong length
    #[error("{input} dimension ({found}) does not match the number of profiles ({expected})")]
    Dimension {
        /// Which input mismatched
        input: InputName,
        /// Its length
        found: usize,
        /// The profile count
        expected: usize,
    },
    /// A sensor's channel subset refers to a channel it doesn't define
    #[error("sensor {sensor} selects channel index {index}, but only {available} are defined")]
    ChannelSubset {
        /// Sensor identifier
        sensor: String,
        /// Offending index into the sensor's channel coefficients
        index: usize,
        /// Number of channel coefficients defined
        available: usize,
    },
    /// A sensor's antenna pattern doesn't cover all of its channels
    #[error("sensor {sensor} antenna pattern covers {found} channels, but {required} are defined")]
    AntennaChannels {
        /// Sensor identifier
        sensor: String,
        /// Channel columns in the antenna pattern
        found: usize,
        /// Number of channel coefficients defined
        required: usize,
    },
    /// An invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Per-profile inputs whose length is checked against the profile count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputName {
    /// Surface states
    Surfaces,
    /// Viewing geometries
    Geometries,
    /// Profile dimension of the results container
    ResultProfiles,
    /// Per-profile options
    Options,
}

impl InputName {
    /// Name used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Surfaces => "Surface",
            Self::Geometries => "Geometry",
            Self::ResultProfiles => "RTSolution profile",
            Self::Options => "Options",
        }
    }
}

impl fmt::Display for InputName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named stage of the forward pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Physical validity of the profile and surface
    InputCheck,
    /// Resolution of per-profile options
    Options,
    /// Derivation of the viewing geometry
    Geometry,
    /// Atmosphere extension to the top of the atmosphere
    Extension,
    /// Workspace allocation
    Allocation,
    /// Predictor construction
    Predictors,
    /// Stream count determination
    StreamCount,
    /// Gas absorption
    Absorption,
    /// Molecular (Rayleigh) scattering
    MolecularScatter,
    /// Cloud scattering
    CloudScatter,
    /// Aerosol scattering
    AerosolScatter,
    /// Radiative transfer solution
    Solve,
}

impl Stage {
    /// Name used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputCheck => "input check",
            Self::Options => "options",
            Self::Geometry => "geometry",
            Self::Extension => "atmosphere extension",
            Self::Allocation => "workspace allocation",
            Self::Predictors => "predictors",
            Self::StreamCount => "stream count",
            Self::Absorption => "gas absorption",
            Self::MolecularScatter => "molecular scattering",
            Self::CloudScatter => "cloud scattering",
            Self::AerosolScatter => "aerosol scattering",
            Self::Solve => "RT solution",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location within the profile/sensor/channel/order loop nest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageContext {
    /// Profile index (0-based)
    pub profile: usize,
    /// Sensor identifier
    pub sensor: Option<String>,
    /// Sensor channel number
    pub channel: Option<usize>,
    /// Fourier order
    pub fourier_order: Option<usize>,
}

impl StageContext {
    pub(crate) fn profile(profile: usize) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub(crate) fn with_sensor(&self, sensor: &str) -> Self {
        Self {
            sensor: Some(sensor.to_string()),
            channel: None,
            fourier_order: None,
            ..*self
        }
    }

    pub(crate) fn with_channel(&self, channel: usize) -> Self {
        Self {
            sensor: self.sensor.clone(),
            channel: Some(channel),
            fourier_order: None,
            ..*self
        }
    }

    pub(crate) fn with_fourier_order(&self, order: usize) -> Self {
        Self {
            sensor: self.sensor.clone(),
            fourier_order: Some(order),
            ..*self
        }
    }
}

impl fmt::Display for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "profile {}", self.profile)?;
        if let Some(sensor) = &self.sensor {
            write!(f, ", sensor {sensor}")?;
        }
        if let Some(channel) = self.channel {
            write!(f, ", channel {channel}")?;
        }
        if let Some(order) = self.fourier_order {
            write!(f, ", Fourier order {order}")?;
        }
        Ok(())
    }
}

/// Error returned by a physics collaborator.
///
/// The driver attaches the stage and loop context, so this only carries the
/// collaborator's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Scope that owns a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Released at profile-loop exit
    Profile,
    /// Released at sensor-loop exit
    Sensor,
    /// Predictors, released at sensor-loop exit
    Predictor,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Profile => "profile",
            Self::Sensor => "sensor",
            Self::Predictor => "predictor",
        })
    }
}

/// A workspace release that failed. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    /// Scope of the workspace
    pub scope: Scope,
    /// Where it was released
    pub context: StageContext,
    /// The collaborator's message
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "releasing {} workspace failed for {}: {}",
            self.scope, self.context, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_mismatch_names_the_input() {
        let e: ForwardError = ValidationError::Dimension {
            input: InputName::Options,
            found: 2,
            expected: 3,
        }
        .into();
        assert_eq!(
            e.to_string(),
            "invalid inputs: Options dimension (2) does not match the number of profiles (3)"
        );
    }

    #[test]
    fn stage_error_carries_context() {
        let context = StageContext::profile(4)
            .with_sensor("amsua_n19")
            .with_channel(7)
            .with_fourier_order(2);
        let e = ForwardError::stage(Stage::Solve, &context, BackendError::new("diverged"));
        assert_eq!(
            e.to_string(),
            "RT solution failed for profile 4, sensor amsua_n19, channel 7, Fourier order 2: diverged"
        );
        assert_eq!(e.failed_stage(), Some(Stage::Solve));
    }

    #[test]
    fn sensor_context_clears_channel() {
        let context = StageContext::profile(0).with_sensor("a").with_channel(3);
        let next = context.with_sensor("b");
        assert_eq!(next.channel, None);
        assert_eq!(next.sensor.as_deref(), Some("b"));
    }
}

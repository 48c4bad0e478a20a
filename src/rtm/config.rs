//! Tunable limits for the forward model.

use crate::error::ValidationError;

/// Default maximum number of profiles per call.
pub const MAX_N_PROFILES: usize = 10_000;
/// Default maximum number of Legendre terms (streams).
pub const MAX_N_LEGENDRE_TERMS: usize = 16;
/// Default maximum number of phase matrix elements.
pub const MAX_N_PHASE_ELEMENTS: usize = 1;
/// Default maximum number of Stokes components.
pub const MAX_N_STOKES: usize = 4;
/// Default maximum number of angles in one hemisphere.
pub const MAX_N_ANGLES: usize = 16;
/// Default maximum azimuthal Fourier order.
pub const MAX_N_AZIMUTH_FOURIER: usize = 16;
/// Default maximum source zenith angle in degrees for the sun to count as
/// "active".
pub const MAX_SOURCE_ZENITH_ANGLE: f64 = 89.0;

/// Streams needed by the Rayleigh phase function (orders 0, 1 and 2).
pub(crate) const RAYLEIGH_STREAMS: usize = 4;

/// Limits that bound the forward computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardConfig {
    /// Maximum number of profiles accepted in one call.
    pub max_profiles: usize,
    /// Maximum number of Legendre terms in the phase function expansion.
    pub max_legendre_terms: usize,
    /// Maximum number of phase matrix elements.
    pub max_phase_elements: usize,
    /// Maximum number of Stokes components.
    pub max_stokes: usize,
    /// Maximum number of quadrature angles in one hemisphere.
    pub max_angles: usize,
    /// Azimuthal Fourier order evaluated up to (inclusive) for visible
    /// channels with an active sun.
    pub max_azimuth_order: usize,
    /// Solar zenith angle in degrees below which the sun is active.
    pub max_solar_zenith: f64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_profiles: MAX_N_PROFILES,
            max_legendre_terms: MAX_N_LEGENDRE_TERMS,
            max_phase_elements: MAX_N_PHASE_ELEMENTS,
            max_stokes: MAX_N_STOKES,
            max_angles: MAX_N_ANGLES,
            max_azimuth_order: MAX_N_AZIMUTH_FOURIER,
            max_solar_zenith: MAX_SOURCE_ZENITH_ANGLE,
        }
    }
}

impl ForwardConfig {
    /// Check that the limits are usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |message: &str| Err(ValidationError::Config(message.to_string()));

        if self.max_profiles == 0 {
            return invalid("max_profiles must be positive");
        }
        if self.max_legendre_terms < RAYLEIGH_STREAMS {
            return invalid("max_legendre_terms must allow the 4 Rayleigh streams");
        }
        if self.max_phase_elements == 0 {
            return invalid("max_phase_elements must be positive");
        }
        if !(1..=4).contains(&self.max_stokes) {
            return invalid("max_stokes must be between 1 and 4");
        }
        if self.max_angles < RAYLEIGH_STREAMS / 2 {
            return invalid("max_angles must allow the 4 Rayleigh streams");
        }
        if !(self.max_solar_zenith > 0.0 && self.max_solar_zenith <= 90.0) {
            return invalid("max_solar_zenith must be in (0, 90] degrees");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ForwardConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_too_few_legendre_terms() {
        let config = ForwardConfig {
            max_legendre_terms: 2,
            ..ForwardConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Config(_))));
    }

    #[test]
    fn rejects_solar_zenith_out_of_range() {
        for max_solar_zenith in [0.0, -1.0, 95.0, f64::NAN] {
            let config = ForwardConfig {
                max_solar_zenith,
                ..ForwardConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }
}

//! Surface state and per-channel surface optics.

use ndarray::Array2;

use super::options::ResolvedOptions;
use crate::error::BackendError;

/// Tolerance on the total surface coverage.
const COVERAGE_TOLERANCE: f64 = 1.0e-6;

/// Surface type mixture for one profile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceState {
    /// Fraction of land.
    pub land_coverage: f64,
    /// Fraction of open water.
    pub water_coverage: f64,
    /// Fraction of snow.
    pub snow_coverage: f64,
    /// Fraction of sea ice.
    pub ice_coverage: f64,
    /// Land skin temperature in K.
    pub land_temperature: f64,
    /// Water skin temperature in K.
    pub water_temperature: f64,
    /// Snow skin temperature in K.
    pub snow_temperature: f64,
    /// Ice skin temperature in K.
    pub ice_temperature: f64,
}

impl SurfaceState {
    /// A surface entirely of open water.
    pub fn water(temperature: f64) -> Self {
        Self {
            water_coverage: 1.0,
            water_temperature: temperature,
            ..Self::default()
        }
    }

    /// A surface entirely of land.
    pub fn land(temperature: f64) -> Self {
        Self {
            land_coverage: 1.0,
            land_temperature: temperature,
            ..Self::default()
        }
    }

    fn coverages(&self) -> [(f64, f64); 4] {
        [
            (self.land_coverage, self.land_temperature),
            (self.water_coverage, self.water_temperature),
            (self.snow_coverage, self.snow_temperature),
            (self.ice_coverage, self.ice_temperature),
        ]
    }

    /// Coverage-weighted skin temperature in K.
    pub fn effective_temperature(&self) -> f64 {
        self.coverages().iter().map(|(f, t)| f * t).sum()
    }

    /// Check that the coverages and temperatures are physically valid.
    pub fn check_physical(&self) -> Result<(), BackendError> {
        let coverages = self.coverages();
        if coverages.iter().any(|(f, _)| !(0.0..=1.0).contains(f)) {
            return Err(BackendError::new("surface coverages must be in [0, 1]"));
        }
        let total: f64 = coverages.iter().map(|(f, _)| f).sum();
        if total > 1.0 + COVERAGE_TOLERANCE {
            return Err(BackendError::new(format!("total surface coverage {total} exceeds 1")));
        }
        if coverages.iter().any(|&(f, t)| f > 0.0 && !(t > 0.0)) {
            return Err(BackendError::new("surface temperatures must be positive"));
        }
        Ok(())
    }
}

/// Surface emissivity and reflectivity for one channel.
///
/// The tensors are indexed by (angle, Stokes component). Angle `0` is the
/// sensor viewing angle and angles `1..num_angles` are the solver's
/// quadrature angles.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOpticalState {
    compute: bool,
    num_angles: usize,
    /// Effective surface temperature in K.
    pub temperature: f64,
    /// Emissivity.
    pub emissivity: Array2<f64>,
    /// Diffuse reflectivity.
    pub reflectivity: Array2<f64>,
    /// Direct (solar) reflectivity.
    pub direct_reflectivity: Array2<f64>,
}

impl SurfaceOpticalState {
    /// Allocate for up to `max_angles` quadrature angles and `max_stokes`
    /// Stokes components.
    pub fn new(max_angles: usize, max_stokes: usize) -> Self {
        let shape = [max_angles + 1, max_stokes];
        Self {
            compute: true,
            num_angles: 1,
            temperature: 0.0,
            emissivity: Array2::zeros(shape),
            reflectivity: Array2::zeros(shape),
            direct_reflectivity: Array2::zeros(shape),
        }
    }

    /// Whether the solver computes surface optics from its own model. When
    /// false, the caller's override has been applied here.
    pub fn is_computed(&self) -> bool {
        self.compute
    }

    /// Number of angles in use, including the sensor angle.
    pub fn num_angles(&self) -> usize {
        self.num_angles
    }

    /// Emissivity at the sensor angle for the first Stokes component.
    pub fn sensor_emissivity(&self) -> f64 {
        self.emissivity[[0, 0]]
    }

    /// Reflectivity at the sensor angle for the first Stokes component.
    pub fn sensor_reflectivity(&self) -> f64 {
        self.reflectivity[[0, 0]]
    }

    /// Direct reflectivity at the sensor angle for the first Stokes component.
    pub fn sensor_direct_reflectivity(&self) -> f64 {
        self.direct_reflectivity[[0, 0]]
    }

    /// Set the emissivity, reflectivity and direct reflectivity of the first
    /// Stokes component for every angle in use.
    pub fn set_intensity(&mut self, emissivity: f64, reflectivity: f64, direct_reflectivity: f64) {
        for angle in 0..self.num_angles {
            self.emissivity[[angle, 0]] = emissivity;
            self.reflectivity[[angle, 0]] = reflectivity;
            self.direct_reflectivity[[angle, 0]] = direct_reflectivity;
        }
    }

    /// Average the skin temperatures over the surface types.
    pub(crate) fn set_temperature(&mut self, surface: &SurfaceState) {
        self.temperature = surface.effective_temperature();
    }

    /// Reset the channel's surface optics and apply any caller override.
    ///
    /// `channel_index` is the running channel index within the profile.
    /// `n_streams` sets the number of quadrature angles in use.
    pub(crate) fn build(
        &mut self,
        options: &ResolvedOptions<'_>,
        channel_index: usize,
        n_streams: usize,
    ) {
        self.compute = true;
        self.num_angles = (n_streams / 2 + 1).min(self.emissivity.nrows());
        self.emissivity.fill(0.0);
        self.reflectivity.fill(0.0);
        self.direct_reflectivity.fill(0.0);

        let Some(emissivity) = options.emissivity else {
            return;
        };
        self.compute = false;

        let emissivity = emissivity[channel_index];
        let reflectivity = 1.0 - emissivity;
        let direct = options
            .direct_reflectivity
            .map_or(reflectivity, |direct| direct[channel_index]);
        self.set_intensity(emissivity, reflectivity, direct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtm::options::ForwardOptions;
    use approx::assert_relative_eq;

    #[test]
    fn averages_skin_temperature() {
        let surface = SurfaceState {
            land_coverage: 0.25,
            water_coverage: 0.75,
            land_temperature: 300.0,
            water_temperature: 280.0,
            ..SurfaceState::default()
        };
        assert_relative_eq!(surface.effective_temperature(), 285.0);
        assert!(surface.check_physical().is_ok());
    }

    #[test]
    fn rejects_excess_coverage() {
        let surface = SurfaceState {
            snow_coverage: 0.5,
            snow_temperature: 260.0,
            ..SurfaceState::land(290.0)
        };
        assert!(surface.check_physical().is_err());
    }

    #[test]
    fn emissivity_override_derives_reflectivity() {
        let options = ForwardOptions::default().with_emissivity(vec![0.95]);
        let resolved = ResolvedOptions::resolve(Some(&options), 1).unwrap();
        let mut sfc = SurfaceOpticalState::new(16, 4);
        sfc.build(&resolved, 0, 4);

        assert!(!sfc.is_computed());
        assert_eq!(sfc.num_angles(), 3);
        assert_relative_eq!(sfc.sensor_emissivity(), 0.95);
        assert_relative_eq!(sfc.sensor_reflectivity(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(sfc.sensor_direct_reflectivity(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(sfc.emissivity[[2, 0]], 0.95);
    }

    #[test]
    fn direct_reflectivity_override_is_used_verbatim() {
        let options = ForwardOptions::default()
            .with_emissivity(vec![0.9, 0.8])
            .with_direct_reflectivity(vec![0.3, 0.4]);
        let resolved = ResolvedOptions::resolve(Some(&options), 2).unwrap();
        let mut sfc = SurfaceOpticalState::new(16, 4);
        sfc.build(&resolved, 1, 0);

        assert_relative_eq!(sfc.sensor_emissivity(), 0.8);
        assert_relative_eq!(sfc.sensor_reflectivity(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(sfc.sensor_direct_reflectivity(), 0.4);
    }

    #[test]
    fn no_override_computes_from_model() {
        let resolved = ResolvedOptions::resolve(None, 1).unwrap();
        let mut sfc = SurfaceOpticalState::new(16, 4);
        sfc.set_intensity(0.5, 0.5, 0.5);
        sfc.build(&resolved, 0, 0);
        assert!(sfc.is_computed());
        assert_eq!(sfc.sensor_emissivity(), 0.0);
    }
}

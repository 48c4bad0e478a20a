//! Viewing geometry.

use crate::error::BackendError;

/// Viewing geometry for one profile.
///
/// The angles are inputs; [`DerivedGeometry`] is filled in by geometry
/// derivation before the sensor loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewGeometry {
    /// Sensor zenith angle at the surface in degrees.
    pub sensor_zenith: f64,
    /// Sensor azimuth angle in degrees from north.
    pub sensor_azimuth: f64,
    /// Source (solar) zenith angle in degrees.
    pub source_zenith: f64,
    /// Source (solar) azimuth angle in degrees from north.
    pub source_azimuth: f64,
    /// Scan position as a field-of-view index, or `None` for the nominal
    /// boresight view.
    pub field_of_view: Option<usize>,
    /// Quantities computed from the angles.
    pub derived: DerivedGeometry,
}

/// Quantities derived from the viewing angles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedGeometry {
    /// Secant of the sensor zenith angle, the slant path length factor.
    pub secant_sensor_zenith: f64,
    /// Secant of the source zenith angle, or zero when the sun is below the
    /// horizon.
    pub secant_source_zenith: f64,
    /// Cosine of the source zenith angle, clamped at zero.
    pub cos_source_zenith: f64,
    /// Difference between sensor and source azimuth in radians.
    pub relative_azimuth: f64,
}

impl ViewGeometry {
    /// Create a geometry for a sensor zenith angle, with the sun below the
    /// horizon.
    pub fn with_sensor_zenith(sensor_zenith: f64) -> Self {
        Self {
            sensor_zenith,
            source_zenith: 180.0,
            ..Self::default()
        }
    }

    /// Compute the derived fields in place.
    pub fn derive(&mut self) -> Result<(), BackendError> {
        if !(0.0..90.0).contains(&self.sensor_zenith) {
            return Err(BackendError::new(format!(
                "sensor zenith angle {} is outside [0, 90) degrees",
                self.sensor_zenith
            )));
        }
        if !(0.0..=180.0).contains(&self.source_zenith) {
            return Err(BackendError::new(format!(
                "source zenith angle {} is outside [0, 180] degrees",
                self.source_zenith
            )));
        }

        let cos_source = self.source_zenith.to_radians().cos();
        self.derived = DerivedGeometry {
            secant_sensor_zenith: 1.0 / self.sensor_zenith.to_radians().cos(),
            secant_source_zenith: if cos_source > 0.0 { 1.0 / cos_source } else { 0.0 },
            cos_source_zenith: cos_source.max(0.0),
            relative_azimuth: (self.sensor_azimuth - self.source_azimuth).to_radians(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn derives_secants() {
        let mut geometry = ViewGeometry {
            sensor_zenith: 60.0,
            source_zenith: 60.0,
            sensor_azimuth: 100.0,
            source_azimuth: 10.0,
            ..ViewGeometry::default()
        };
        geometry.derive().unwrap();
        assert_relative_eq!(geometry.derived.secant_sensor_zenith, 2.0, epsilon = 1e-12);
        assert_relative_eq!(geometry.derived.secant_source_zenith, 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            geometry.derived.relative_azimuth,
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn sun_below_horizon_has_no_path() {
        let mut geometry = ViewGeometry::with_sensor_zenith(0.0);
        geometry.derive().unwrap();
        assert_eq!(geometry.derived.secant_source_zenith, 0.0);
        assert_eq!(geometry.derived.cos_source_zenith, 0.0);
    }

    #[test]
    fn rejects_grazing_view() {
        let mut geometry = ViewGeometry::with_sensor_zenith(90.0);
        assert!(geometry.derive().is_err());
    }
}

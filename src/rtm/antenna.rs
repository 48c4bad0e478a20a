//! Antenna pattern correction for microwave sounders.

use ndarray::Array2;

use super::geometry::ViewGeometry;
use super::options::ResolvedOptions;
use super::sensor::{ChannelRef, SensorCatalog};
use super::RadianceResult;
use crate::error::ValidationError;

/// Cosmic background temperature in K.
const T_COSMIC: f64 = 2.7253;

/// Antenna efficiencies per (field of view, channel).
///
/// The channel axis is indexed like the sensor's channel coefficients, not
/// its selected subset.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaPattern {
    a_earth: Array2<f64>,
    a_space: Array2<f64>,
    a_platform: Array2<f64>,
}

impl AntennaPattern {
    /// Earth, cold-space and platform efficiencies, each shaped as
    /// (`num_fovs`, `num_channels`).
    pub fn new(
        a_earth: Array2<f64>,
        a_space: Array2<f64>,
        a_platform: Array2<f64>,
    ) -> Result<Self, ValidationError> {
        if a_earth.dim() != a_space.dim() || a_earth.dim() != a_platform.dim() {
            return Err(ValidationError::Config(
                "antenna efficiency tables have different shapes".to_string(),
            ));
        }
        Ok(Self {
            a_earth,
            a_space,
            a_platform,
        })
    }

    /// Number of fields of view.
    pub fn num_fovs(&self) -> usize {
        self.a_earth.nrows()
    }

    /// Number of channel columns.
    pub fn num_channels(&self) -> usize {
        self.a_earth.ncols()
    }

    /// Correct a result for the antenna pattern at field of view `fov`.
    ///
    /// Converts the main-beam brightness temperature to the antenna
    /// temperature and re-derives the radiance from it. Assumes `fov` is
    /// below [`AntennaPattern::num_fovs`] and the sensor passed
    /// [`SensorCatalog::check_antenna`].
    pub fn correct(&self, fov: usize, channel: ChannelRef<'_>, result: &mut RadianceResult) {
        let index = [fov, channel.coefficient_index];
        let a_earth = self.a_earth[index];
        let a_space = self.a_space[index];
        let a_platform = self.a_platform[index];

        let tb = result.brightness_temperature;
        let tb_antenna = (a_earth + a_platform) * tb + a_space * T_COSMIC;
        result.brightness_temperature = tb_antenna;
        result.radiance = channel.coefficients.planck_radiance(tb_antenna);
    }
}

/// The field of view to correct at, if the correction applies: the caller
/// asked for it, the sensor has an antenna pattern, and the scan position is
/// a valid field of view.
pub(crate) fn correction_fov<'a>(
    options: &ResolvedOptions<'_>,
    sensor: &'a SensorCatalog,
    geometry: &ViewGeometry,
) -> Option<(&'a AntennaPattern, usize)> {
    if !options.antenna_correction {
        return None;
    }
    let pattern = sensor.antenna.as_ref()?;
    let fov = geometry.field_of_view?;
    (fov < pattern.num_fovs()).then_some((pattern, fov))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtm::options::ForwardOptions;
    use crate::rtm::sensor::{ChannelCoefficients, SensorKind};
    use approx::assert_relative_eq;

    fn sensor() -> SensorCatalog {
        let pattern = AntennaPattern::new(
            Array2::from_elem([30, 2], 0.97),
            Array2::from_elem([30, 2], 0.02),
            Array2::from_elem([30, 2], 0.01),
        )
        .unwrap();
        SensorCatalog::new(
            "amsua_n19",
            SensorKind::Microwave,
            vec![
                ChannelCoefficients::from_frequency(1, 23.8),
                ChannelCoefficients::from_frequency(2, 31.4),
            ],
        )
        .with_antenna(pattern)
    }

    #[test]
    fn applies_only_to_valid_fields_of_view() {
        let sensor = sensor();
        let options = ForwardOptions::default().with_antenna_correction();
        let resolved = ResolvedOptions::resolve(Some(&options), 2).unwrap();

        let mut geometry = ViewGeometry::with_sensor_zenith(10.0);
        assert!(correction_fov(&resolved, &sensor, &geometry).is_none());

        geometry.field_of_view = Some(30);
        assert!(correction_fov(&resolved, &sensor, &geometry).is_none());

        geometry.field_of_view = Some(15);
        assert_eq!(correction_fov(&resolved, &sensor, &geometry).map(|(_, fov)| fov), Some(15));

        let resolved = ResolvedOptions::resolve(None, 2).unwrap();
        assert!(correction_fov(&resolved, &sensor, &geometry).is_none());
    }

    #[test]
    fn corrects_brightness_temperature() {
        let sensor = sensor();
        let channel = sensor.channels().nth(1).unwrap();
        let mut result = RadianceResult {
            brightness_temperature: 250.0,
            ..RadianceResult::default()
        };
        sensor.antenna.as_ref().unwrap().correct(3, channel, &mut result);

        assert_relative_eq!(result.brightness_temperature, 0.98 * 250.0 + 0.02 * T_COSMIC);
        assert_relative_eq!(
            channel.coefficients.brightness_temperature(result.radiance),
            result.brightness_temperature,
            epsilon = 1e-9
        );
    }

    #[test]
    fn narrow_pattern_fails_the_catalog_check() {
        assert_eq!(sensor().check_antenna(), Ok(()));

        let pattern = AntennaPattern::new(
            Array2::from_elem([30, 1], 0.97),
            Array2::from_elem([30, 1], 0.02),
            Array2::from_elem([30, 1], 0.01),
        )
        .unwrap();
        let sensor = sensor().with_antenna(pattern);
        assert_eq!(
            sensor.check_antenna(),
            Err(ValidationError::AntennaChannels {
                sensor: "amsua_n19".to_string(),
                found: 1,
                required: 2,
            })
        );

        let bare = SensorCatalog::new("bare", SensorKind::Microwave, Vec::new());
        assert_eq!(bare.check_antenna(), Ok(()));
    }
}

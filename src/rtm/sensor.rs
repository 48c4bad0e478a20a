//! Sensor channel catalogs.
//!
//! A [`SensorCatalog`] holds the coefficients for every channel of one sensor
//! along with the subset of channels a forward call computes. Catalogs are
//! passed to the driver explicitly and shared read-only across profiles.

use smallvec::SmallVec;

use super::antenna::AntennaPattern;
use super::planck;
use crate::error::ValidationError;

/// Conversion from frequency in GHz to wavenumber in cm⁻¹.
const GHZ_TO_INVERSE_CM: f64 = 1.0 / 29.9792458;

/// Spectral band of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Microwave radiometer
    Microwave,
    /// Infrared radiometer
    Infrared,
    /// Visible radiometer
    Visible,
    /// Ultraviolet radiometer
    Ultraviolet,
}

impl SensorKind {
    /// Whether the sensor measures reflected sunlight, requiring the
    /// azimuthal Fourier expansion.
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible | Self::Ultraviolet)
    }

    /// Whether channel radiances convert to brightness temperatures.
    pub fn has_brightness_temperature(self) -> bool {
        matches!(self, Self::Microwave | Self::Infrared)
    }

    /// Parse a sensor kind name (case insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "microwave" | "mw" => Some(Self::Microwave),
            "infrared" | "ir" => Some(Self::Infrared),
            "visible" | "vis" => Some(Self::Visible),
            "ultraviolet" | "uv" => Some(Self::Ultraviolet),
            _ => None,
        }
    }
}

/// Spectral coefficients for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCoefficients {
    /// Channel number as the sensor defines it.
    pub sensor_channel: usize,
    /// Central wavenumber in cm⁻¹.
    pub wavenumber: f64,
    /// First Planck coefficient, `C_1 * wavenumber³`.
    pub planck_c1: f64,
    /// Second Planck coefficient, `C_2 * wavenumber`.
    pub planck_c2: f64,
    /// Band correction offset in K.
    pub band_c1: f64,
    /// Band correction slope.
    pub band_c2: f64,
    /// Top-of-atmosphere solar irradiance in mW/(m² cm⁻¹). Zero when the
    /// channel has no solar contribution.
    pub solar_irradiance: f64,
    /// Gas absorption coefficients, one per predictor.
    pub absorption: SmallVec<[f64; 4]>,
}

impl ChannelCoefficients {
    /// Coefficients for a monochromatic channel at `wavenumber`.
    pub fn new(sensor_channel: usize, wavenumber: f64) -> Self {
        Self {
            sensor_channel,
            wavenumber,
            planck_c1: planck::C_1 * wavenumber.powi(3),
            planck_c2: planck::C_2 * wavenumber,
            band_c1: 0.0,
            band_c2: 1.0,
            solar_irradiance: 0.0,
            absorption: SmallVec::new(),
        }
    }

    /// Coefficients for a monochromatic channel at `frequency` in GHz.
    pub fn from_frequency(sensor_channel: usize, frequency: f64) -> Self {
        Self::new(sensor_channel, frequency * GHZ_TO_INVERSE_CM)
    }

    /// Set the band correction.
    pub fn with_band_correction(mut self, band_c1: f64, band_c2: f64) -> Self {
        self.band_c1 = band_c1;
        self.band_c2 = band_c2;
        self
    }

    /// Set the solar irradiance.
    pub fn with_solar_irradiance(mut self, solar_irradiance: f64) -> Self {
        self.solar_irradiance = solar_irradiance;
        self
    }

    /// Set the gas absorption coefficients.
    pub fn with_absorption(mut self, absorption: &[f64]) -> Self {
        self.absorption = SmallVec::from_slice(absorption);
        self
    }

    /// Planck radiance at temperature `t` in K.
    pub fn planck_radiance(&self, t: f64) -> f64 {
        planck::radiance(self.planck_c1, self.planck_c2, self.band_c1, self.band_c2, t)
    }

    /// Brightness temperature in K of a radiance.
    pub fn brightness_temperature(&self, radiance: f64) -> f64 {
        planck::temperature(
            self.planck_c1,
            self.planck_c2,
            self.band_c1,
            self.band_c2,
            radiance,
        )
    }
}

/// Channels of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCatalog {
    /// Sensor identifier, e.g. `amsua_n19`.
    pub sensor_id: String,
    /// Spectral band.
    pub kind: SensorKind,
    /// Coefficients for every channel the sensor defines.
    pub coefficients: Vec<ChannelCoefficients>,
    /// Indices into `coefficients` of the channels to compute, in output
    /// order.
    pub selected: Vec<usize>,
    /// Antenna pattern, for sensors that have one.
    pub antenna: Option<AntennaPattern>,
}

impl SensorCatalog {
    /// A catalog that computes every channel.
    pub fn new(
        sensor_id: impl Into<String>,
        kind: SensorKind,
        coefficients: Vec<ChannelCoefficients>,
    ) -> Self {
        let selected = (0..coefficients.len()).collect();
        Self {
            sensor_id: sensor_id.into(),
            kind,
            coefficients,
            selected,
            antenna: None,
        }
    }

    /// Compute only a subset of the channels.
    pub fn with_subset(mut self, selected: Vec<usize>) -> Self {
        self.selected = selected;
        self
    }

    /// Attach an antenna pattern.
    pub fn with_antenna(mut self, antenna: AntennaPattern) -> Self {
        self.antenna = Some(antenna);
        self
    }

    /// Number of channels to compute.
    pub fn num_channels(&self) -> usize {
        self.selected.len()
    }

    /// Check the channel subset against the channels defined.
    pub fn check_subset(&self) -> Result<(), ValidationError> {
        let available = self.coefficients.len();
        match self.selected.iter().find(|&&i| i >= available) {
            Some(&index) => Err(ValidationError::ChannelSubset {
                sensor: self.sensor_id.clone(),
                index,
                available,
            }),
            None => Ok(()),
        }
    }

    /// Check that the antenna pattern, if any, has a column for every
    /// channel the sensor defines.
    pub fn check_antenna(&self) -> Result<(), ValidationError> {
        match &self.antenna {
            Some(pattern) if pattern.num_channels() < self.coefficients.len() => {
                Err(ValidationError::AntennaChannels {
                    sensor: self.sensor_id.clone(),
                    found: pattern.num_channels(),
                    required: self.coefficients.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// The selected channels, in output order.
    ///
    /// Assumes [`SensorCatalog::check_subset`] passed.
    pub fn channels(&self) -> impl Iterator<Item = ChannelRef<'_>> + '_ {
        self.selected
            .iter()
            .enumerate()
            .map(|(position, &coefficient_index)| ChannelRef {
                position,
                coefficient_index,
                coefficients: &self.coefficients[coefficient_index],
            })
    }
}

/// One selected channel of a sensor.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRef<'a> {
    /// Position within the sensor's selected channels.
    pub position: usize,
    /// Index into the sensor's channel coefficients.
    pub coefficient_index: usize,
    /// The channel's coefficients.
    pub coefficients: &'a ChannelCoefficients,
}

impl ChannelRef<'_> {
    /// Channel number as the sensor defines it.
    pub fn sensor_channel(&self) -> usize {
        self.coefficients.sensor_channel
    }

    /// Central wavenumber in cm⁻¹.
    pub fn wavenumber(&self) -> f64 {
        self.coefficients.wavenumber
    }
}

/// Zeeman-splitting input for upper-atmosphere oxygen channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeemanInput {
    /// Earth magnetic field strength in Gauss.
    pub field_strength: f64,
    /// Cosine of the angle between the field and the propagation direction.
    pub cos_theta_b: f64,
    /// Doppler shift in kHz.
    pub doppler_shift: f64,
}

/// Auxiliary input for stratospheric sounders with a pressure-modulated
/// gas cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPressureInput {
    /// Observation time as a decimal year.
    pub time: f64,
    /// Cell pressure in hPa.
    pub cell_pressure: f64,
}

/// Sensor-specific auxiliary input passed through to gas absorption.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorInput {
    /// Zeeman input, when used.
    pub zeeman: Option<ZeemanInput>,
    /// Gas cell input, when used.
    pub cell_pressure: Option<CellPressureInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn catalog() -> SensorCatalog {
        SensorCatalog::new(
            "hirs4_n19",
            SensorKind::Infrared,
            vec![
                ChannelCoefficients::new(4, 703.0),
                ChannelCoefficients::new(8, 898.0),
                ChannelCoefficients::new(12, 1529.0),
            ],
        )
    }

    #[test]
    fn subset_selects_channels_in_order() {
        let catalog = catalog().with_subset(vec![2, 0]);
        assert!(catalog.check_subset().is_ok());
        let channels: Vec<_> = catalog.channels().map(|c| c.sensor_channel()).collect();
        assert_eq!(channels, [12, 4]);
        assert_eq!(catalog.num_channels(), 2);
    }

    #[test]
    fn subset_out_of_range_is_rejected() {
        let catalog = catalog().with_subset(vec![0, 3]);
        assert_eq!(
            catalog.check_subset(),
            Err(ValidationError::ChannelSubset {
                sensor: "hirs4_n19".to_string(),
                index: 3,
                available: 3,
            })
        );
    }

    #[test]
    fn frequency_converts_to_wavenumber() {
        let channel = ChannelCoefficients::from_frequency(1, 23.8);
        assert_relative_eq!(channel.wavenumber, 0.79388, max_relative = 1e-4);
    }

    #[test]
    fn parses_sensor_kinds() {
        assert_eq!(SensorKind::parse("Microwave"), Some(SensorKind::Microwave));
        assert_eq!(SensorKind::parse("uv"), Some(SensorKind::Ultraviolet));
        assert_eq!(SensorKind::parse("radar"), None);
        assert!(SensorKind::Ultraviolet.is_visible());
        assert!(!SensorKind::Infrared.is_visible());
    }
}

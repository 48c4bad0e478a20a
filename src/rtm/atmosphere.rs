//! Atmospheric profiles and their extension to the top of the atmosphere.
//!
//! Profiles are ordered from space down to the surface: layer `0` is the
//! topmost layer, and `level_pressure[0]` is the pressure at its upper
//! boundary.

use std::ops::Range;

use crate::error::BackendError;

/// Pressure at the top of the atmosphere, in hPa.
pub const TOA_PRESSURE: f64 = 0.005;

/// Absorbing gas species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsorberId {
    /// Water vapor
    H2o,
    /// Carbon dioxide
    Co2,
    /// Ozone
    O3,
    /// Nitrous oxide
    N2o,
    /// Carbon monoxide
    Co,
    /// Methane
    Ch4,
}

/// A gas concentration profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Absorber {
    /// Gas species
    pub id: AbsorberId,
    /// Volume mixing ratio in ppmv, one value per layer
    pub amount: Vec<f64>,
}

/// Cloud particle types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudKind {
    /// Liquid water cloud
    Water,
    /// Ice cloud
    Ice,
    /// Rain
    Rain,
    /// Snow
    Snow,
    /// Graupel
    Graupel,
    /// Hail
    Hail,
}

/// A cloud layer profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Cloud {
    /// Particle type
    pub kind: CloudKind,
    /// Water content in kg/m², one value per layer
    pub water_content: Vec<f64>,
    /// Effective radius in µm, one value per layer
    pub effective_radius: Vec<f64>,
}

/// Aerosol types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AerosolKind {
    /// Mineral dust
    Dust,
    /// Sea salt
    SeaSalt,
    /// Organic carbon
    OrganicCarbon,
    /// Black carbon
    BlackCarbon,
    /// Sulfate
    Sulfate,
}

/// An aerosol layer profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Aerosol {
    /// Aerosol type
    pub kind: AerosolKind,
    /// Concentration in kg/m², one value per layer
    pub concentration: Vec<f64>,
    /// Effective radius in µm, one value per layer
    pub effective_radius: Vec<f64>,
}

/// One atmospheric profile.
#[derive(Debug, Clone, PartialEq)]
pub struct AtmosphericProfile {
    /// Level pressure in hPa, with a length of `num_layers + 1`. Strictly
    /// increasing from the top boundary to the surface.
    pub level_pressure: Vec<f64>,
    /// Layer mean pressure in hPa.
    pub pressure: Vec<f64>,
    /// Layer temperature in K.
    pub temperature: Vec<f64>,
    /// Gas concentration profiles.
    pub absorbers: Vec<Absorber>,
    /// Cloud profiles.
    pub clouds: Vec<Cloud>,
    /// Aerosol profiles.
    pub aerosols: Vec<Aerosol>,
}

impl AtmosphericProfile {
    /// Build a profile from level pressures and layer temperatures. Layer
    /// pressures are the log-mean of the bounding levels.
    pub fn from_levels(level_pressure: Vec<f64>, temperature: Vec<f64>) -> Self {
        let pressure = level_pressure
            .windows(2)
            .map(|p| layer_mean_pressure(p[0], p[1]))
            .collect();
        Self {
            level_pressure,
            pressure,
            temperature,
            absorbers: Vec::new(),
            clouds: Vec::new(),
            aerosols: Vec::new(),
        }
    }

    /// Add a gas concentration profile.
    pub fn with_absorber(mut self, id: AbsorberId, amount: Vec<f64>) -> Self {
        self.absorbers.push(Absorber { id, amount });
        self
    }

    /// Add a cloud profile.
    pub fn with_cloud(mut self, cloud: Cloud) -> Self {
        self.clouds.push(cloud);
        self
    }

    /// Add an aerosol profile.
    pub fn with_aerosol(mut self, aerosol: Aerosol) -> Self {
        self.aerosols.push(aerosol);
        self
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.temperature.len()
    }

    /// The concentration profile for a gas, if present.
    pub fn absorber(&self, id: AbsorberId) -> Option<&[f64]> {
        self.absorbers
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.amount.as_slice())
    }

    /// Pressure thickness of a layer in hPa.
    pub fn layer_thickness(&self, layer: usize) -> f64 {
        self.level_pressure[layer + 1] - self.level_pressure[layer]
    }

    /// Check that the shapes are consistent and the levels are ordered.
    pub fn check_structure(&self) -> Result<(), BackendError> {
        let num_layers = self.num_layers();
        if num_layers == 0 {
            return Err(BackendError::new("profile has no layers"));
        }
        if self.level_pressure.len() != num_layers + 1 || self.pressure.len() != num_layers {
            return Err(BackendError::new(format!(
                "profile has {num_layers} layers but {} levels and {} layer pressures",
                self.level_pressure.len(),
                self.pressure.len()
            )));
        }
        if self.level_pressure[0] <= 0.0 {
            return Err(BackendError::new("top level pressure must be positive"));
        }
        if self.level_pressure.windows(2).any(|p| p[1] <= p[0]) {
            return Err(BackendError::new(
                "level pressures must increase from the top to the surface",
            ));
        }

        let lengths = self
            .absorbers
            .iter()
            .map(|a| a.amount.len())
            .chain(
                self.clouds
                    .iter()
                    .flat_map(|c| [c.water_content.len(), c.effective_radius.len()]),
            )
            .chain(
                self.aerosols
                    .iter()
                    .flat_map(|a| [a.concentration.len(), a.effective_radius.len()]),
            );
        for len in lengths {
            if len != num_layers {
                return Err(BackendError::new(format!(
                    "layer data has length {len} instead of {num_layers}"
                )));
            }
        }
        Ok(())
    }

    /// Check that the values are physically valid.
    pub fn check_physical(&self) -> Result<(), BackendError> {
        if self.temperature.iter().any(|&t| !(t > 0.0)) {
            return Err(BackendError::new("temperatures must be positive"));
        }
        if self.absorbers.iter().any(|a| a.amount.iter().any(|&q| q < 0.0)) {
            return Err(BackendError::new("absorber amounts must not be negative"));
        }
        let negative_cloud = self.clouds.iter().any(|c| {
            c.water_content
                .iter()
                .chain(&c.effective_radius)
                .any(|&v| v < 0.0)
        });
        if negative_cloud {
            return Err(BackendError::new("cloud amounts must not be negative"));
        }
        let negative_aerosol = self.aerosols.iter().any(|a| {
            a.concentration
                .iter()
                .chain(&a.effective_radius)
                .any(|&v| v < 0.0)
        });
        if negative_aerosol {
            return Err(BackendError::new("aerosol amounts must not be negative"));
        }
        Ok(())
    }
}

/// Log-mean pressure of a layer bounded by pressures `top` and `bottom`.
fn layer_mean_pressure(top: f64, bottom: f64) -> f64 {
    (bottom - top) / f64::ln(bottom / top)
}

/// A profile that reaches the top of the atmosphere.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedAtmosphere {
    profile: AtmosphericProfile,
}

impl ExtendedAtmosphere {
    /// The extended profile.
    pub fn profile(&self) -> &AtmosphericProfile {
        &self.profile
    }

    /// Number of layers, including any synthetic ones.
    pub fn num_layers(&self) -> usize {
        self.profile.num_layers()
    }

    /// Number of cloud profiles.
    pub fn num_clouds(&self) -> usize {
        self.profile.clouds.len()
    }

    /// Number of aerosol profiles.
    pub fn num_aerosols(&self) -> usize {
        self.profile.aerosols.len()
    }
}

/// Where synthetic layers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionSource {
    /// Nothing was added
    None,
    /// Layers were taken from the reference climatology
    ReferenceClimatology,
}

/// Record of how a profile was extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionState {
    added_layers: usize,
    source: ExtensionSource,
}

impl ExtensionState {
    /// No layers were added.
    pub fn none() -> Self {
        Self {
            added_layers: 0,
            source: ExtensionSource::None,
        }
    }

    /// Number of synthetic layers inserted above the profile.
    pub fn added_layers(&self) -> usize {
        self.added_layers
    }

    /// Source of the synthetic layers.
    pub fn source(&self) -> ExtensionSource {
        self.source
    }

    /// Layer indices of the extended atmosphere that belong to the user's profile.
    pub fn user_layers(&self, extended_layers: usize) -> Range<usize> {
        self.added_layers..extended_layers
    }

    /// Drop the values for synthetic layers from per-layer data.
    pub fn strip<'a, T>(&self, layer_data: &'a [T]) -> &'a [T] {
        &layer_data[self.added_layers.min(layer_data.len())..]
    }

    /// Reverse the extension, recovering the user's profile.
    pub fn restore(&self, extended: &ExtendedAtmosphere) -> AtmosphericProfile {
        let p = extended.profile();
        AtmosphericProfile {
            level_pressure: self.strip(&p.level_pressure).to_vec(),
            pressure: self.strip(&p.pressure).to_vec(),
            temperature: self.strip(&p.temperature).to_vec(),
            absorbers: p
                .absorbers
                .iter()
                .map(|a| Absorber {
                    id: a.id,
                    amount: self.strip(&a.amount).to_vec(),
                })
                .collect(),
            clouds: p
                .clouds
                .iter()
                .map(|c| Cloud {
                    kind: c.kind,
                    water_content: self.strip(&c.water_content).to_vec(),
                    effective_radius: self.strip(&c.effective_radius).to_vec(),
                })
                .collect(),
            aerosols: p
                .aerosols
                .iter()
                .map(|a| Aerosol {
                    kind: a.kind,
                    concentration: self.strip(&a.concentration).to_vec(),
                    effective_radius: self.strip(&a.effective_radius).to_vec(),
                })
                .collect(),
        }
    }
}

/// Upper-atmosphere climatology used to fill in missing layers.
///
/// Columns are pressure (hPa), temperature (K), water vapor (ppmv), and ozone
/// (ppmv). Approximately the U.S. Standard Atmosphere, 1976.
const REFERENCE_LEVELS: [[f64; 4]; 15] = [
    [0.005, 190.0, 1.0, 0.4],
    [0.01, 198.6, 1.5, 0.6],
    [0.02, 208.4, 2.5, 0.8],
    [0.05, 219.6, 3.5, 1.0],
    [0.1, 233.3, 4.5, 1.2],
    [0.2, 247.0, 5.0, 1.6],
    [0.5, 258.5, 5.5, 2.5],
    [1.0, 270.0, 5.5, 4.0],
    [2.0, 257.0, 5.0, 6.0],
    [5.0, 238.0, 4.8, 7.5],
    [10.0, 227.0, 4.5, 8.0],
    [20.0, 223.0, 4.3, 6.5],
    [50.0, 217.0, 4.0, 3.5],
    [100.0, 217.0, 4.0, 1.0],
    [200.0, 217.0, 5.0, 0.2],
];

/// Pads profiles with reference-climatology layers up to [`TOA_PRESSURE`].
#[derive(Debug, Clone, Default)]
pub struct AtmosphereExtender;

impl AtmosphereExtender {
    /// Extend a profile to the top of the atmosphere.
    ///
    /// Profiles that already reach [`TOA_PRESSURE`] are copied unchanged with
    /// an empty [`ExtensionState`].
    pub fn extend(
        &self,
        profile: &AtmosphericProfile,
    ) -> Result<(ExtendedAtmosphere, ExtensionState), BackendError> {
        profile.check_structure()?;

        let top = profile.level_pressure[0];
        let new_levels: Vec<f64> = REFERENCE_LEVELS
            .iter()
            .map(|row| row[0])
            .filter(|&p| p < top)
            .collect();
        if new_levels.is_empty() {
            return Ok((
                ExtendedAtmosphere {
                    profile: profile.clone(),
                },
                ExtensionState::none(),
            ));
        }
        let added = new_levels.len();

        let mut level_pressure = new_levels;
        level_pressure.extend_from_slice(&profile.level_pressure);
        let pressure: Vec<f64> = level_pressure[..added]
            .iter()
            .zip(&level_pressure[1..=added])
            .map(|(&p_top, &p_bottom)| layer_mean_pressure(p_top, p_bottom))
            .collect();

        // Shift the climatology so it meets the user's top layer, fading the
        // shift out towards the top of the atmosphere
        let t_offset =
            profile.temperature[0] - reference_value(profile.pressure[0], 1);
        let ln_toa = TOA_PRESSURE.ln();
        let ln_join = profile.pressure[0].ln();
        let temperature: Vec<f64> = pressure
            .iter()
            .map(|&p| {
                let weight = ((p.ln() - ln_toa) / (ln_join - ln_toa)).clamp(0.0, 1.0);
                reference_value(p, 1) + t_offset * weight
            })
            .collect();

        let prepend = |synthetic: Vec<f64>, data: &[f64]| -> Vec<f64> {
            let mut extended = synthetic;
            extended.extend_from_slice(data);
            extended
        };

        let absorbers = profile
            .absorbers
            .iter()
            .map(|a| {
                let synthetic = match a.id {
                    AbsorberId::H2o => pressure.iter().map(|&p| reference_value(p, 2)).collect(),
                    AbsorberId::O3 => pressure.iter().map(|&p| reference_value(p, 3)).collect(),
                    // Well-mixed gases keep the user's topmost value
                    _ => vec![a.amount[0]; added],
                };
                Absorber {
                    id: a.id,
                    amount: prepend(synthetic, &a.amount),
                }
            })
            .collect();
        let clouds = profile
            .clouds
            .iter()
            .map(|c| Cloud {
                kind: c.kind,
                water_content: prepend(vec![0.0; added], &c.water_content),
                effective_radius: prepend(vec![0.0; added], &c.effective_radius),
            })
            .collect();
        let aerosols = profile
            .aerosols
            .iter()
            .map(|a| Aerosol {
                kind: a.kind,
                concentration: prepend(vec![0.0; added], &a.concentration),
                effective_radius: prepend(vec![0.0; added], &a.effective_radius),
            })
            .collect();

        let extended = AtmosphericProfile {
            level_pressure,
            pressure: prepend(pressure, &profile.pressure),
            temperature: prepend(temperature, &profile.temperature),
            absorbers,
            clouds,
            aerosols,
        };

        Ok((
            ExtendedAtmosphere { profile: extended },
            ExtensionState {
                added_layers: added,
                source: ExtensionSource::ReferenceClimatology,
            },
        ))
    }
}

/// Interpolate column `column` of the climatology linearly in log-pressure,
/// holding the end values outside the table.
fn reference_value(pressure: f64, column: usize) -> f64 {
    let first = REFERENCE_LEVELS[0];
    let last = REFERENCE_LEVELS[REFERENCE_LEVELS.len() - 1];
    if pressure <= first[0] {
        return first[column];
    }
    if pressure >= last[0] {
        return last[column];
    }

    let upper = REFERENCE_LEVELS
        .iter()
        .position(|row| row[0] >= pressure)
        .unwrap_or(REFERENCE_LEVELS.len() - 1);
    let (a, b) = (REFERENCE_LEVELS[upper - 1], REFERENCE_LEVELS[upper]);
    let w = (pressure.ln() - a[0].ln()) / (b[0].ln() - a[0].ln());
    a[column] + w * (b[column] - a[column])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tropospheric_profile() -> AtmosphericProfile {
        AtmosphericProfile::from_levels(
            vec![100.0, 300.0, 500.0, 700.0, 850.0, 1000.0],
            vec![210.0, 235.0, 255.0, 270.0, 285.0],
        )
        .with_absorber(AbsorberId::H2o, vec![5.0, 100.0, 1000.0, 5000.0, 12000.0])
        .with_absorber(AbsorberId::Co2, vec![410.0; 5])
    }

    #[test]
    fn adds_layers_above_a_low_top() {
        let profile = tropospheric_profile();
        let (extended, state) = AtmosphereExtender.extend(&profile).unwrap();

        // Reference levels from 0.005 up to 50 hPa are above the 100 hPa top
        assert_eq!(state.added_layers(), 13);
        assert_eq!(state.source(), ExtensionSource::ReferenceClimatology);
        assert_eq!(extended.num_layers(), profile.num_layers() + 13);
        assert_relative_eq!(extended.profile().level_pressure[0], TOA_PRESSURE);
        assert!(extended.profile().check_structure().is_ok());

        // Well-mixed gases are continued with the topmost value
        let co2 = extended.profile().absorber(AbsorberId::Co2).unwrap();
        assert!(co2.iter().all(|&q| q == 410.0));
    }

    #[test]
    fn synthetic_temperature_joins_the_profile() {
        let profile = tropospheric_profile();
        let (extended, state) = AtmosphereExtender.extend(&profile).unwrap();
        let t = &extended.profile().temperature;
        let last_synthetic = t[state.added_layers() - 1];
        assert!((last_synthetic - profile.temperature[0]).abs() < 15.0);
        // Near the top the shift has faded to the climatology
        assert_relative_eq!(
            t[0],
            reference_value(extended.profile().pressure[0], 1),
            max_relative = 0.05
        );
    }

    #[test]
    fn extending_twice_is_a_no_op() {
        let (extended, _) = AtmosphereExtender.extend(&tropospheric_profile()).unwrap();
        let (again, state) = AtmosphereExtender.extend(extended.profile()).unwrap();
        assert_eq!(state, ExtensionState::none());
        assert_eq!(again, extended);
    }

    #[test]
    fn restore_reverses_the_extension() {
        let profile = tropospheric_profile();
        let (extended, state) = AtmosphereExtender.extend(&profile).unwrap();
        assert_eq!(state.restore(&extended), profile);
        assert_eq!(
            state.user_layers(extended.num_layers()),
            13..extended.num_layers()
        );
    }

    #[test]
    fn rejects_malformed_profiles() {
        let mut profile = tropospheric_profile();
        profile.level_pressure.swap(1, 2);
        assert!(AtmosphereExtender.extend(&profile).is_err());

        let mut profile = tropospheric_profile();
        profile.absorbers[0].amount.pop();
        assert!(AtmosphereExtender.extend(&profile).is_err());
    }

    #[test]
    fn physical_check_rejects_negative_amounts() {
        let mut profile = tropospheric_profile();
        assert!(profile.check_physical().is_ok());
        profile.absorbers[0].amount[2] = -1.0;
        assert!(profile.check_physical().is_err());
    }
}

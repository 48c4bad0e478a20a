//! Channel Planck functions.
//!
//! Radiance is in mW/(m² sr cm⁻¹) and wavenumber in cm⁻¹.

/// First radiation constant, 2hc², in mW/(m² sr cm⁻⁴).
pub const C_1: f64 = 1.191042972e-5;
/// Second radiation constant, hc/k, in K cm.
pub const C_2: f64 = 1.4387769;

/// Planck radiance of a channel at temperature `t` in K.
///
/// The band correction maps the physical temperature to the channel's
/// effective temperature, `t_eff = band_c1 + band_c2 * t`.
pub(crate) fn radiance(planck_c1: f64, planck_c2: f64, band_c1: f64, band_c2: f64, t: f64) -> f64 {
    let t_eff = band_c1 + band_c2 * t;
    if t_eff <= 0.0 {
        return 0.0;
    }
    planck_c1 / f64::exp_m1(planck_c2 / t_eff)
}

/// Brightness temperature in K of a channel radiance. Non-positive radiances
/// have a brightness temperature of zero.
pub(crate) fn temperature(
    planck_c1: f64,
    planck_c2: f64,
    band_c1: f64,
    band_c2: f64,
    radiance: f64,
) -> f64 {
    if radiance <= 0.0 {
        return 0.0;
    }
    let t_eff = planck_c2 / f64::ln_1p(planck_c1 / radiance);
    (t_eff - band_c1) / band_c2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn brightness_temperature_inverts_radiance() {
        let wavenumber: f64 = 900.0;
        let (c1, c2) = (C_1 * wavenumber.powi(3), C_2 * wavenumber);
        let r = radiance(c1, c2, 0.05, 0.999, 288.15);
        assert_relative_eq!(temperature(c1, c2, 0.05, 0.999, r), 288.15, epsilon = 1e-9);
    }

    #[test]
    fn window_channel_radiance_is_plausible() {
        // 10 µm window at 300 K is about 99 mW/(m² sr cm⁻¹)
        let wavenumber: f64 = 1000.0;
        let r = radiance(C_1 * wavenumber.powi(3), C_2 * wavenumber, 0.0, 1.0, 300.0);
        assert_relative_eq!(r, 99.2, max_relative = 0.01);
    }

    #[test]
    fn zero_radiance_is_zero_kelvin() {
        assert_eq!(temperature(1.0, 1.0, 0.0, 1.0, 0.0), 0.0);
        assert_eq!(temperature(1.0, 1.0, 0.0, 1.0, -3.0), 0.0);
    }
}

//! Azimuthal Fourier loop of the radiative transfer solution.

use log::trace;

use super::physics::{ForwardPhysics, SolveInput};
use super::RadianceResult;
use crate::error::{ForwardError, Stage, StageContext};

/// Weight of Fourier order `order` at relative azimuth `relative_azimuth`
/// (radians).
pub(crate) fn azimuth_weight(order: usize, relative_azimuth: f64) -> f64 {
    if order == 0 {
        1.0
    } else {
        (order as f64 * relative_azimuth).cos()
    }
}

/// Solve orders `0..=max_order` in sequence and accumulate them into
/// `result`, then derive the brightness temperature.
///
/// The radiance is the azimuth-weighted sum over orders. The up, down and
/// surface components are azimuth averages, so they come from order 0.
pub(crate) fn solve_channel<P: ForwardPhysics + ?Sized>(
    physics: &P,
    input: &SolveInput<'_>,
    max_order: usize,
    workspace: &mut P::SensorWorkspace,
    context: &StageContext,
    result: &mut RadianceResult,
) -> Result<(), ForwardError> {
    let relative_azimuth = input.geometry.derived.relative_azimuth;

    result.radiance = 0.0;
    for order in 0..=max_order {
        let component = physics
            .solve(input, order, workspace)
            .map_err(|e| ForwardError::stage(Stage::Solve, &context.with_fourier_order(order), e))?;
        trace!("{context}: Fourier order {order} radiance {}", component.radiance);

        result.radiance += azimuth_weight(order, relative_azimuth) * component.radiance;
        if order == 0 {
            result.up_radiance = component.up_radiance;
            result.down_radiance = component.down_radiance;
            result.down_solar_radiance = component.down_solar_radiance;
            result.surface_planck_radiance = component.surface_planck_radiance;
        }
        result.fourier_orders += 1;
    }

    result.brightness_temperature = if input.sensor.kind.has_brightness_temperature() {
        input.channel.coefficients.brightness_temperature(result.radiance)
    } else {
        0.0
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn order_zero_is_unweighted() {
        assert_eq!(azimuth_weight(0, 1.234), 1.0);
    }

    #[test]
    fn higher_orders_follow_the_relative_azimuth() {
        assert_relative_eq!(azimuth_weight(1, PI), -1.0);
        assert_relative_eq!(azimuth_weight(2, PI / 2.0), -1.0);
        assert_relative_eq!(azimuth_weight(3, 0.0), 1.0);
    }
}

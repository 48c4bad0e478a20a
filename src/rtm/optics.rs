//! Combined atmospheric optical properties for one channel.

use ndarray::{s, Array1, Array3};

use crate::error::BackendError;

/// Optical depth below which a layer is treated as transparent.
const OPTICAL_DEPTH_THRESHOLD: f64 = 1.0e-10;
/// Scattering optical depth below which a layer is treated as non-scattering.
const SCATTERING_THRESHOLD: f64 = 1.0e-15;

/// Optical properties accumulated from gas absorption, molecular
/// scattering, clouds and aerosols.
///
/// While accumulating, `single_scatter` holds the scattering optical depth
/// and `phase_coefficient` holds scattering-weighted Legendre coefficients.
/// [`CombinedOpticalState::combine`] turns these into the single-scatter
/// albedo and normalized, delta-truncated coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedOpticalState {
    max_legendre_terms: usize,
    n_legendre_terms: usize,
    include_scattering: bool,
    /// Layer optical depth.
    pub optical_depth: Array1<f64>,
    /// Layer scattering optical depth.
    pub single_scatter: Array1<f64>,
    /// Layer single-scatter albedo, set by [`CombinedOpticalState::combine`].
    pub single_scatter_albedo: Array1<f64>,
    /// Layer delta-truncation factor, set by [`CombinedOpticalState::combine`].
    pub delta_truncation: Array1<f64>,
    /// Phase function Legendre coefficients, shaped as (`max_legendre_terms + 1`,
    /// `num_phase_elements`, `num_layers`).
    pub phase_coefficient: Array3<f64>,
}

impl CombinedOpticalState {
    /// Allocate for `num_layers` layers.
    pub fn new(num_layers: usize, max_legendre_terms: usize, num_phase_elements: usize) -> Self {
        Self {
            max_legendre_terms,
            n_legendre_terms: 0,
            include_scattering: true,
            optical_depth: Array1::zeros(num_layers),
            single_scatter: Array1::zeros(num_layers),
            single_scatter_albedo: Array1::zeros(num_layers),
            delta_truncation: Array1::zeros(num_layers),
            phase_coefficient: Array3::zeros([
                max_legendre_terms + 1,
                num_phase_elements,
                num_layers,
            ]),
        }
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.optical_depth.len()
    }

    /// Number of Legendre terms in use.
    pub fn n_legendre_terms(&self) -> usize {
        self.n_legendre_terms
    }

    /// Whether scattering is kept by [`CombinedOpticalState::combine`].
    pub fn include_scattering(&self) -> bool {
        self.include_scattering
    }

    /// Reset to a zero-scattering baseline using `n_streams` Legendre terms.
    pub(crate) fn reset(&mut self, n_streams: usize, include_scattering: bool) {
        self.n_legendre_terms = n_streams.min(self.max_legendre_terms);
        self.include_scattering = include_scattering;
        self.optical_depth.fill(0.0);
        self.single_scatter.fill(0.0);
        self.single_scatter_albedo.fill(0.0);
        self.delta_truncation.fill(0.0);
        self.phase_coefficient.fill(0.0);
    }

    /// Use at least `n_terms` Legendre terms. The count never narrows.
    pub fn widen_legendre_terms(&mut self, n_terms: usize) -> Result<(), BackendError> {
        if n_terms > self.max_legendre_terms {
            return Err(BackendError::new(format!(
                "{n_terms} Legendre terms exceeds the maximum of {}",
                self.max_legendre_terms
            )));
        }
        self.n_legendre_terms = self.n_legendre_terms.max(n_terms);
        Ok(())
    }

    /// Add absorption optical depth to a layer.
    pub fn add_absorption(&mut self, layer: usize, optical_depth: f64) {
        self.optical_depth[layer] += optical_depth;
    }

    /// Add a scattering contribution to a layer.
    ///
    /// `coefficients` are the contributor's normalized Legendre coefficients
    /// for the first phase element; any beyond the active term count are
    /// ignored.
    pub fn add_scattering(
        &mut self,
        layer: usize,
        extinction: f64,
        single_scatter_albedo: f64,
        coefficients: &[f64],
    ) {
        let scattering = extinction * single_scatter_albedo;
        self.optical_depth[layer] += extinction;
        self.single_scatter[layer] += scattering;
        for (k, &c) in coefficients
            .iter()
            .enumerate()
            .take(self.n_legendre_terms + 1)
        {
            self.phase_coefficient[[k, 0, layer]] += scattering * c;
        }
    }

    /// Finalize the accumulated contributions.
    ///
    /// Scattering layers get a single-scatter albedo and normalized phase
    /// coefficients. With more than two Legendre terms the phase function is
    /// delta-truncated at the last active term, scaling the optical depth and
    /// albedo to match. Layers whose last active coefficient is 1 are left
    /// untruncated.
    pub fn combine(&mut self) {
        let n = self.n_legendre_terms;
        for layer in 0..self.num_layers() {
            let tau = self.optical_depth[layer];
            let scattering = self.single_scatter[layer];

            let mut coefficients = self.phase_coefficient.slice_mut(s![.., .., layer]);
            if !self.include_scattering {
                self.optical_depth[layer] = (tau - scattering).max(0.0);
                self.single_scatter_albedo[layer] = 0.0;
                self.delta_truncation[layer] = 0.0;
                coefficients.fill(0.0);
                continue;
            }
            if tau < OPTICAL_DEPTH_THRESHOLD || scattering < SCATTERING_THRESHOLD {
                self.single_scatter_albedo[layer] = 0.0;
                self.delta_truncation[layer] = 0.0;
                coefficients.fill(0.0);
                continue;
            }

            let mut albedo = scattering / tau;
            coefficients.mapv_inplace(|c| c / scattering);

            // A fully forward-peaked layer can't be truncated
            let mut delta = 0.0;
            if n > 2 && 1.0 - coefficients[[n, 0]] >= SCATTERING_THRESHOLD {
                delta = coefficients[[n, 0]];
                for mut element in coefficients.columns_mut() {
                    for k in 0..n {
                        element[k] = (element[k] - delta) / (1.0 - delta);
                    }
                    element[n] = 0.0;
                }
                self.optical_depth[layer] = tau * (1.0 - delta * albedo);
                albedo = (1.0 - delta) * albedo / (1.0 - delta * albedo);
            }

            self.single_scatter_albedo[layer] = albedo;
            self.delta_truncation[layer] = delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RAYLEIGH: [f64; 3] = [1.0, 0.0, 0.5];

    #[test]
    fn reset_clears_previous_channel() {
        let mut optics = CombinedOpticalState::new(3, 16, 1);
        optics.reset(4, true);
        optics.add_scattering(1, 0.2, 0.9, &RAYLEIGH);
        optics.combine();

        optics.reset(0, true);
        assert_eq!(optics.n_legendre_terms(), 0);
        assert!(optics.optical_depth.iter().all(|&v| v == 0.0));
        assert!(optics.single_scatter_albedo.iter().all(|&v| v == 0.0));
        assert!(optics.phase_coefficient.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn widening_never_narrows() {
        let mut optics = CombinedOpticalState::new(1, 16, 1);
        optics.reset(8, true);
        optics.widen_legendre_terms(4).unwrap();
        assert_eq!(optics.n_legendre_terms(), 8);
        optics.widen_legendre_terms(16).unwrap();
        assert_eq!(optics.n_legendre_terms(), 16);
        assert!(optics.widen_legendre_terms(17).is_err());
    }

    #[test]
    fn pure_absorption_has_no_scattering() {
        let mut optics = CombinedOpticalState::new(4, 16, 1);
        optics.reset(0, true);
        for layer in 0..4 {
            optics.add_absorption(layer, 0.1 * (layer + 1) as f64);
        }
        optics.combine();
        assert!(optics.single_scatter_albedo.iter().all(|&v| v == 0.0));
        assert!(optics.phase_coefficient.iter().all(|&v| v == 0.0));
        assert_relative_eq!(optics.optical_depth[3], 0.4);
    }

    #[test]
    fn rayleigh_layer_is_not_truncated() {
        let mut optics = CombinedOpticalState::new(1, 16, 1);
        optics.reset(4, true);
        optics.add_absorption(0, 0.3);
        optics.add_scattering(0, 0.1, 1.0, &RAYLEIGH);
        optics.combine();

        assert_relative_eq!(optics.optical_depth[0], 0.4);
        assert_relative_eq!(optics.single_scatter_albedo[0], 0.25);
        assert_eq!(optics.delta_truncation[0], 0.0);
        assert_relative_eq!(optics.phase_coefficient[[0, 0, 0]], 1.0);
        assert_relative_eq!(optics.phase_coefficient[[2, 0, 0]], 0.5);
    }

    #[test]
    fn forward_peak_is_truncated() {
        let g: f64 = 0.8;
        let hg: Vec<f64> = (0..=4).map(|k| g.powi(k)).collect();
        let mut optics = CombinedOpticalState::new(1, 16, 1);
        optics.reset(4, true);
        optics.add_scattering(0, 1.0, 1.0, &hg);
        optics.combine();

        let delta = g.powi(4);
        assert_relative_eq!(optics.delta_truncation[0], delta);
        assert_relative_eq!(optics.optical_depth[0], 1.0 - delta);
        assert_relative_eq!(optics.single_scatter_albedo[0], 1.0);
        assert_relative_eq!(optics.phase_coefficient[[1, 0, 0]], (g - delta) / (1.0 - delta));
        assert_eq!(optics.phase_coefficient[[4, 0, 0]], 0.0);
    }

    #[test]
    fn fully_forward_peak_is_not_truncated() {
        let mut optics = CombinedOpticalState::new(1, 16, 1);
        optics.reset(4, true);
        optics.add_scattering(0, 1.0, 1.0, &[1.0; 5]);
        optics.combine();

        assert_eq!(optics.delta_truncation[0], 0.0);
        assert_relative_eq!(optics.optical_depth[0], 1.0);
        assert_relative_eq!(optics.single_scatter_albedo[0], 1.0);
        assert!(optics.phase_coefficient.iter().all(|v| v.is_finite()));
        assert_relative_eq!(optics.phase_coefficient[[4, 0, 0]], 1.0);
    }

    #[test]
    fn excluded_scattering_leaves_absorption() {
        let mut optics = CombinedOpticalState::new(1, 16, 1);
        optics.reset(4, false);
        optics.add_absorption(0, 0.3);
        optics.add_scattering(0, 0.5, 0.8, &RAYLEIGH);
        optics.combine();
        assert_relative_eq!(optics.optical_depth[0], 0.4);
        assert_eq!(optics.single_scatter_albedo[0], 0.0);
        assert!(optics.phase_coefficient.iter().all(|&v| v == 0.0));
    }
}

//! Statistical helpers for the variational models and call extraction:
//! Beta tail probabilities, highest-density intervals of Beta marginals and
//! the Dirichlet log-normaliser.

use itertools_num::linspace;
use statrs::distribution::{Beta, ContinuousCDF};
use statrs::function::gamma::ln_gamma;

/// Grid points for the initial scan of the HDI offset.
const HDI_GRID_POINTS: usize = 101;
/// Bisection steps for refining the HDI offset around the best grid point.
const HDI_REFINE_STEPS: usize = 40;

/// `P(X <= x)` for `X ~ Beta(alpha, beta)`.
pub(crate) fn beta_cdf(alpha: f64, beta: f64, x: f64) -> f64 {
    assert!(alpha > 0.0 && beta > 0.0);
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    Beta::new(alpha, beta)
        .expect("bug: invalid beta shape parameters")
        .cdf(x)
}

/// Highest-density interval covering `mass` of `Beta(alpha, beta)`.
///
/// For shapes without an interior mode the interval degenerates to the
/// corresponding one-sided or equal-tailed interval. The search is a
/// deterministic grid scan over the left tail offset followed by a ternary
/// refinement, so repeated invocations yield identical bounds.
pub(crate) fn beta_hdi(alpha: f64, beta: f64, mass: f64) -> (f64, f64) {
    assert!(alpha > 0.0 && beta > 0.0);
    assert!(mass > 0.0 && mass < 1.0);
    let dist = Beta::new(alpha, beta).expect("bug: invalid beta shape parameters");

    if alpha <= 1.0 && beta <= 1.0 {
        // no interior mode (flat or bathtub shaped density)
        let tail = (1.0 - mass) / 2.0;
        return (dist.inverse_cdf(tail), dist.inverse_cdf(1.0 - tail));
    }
    if alpha <= 1.0 {
        // mode at zero
        return (0.0, dist.inverse_cdf(mass));
    }
    if beta <= 1.0 {
        // mode at one
        return (dist.inverse_cdf(1.0 - mass), 1.0);
    }

    // Interior mode: the HDI is the narrowest interval [icdf(t), icdf(t + mass)]
    // over left tail offsets t in [0, 1 - mass].
    let width = |t: f64| dist.inverse_cdf(t + mass) - dist.inverse_cdf(t);

    let mut best_t = 0.0;
    let mut best_width = width(0.0);
    for t in linspace(0.0, 1.0 - mass, HDI_GRID_POINTS) {
        let w = width(t);
        if w < best_width {
            best_width = w;
            best_t = t;
        }
    }

    let step = (1.0 - mass) / (HDI_GRID_POINTS - 1) as f64;
    let mut lo = (best_t - step).max(0.0);
    let mut hi = (best_t + step).min(1.0 - mass);
    for _ in 0..HDI_REFINE_STEPS {
        let third = (hi - lo) / 3.0;
        let m1 = lo + third;
        let m2 = hi - third;
        if width(m1) < width(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    let t = (lo + hi) / 2.0;

    (dist.inverse_cdf(t), dist.inverse_cdf(t + mass))
}

/// Log-normaliser of the Dirichlet distribution,
/// `ln C(alpha) = ln Gamma(sum alpha) - sum ln Gamma(alpha_k)`.
pub(crate) fn ln_dirichlet_norm(alphas: &[f64]) -> f64 {
    let a0: f64 = alphas.iter().sum();
    ln_gamma(a0) - alphas.iter().map(|&a| ln_gamma(a)).sum::<f64>()
}

/// Whether `probs` is a valid probability simplex within `tolerance`.
pub(crate) fn is_probability_simplex(probs: &[f64], tolerance: f64) -> bool {
    probs.iter().all(|&p| (0.0..=1.0 + tolerance).contains(&p))
        && (probs.iter().sum::<f64>() - 1.0).abs() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beta_cdf_bounds() {
        assert_relative_eq!(beta_cdf(2.0, 2.0, 0.0), 0.0);
        assert_relative_eq!(beta_cdf(2.0, 2.0, 1.0), 1.0);
        // symmetric shape: median at 0.5
        assert_relative_eq!(beta_cdf(2.0, 2.0, 0.5), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_beta_hdi_symmetric() {
        let (lo, hi) = beta_hdi(10.0, 10.0, 0.9);
        // symmetric density: the HDI is symmetric around 0.5
        assert_relative_eq!(lo, 1.0 - hi, epsilon = 1e-3);
        assert!(lo < 0.5 && hi > 0.5);
        let mass = beta_cdf(10.0, 10.0, hi) - beta_cdf(10.0, 10.0, lo);
        assert_relative_eq!(mass, 0.9, epsilon = 1e-3);
    }

    #[test]
    fn test_beta_hdi_boundary_modes() {
        let (lo, hi) = beta_hdi(0.5, 5.0, 0.9);
        assert_relative_eq!(lo, 0.0);
        assert!(hi < 1.0);

        let (lo, hi) = beta_hdi(5.0, 0.5, 0.9);
        assert!(lo > 0.0);
        assert_relative_eq!(hi, 1.0);
    }

    #[test]
    fn test_beta_hdi_narrower_than_equal_tailed() {
        // skewed density: the HDI must not be wider than the equal-tailed interval
        let dist = Beta::new(2.0, 8.0).unwrap();
        let (lo, hi) = beta_hdi(2.0, 8.0, 0.9);
        let equal_tailed = dist.inverse_cdf(0.95) - dist.inverse_cdf(0.05);
        assert!(hi - lo <= equal_tailed + 1e-6);
    }

    #[test]
    fn test_beta_hdi_deterministic() {
        let a = beta_hdi(3.0, 7.0, 0.95);
        let b = beta_hdi(3.0, 7.0, 0.95);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ln_dirichlet_norm_uniform() {
        // Dirichlet(1, 1) is uniform on the simplex: C = Gamma(2) = 1
        assert_relative_eq!(ln_dirichlet_norm(&[1.0, 1.0]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_is_probability_simplex() {
        assert!(is_probability_simplex(&[0.5, 0.3, 0.2], 1e-6));
        assert!(!is_probability_simplex(&[0.5, 0.3], 1e-6));
        assert!(!is_probability_simplex(&[0.5, -0.1, 0.6], 1e-6));
    }
}

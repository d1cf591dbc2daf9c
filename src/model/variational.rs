// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Shared mean-field machinery of the CNV and tumour models: per-sample
//! Dirichlet mixture fits over the components of a fixed genotype, and the
//! combination of per-genotype evidence lower bounds into a genotype
//! posterior.
//!
//! Updates are fully deterministic given the inputs: the initial alphas are
//! the prior plus a fixed perturbation, and no randomness enters the
//! iteration.

use bio::stats::LogProb;
use itertools::Itertools;
use statrs::function::gamma::digamma;

use crate::model::ModelError;
use crate::utils::stats::{is_probability_simplex, ln_dirichlet_norm};
use crate::utils::PROB_SUM_TOLERANCE;

/// Fixed perturbation added to the prior alphas at initialisation.
const INIT_PERTURBATION: f64 = 0.01;

#[derive(Clone, Copy, Debug)]
pub struct MeanFieldOptions {
    /// Convergence threshold on the maximum absolute alpha change.
    pub epsilon: f64,
    /// Iteration cap; hitting it accepts the current alphas.
    pub max_iterations: usize,
}

impl Default for MeanFieldOptions {
    fn default() -> Self {
        MeanFieldOptions {
            epsilon: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Result of fitting one sample's Dirichlet mixture for one genotype.
#[derive(Clone, Debug)]
pub(crate) struct SampleFit {
    pub(crate) alphas: Vec<f64>,
    pub(crate) elbo: f64,
    pub(crate) converged: bool,
}

/// Mean-field coordinate ascent for a single sample.
///
/// `component_log_likelihoods` is read-major with one column per mixture
/// component (the genotype's haplotype slots, plus the somatic slot for the
/// tumour model).
pub(crate) fn fit_sample(
    prior_alphas: &[f64],
    component_log_likelihoods: &[Vec<LogProb>],
    options: &MeanFieldOptions,
) -> SampleFit {
    let n_components = prior_alphas.len();
    assert!(n_components > 0, "bug: mixture must have components");
    assert!(
        prior_alphas.iter().all(|&a| a > 0.0),
        "bug: Dirichlet prior alphas must be strictly positive"
    );

    let mut alphas = prior_alphas
        .iter()
        .map(|&a| a + INIT_PERTURBATION)
        .collect_vec();
    let mut responsibilities =
        vec![vec![0.0; n_components]; component_log_likelihoods.len()];
    let mut converged = false;

    for _ in 0..options.max_iterations {
        let e_ln_pi = expected_ln_pi(&alphas);

        for (read, row) in component_log_likelihoods.iter().enumerate() {
            let unnormalised = (0..n_components)
                .map(|k| LogProb(e_ln_pi[k] + *row[k]))
                .collect_vec();
            let norm = LogProb::ln_sum_exp(&unnormalised);
            if norm == LogProb::ln_zero() {
                // read impossible under every component: the genotype cannot
                // explain the data at all
                return SampleFit {
                    alphas,
                    elbo: f64::NEG_INFINITY,
                    converged: true,
                };
            }
            for k in 0..n_components {
                responsibilities[read][k] = (unnormalised[k] - norm).exp();
            }
        }

        let mut max_change = 0.0f64;
        for k in 0..n_components {
            let updated = prior_alphas[k]
                + responsibilities.iter().map(|gamma| gamma[k]).sum::<f64>();
            max_change = max_change.max((updated - alphas[k]).abs());
            alphas[k] = updated;
        }

        if max_change < options.epsilon {
            converged = true;
            break;
        }
    }

    let elbo = elbo(prior_alphas, &alphas, &responsibilities, component_log_likelihoods);

    SampleFit {
        alphas,
        elbo,
        converged,
    }
}

fn expected_ln_pi(alphas: &[f64]) -> Vec<f64> {
    let digamma_total = digamma(alphas.iter().sum());
    alphas
        .iter()
        .map(|&a| digamma(a) - digamma_total)
        .collect_vec()
}

/// Standard mean-field evidence lower bound for the fitted factors.
fn elbo(
    prior_alphas: &[f64],
    alphas: &[f64],
    responsibilities: &[Vec<f64>],
    component_log_likelihoods: &[Vec<LogProb>],
) -> f64 {
    let e_ln_pi = expected_ln_pi(alphas);

    let mut result = ln_dirichlet_norm(prior_alphas) - ln_dirichlet_norm(alphas);
    for (k, &e) in e_ln_pi.iter().enumerate() {
        result += (prior_alphas[k] - alphas[k]) * e;
    }

    for (gamma, row) in responsibilities.iter().zip(component_log_likelihoods.iter()) {
        for (k, &g) in gamma.iter().enumerate() {
            if g > 0.0 {
                result += g * (e_ln_pi[k] + *row[k] - g.ln());
            }
        }
    }

    result
}

/// Normalise per-genotype joint scores `ELBO(g) + ln P(g)` into a posterior
/// and the approximate log-evidence.
pub(crate) fn combine_genotype_fits(
    log_priors: &[LogProb],
    elbos: &[f64],
) -> Result<(Vec<f64>, LogProb), ModelError> {
    assert_eq!(log_priors.len(), elbos.len());
    let joints = log_priors
        .iter()
        .zip(elbos.iter())
        .map(|(&prior, &elbo)| LogProb(*prior + elbo))
        .collect_vec();
    let approx_log_evidence = LogProb::ln_sum_exp(&joints);
    if approx_log_evidence == LogProb::ln_zero() || approx_log_evidence.is_nan() {
        return Err(ModelError::NumericalUnderflow);
    }
    let posteriors = joints
        .iter()
        .map(|&joint| (joint - approx_log_evidence).exp())
        .collect_vec();
    debug_assert!(is_probability_simplex(&posteriors, PROB_SUM_TOLERANCE));
    Ok((posteriors, approx_log_evidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bio::stats::Prob;

    fn rows(support: &[(usize, usize)], n_components: usize) -> Vec<Vec<LogProb>> {
        let mut rows = Vec::new();
        for &(component, count) in support {
            for _ in 0..count {
                rows.push(
                    (0..n_components)
                        .map(|k| {
                            if k == component {
                                LogProb::from(Prob(0.99))
                            } else {
                                LogProb::from(Prob(0.001))
                            }
                        })
                        .collect_vec(),
                );
            }
        }
        rows
    }

    #[test]
    fn test_fit_alphas_positive_and_converged() {
        let fit = fit_sample(
            &[1.0, 1.0],
            &rows(&[(0, 7), (1, 3)], 2),
            &MeanFieldOptions::default(),
        );
        assert!(fit.converged);
        assert!(fit.alphas.iter().all(|&a| a > 0.0));
        // total pseudo-counts: prior mass + reads
        assert_relative_eq!(fit.alphas.iter().sum::<f64>(), 2.0 + 10.0, epsilon = 1e-3);
        // reads split roughly 7:3
        assert!(fit.alphas[0] > fit.alphas[1]);
    }

    #[test]
    fn test_fit_no_reads_keeps_prior() {
        let fit = fit_sample(&[2.0, 3.0], &[], &MeanFieldOptions::default());
        assert!(fit.converged);
        assert_relative_eq!(fit.alphas[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.alphas[1], 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.elbo, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_deterministic() {
        let data = rows(&[(0, 4), (1, 6)], 2);
        let a = fit_sample(&[0.75, 0.75], &data, &MeanFieldOptions::default());
        let b = fit_sample(&[0.75, 0.75], &data, &MeanFieldOptions::default());
        assert_eq!(a.alphas, b.alphas);
        assert_eq!(a.elbo, b.elbo);
    }

    #[test]
    fn test_elbo_favours_matching_genotype() {
        // reads all support component 0; a mixture whose components both match
        // the data has a higher bound than one with a useless component
        let matching = fit_sample(
            &[1.0, 1.0],
            &rows(&[(0, 10)], 2),
            &MeanFieldOptions::default(),
        );
        let mismatching = fit_sample(
            &[1.0, 1.0],
            &rows(&[(1, 10)], 2),
            &MeanFieldOptions::default(),
        );
        assert_relative_eq!(matching.elbo, mismatching.elbo, epsilon = 1e-6);

        let all_bad: Vec<Vec<LogProb>> = (0..10)
            .map(|_| vec![LogProb::from(Prob(0.001)), LogProb::from(Prob(0.001))])
            .collect_vec();
        let bad = fit_sample(&[1.0, 1.0], &all_bad, &MeanFieldOptions::default());
        assert!(matching.elbo > bad.elbo);
    }

    #[test]
    fn test_combine_genotype_fits() {
        let (posteriors, evidence) =
            combine_genotype_fits(&[LogProb(0.0), LogProb(0.0)], &[0.0, (0.5f64).ln()]).unwrap();
        assert_relative_eq!(posteriors.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(posteriors[0], 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(*evidence, 1.5f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_combine_underflow() {
        assert_eq!(
            combine_genotype_fits(&[LogProb::ln_zero()], &[f64::NEG_INFINITY]).unwrap_err(),
            ModelError::NumericalUnderflow
        );
    }
}

// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Joint posterior over (mother, father, child) genotype triples, combining
//! per-sample likelihoods, the germline prior on the parents and the
//! de-novo prior on the child.
//!
//! The full cartesian product is pruned before normalisation: triples whose
//! joint log-probability falls more than `prune_gap` nats below the current
//! best are dropped, and at most `max_joint` triples are kept. Marginals for
//! each family member are obtained by summation over the retained triples.

use bio::stats::LogProb;
use itertools::Itertools;
use ordered_float::NotNan;

use crate::likelihood::PrimedLikelihoods;
use crate::model::individual::genotype_log_likelihood;
use crate::model::priors::{CoalescentModel, DeNovoModel};
use crate::model::ModelError;
use crate::utils::stats::is_probability_simplex;
use crate::utils::{CancelToken, PROB_SUM_TOLERANCE};
use crate::variants::genotype::Genotype;
use crate::variants::haplotype::{HaplotypeId, HaplotypePool};

#[derive(Clone, Copy, Debug)]
pub struct TrioModelOptions {
    /// Maximum number of retained triples.
    pub max_joint: usize,
    /// Triples this many nats below the best joint log-probability are
    /// pruned.
    pub prune_gap: f64,
}

impl Default for TrioModelOptions {
    fn default() -> Self {
        TrioModelOptions {
            max_joint: 10_000,
            prune_gap: 20.0,
        }
    }
}

/// One retained triple with its normalised posterior probability. Members
/// are indices into the respective candidate genotype sets.
#[derive(Clone, Copy, Debug)]
pub struct JointProbability {
    pub maternal: usize,
    pub paternal: usize,
    pub child: usize,
    pub probability: f64,
}

#[derive(Clone, Debug)]
pub struct TrioLatents {
    pub joint: Vec<JointProbability>,
    /// Marginal posterior per maternal candidate genotype.
    pub maternal_marginals: Vec<f64>,
    /// Marginal posterior per paternal candidate genotype.
    pub paternal_marginals: Vec<f64>,
    /// Marginal posterior per child candidate genotype.
    pub child_marginals: Vec<f64>,
    pub log_evidence: LogProb,
}

impl TrioLatents {
    pub fn map_triple(&self) -> Option<&JointProbability> {
        self.joint.iter().max_by_key(|triple| {
            NotNan::new(triple.probability).expect("bug: NaN joint probability")
        })
    }
}

#[derive(Clone, Debug)]
pub struct TrioModel<'a> {
    germline_prior: &'a CoalescentModel,
    denovo_prior: &'a DeNovoModel,
    options: TrioModelOptions,
}

impl<'a> TrioModel<'a> {
    pub fn new(germline_prior: &'a CoalescentModel, denovo_prior: &'a DeNovoModel) -> Self {
        TrioModel {
            germline_prior,
            denovo_prior,
            options: TrioModelOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TrioModelOptions) -> Self {
        self.options = options;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn infer(
        &self,
        pool: &HaplotypePool,
        maternal_genotypes: &[Genotype<HaplotypeId>],
        paternal_genotypes: &[Genotype<HaplotypeId>],
        child_genotypes: &[Genotype<HaplotypeId>],
        maternal_likelihoods: &PrimedLikelihoods,
        paternal_likelihoods: &PrimedLikelihoods,
        child_likelihoods: &PrimedLikelihoods,
        cancel: &CancelToken,
    ) -> Result<TrioLatents, ModelError> {
        let log_likelihoods = |genotypes: &[Genotype<HaplotypeId>],
                               likelihoods: &PrimedLikelihoods| {
            genotypes
                .iter()
                .map(|genotype| genotype_log_likelihood(genotype, likelihoods))
                .collect_vec()
        };
        let maternal_log_likelihoods = log_likelihoods(maternal_genotypes, maternal_likelihoods);
        let paternal_log_likelihoods = log_likelihoods(paternal_genotypes, paternal_likelihoods);
        let child_log_likelihoods = log_likelihoods(child_genotypes, child_likelihoods);

        let maternal_log_priors = maternal_genotypes
            .iter()
            .map(|genotype| self.germline_prior.log_prior_genotype(pool, genotype))
            .collect_vec();
        let paternal_log_priors = paternal_genotypes
            .iter()
            .map(|genotype| self.germline_prior.log_prior_genotype(pool, genotype))
            .collect_vec();

        let mut entries: Vec<(usize, usize, usize, LogProb)> = Vec::new();
        let mut best = LogProb::ln_zero();

        for (m, maternal) in maternal_genotypes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            let maternal_part = maternal_log_likelihoods[m] + maternal_log_priors[m];

            for (f, paternal) in paternal_genotypes.iter().enumerate() {
                let parental_part =
                    maternal_part + paternal_log_likelihoods[f] + paternal_log_priors[f];
                if *parental_part < *best - self.options.prune_gap {
                    // no child term can lift this pair above the gap
                    continue;
                }

                for (c, child) in child_genotypes.iter().enumerate() {
                    let joint = parental_part
                        + child_log_likelihoods[c]
                        + self.denovo_prior.log_prior(pool, child, maternal, paternal);
                    if joint > best {
                        best = joint;
                    }
                    if *joint >= *best - self.options.prune_gap {
                        entries.push((m, f, c, joint));
                    }
                }
            }

            if entries.len() > 4 * self.options.max_joint {
                let cutoff = *best - self.options.prune_gap;
                entries.retain(|&(_, _, _, joint)| *joint >= cutoff);
            }
        }

        let cutoff = *best - self.options.prune_gap;
        entries.retain(|&(_, _, _, joint)| *joint >= cutoff);
        if entries.len() > self.options.max_joint {
            entries.sort_by_key(|&(_, _, _, joint)| {
                std::cmp::Reverse(NotNan::new(*joint).expect("bug: NaN joint log-probability"))
            });
            entries.truncate(self.options.max_joint);
        }

        let log_evidence =
            LogProb::ln_sum_exp(&entries.iter().map(|&(_, _, _, joint)| joint).collect_vec());
        if log_evidence == LogProb::ln_zero() {
            return Err(ModelError::NumericalUnderflow);
        }

        let mut maternal_marginals = vec![0.0; maternal_genotypes.len()];
        let mut paternal_marginals = vec![0.0; paternal_genotypes.len()];
        let mut child_marginals = vec![0.0; child_genotypes.len()];
        let joint = entries
            .iter()
            .map(|&(m, f, c, joint)| {
                let probability = (joint - log_evidence).exp();
                maternal_marginals[m] += probability;
                paternal_marginals[f] += probability;
                child_marginals[c] += probability;
                JointProbability {
                    maternal: m,
                    paternal: f,
                    child: c,
                    probability,
                }
            })
            .collect_vec();

        debug_assert!(is_probability_simplex(
            &maternal_marginals,
            PROB_SUM_TOLERANCE
        ));
        debug_assert!(is_probability_simplex(&child_marginals, PROB_SUM_TOLERANCE));

        Ok(TrioLatents {
            joint,
            maternal_marginals,
            paternal_marginals,
            child_marginals,
            log_evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::HaplotypeLikelihoodCache;
    use crate::model::priors::{CoalescentParams, DeNovoParams};
    use crate::model::tests::{push_reads, reference_haplotype, two_haplotype_pool};
    use crate::variants::genotype::generate_all_genotypes;
    use approx::assert_relative_eq;

    fn setup_cache(
        mother_support: &[(usize, usize)],
        father_support: &[(usize, usize)],
        child_support: &[(usize, usize)],
    ) -> HaplotypeLikelihoodCache {
        let mut cache = HaplotypeLikelihoodCache::new(2);
        push_reads(&mut cache, "mother", 2, mother_support);
        push_reads(&mut cache, "father", 2, father_support);
        push_reads(&mut cache, "child", 2, child_support);
        cache
    }

    fn infer(cache: &HaplotypeLikelihoodCache) -> (Vec<Genotype<HaplotypeId>>, TrioLatents) {
        let pool = two_haplotype_pool();
        let genotypes = generate_all_genotypes(pool.len(), 2);
        let germline_prior =
            CoalescentModel::new(reference_haplotype(), CoalescentParams::default());
        let denovo_prior = DeNovoModel::new(DeNovoParams { rate: 1e-8 });
        let model = TrioModel::new(&germline_prior, &denovo_prior);
        let latents = model
            .infer(
                &pool,
                &genotypes,
                &genotypes,
                &genotypes,
                &cache.prime("mother").unwrap(),
                &cache.prime("father").unwrap(),
                &cache.prime("child").unwrap(),
                &CancelToken::new(),
            )
            .unwrap();
        (genotypes, latents)
    }

    #[test]
    fn test_mendelian_trio() {
        // everyone hom-ref
        let cache = setup_cache(&[(0, 6)], &[(0, 6)], &[(0, 6)]);
        let (genotypes, latents) = infer(&cache);

        let map = latents.map_triple().unwrap();
        assert_eq!(genotypes[map.maternal].as_slice(), &[0, 0]);
        assert_eq!(genotypes[map.paternal].as_slice(), &[0, 0]);
        assert_eq!(genotypes[map.child].as_slice(), &[0, 0]);
        assert!(map.probability > 0.9);
        assert_relative_eq!(
            latents.joint.iter().map(|t| t.probability).sum::<f64>(),
            1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_denovo_trio() {
        // parents deeply covered hom-ref, child het with strong support;
        // parental depth has to outweigh the cheaper inherited-het prior
        let cache = setup_cache(&[(0, 30)], &[(0, 30)], &[(0, 6), (1, 6)]);
        let (genotypes, latents) = infer(&cache);

        let map = latents.map_triple().unwrap();
        assert_eq!(genotypes[map.maternal].as_slice(), &[0, 0]);
        assert_eq!(genotypes[map.paternal].as_slice(), &[0, 0]);
        assert_eq!(genotypes[map.child].as_slice(), &[0, 1]);
    }

    #[test]
    fn test_parent_swap_symmetry() {
        let cache = setup_cache(&[(0, 8)], &[(0, 4), (1, 4)], &[(0, 6), (1, 2)]);
        let swapped = setup_cache(&[(0, 4), (1, 4)], &[(0, 8)], &[(0, 6), (1, 2)]);

        let pool = two_haplotype_pool();
        let genotypes = generate_all_genotypes(pool.len(), 2);
        let germline_prior =
            CoalescentModel::new(reference_haplotype(), CoalescentParams::default());
        let denovo_prior = DeNovoModel::new(DeNovoParams::default());
        let model = TrioModel::new(&germline_prior, &denovo_prior);

        let a = model
            .infer(
                &pool,
                &genotypes,
                &genotypes,
                &genotypes,
                &cache.prime("mother").unwrap(),
                &cache.prime("father").unwrap(),
                &cache.prime("child").unwrap(),
                &CancelToken::new(),
            )
            .unwrap();
        let b = model
            .infer(
                &pool,
                &genotypes,
                &genotypes,
                &genotypes,
                &swapped.prime("mother").unwrap(),
                &swapped.prime("father").unwrap(),
                &swapped.prime("child").unwrap(),
                &CancelToken::new(),
            )
            .unwrap();

        for (x, y) in a.maternal_marginals.iter().zip(b.paternal_marginals.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
        for (x, y) in a.paternal_marginals.iter().zip(b.maternal_marginals.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
        for (x, y) in a.child_marginals.iter().zip(b.child_marginals.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pruning_keeps_map() {
        let cache = setup_cache(&[(0, 8)], &[(0, 8)], &[(0, 8)]);
        let pool = two_haplotype_pool();
        let genotypes = generate_all_genotypes(pool.len(), 2);
        let germline_prior =
            CoalescentModel::new(reference_haplotype(), CoalescentParams::default());
        let denovo_prior = DeNovoModel::new(DeNovoParams::default());
        let model = TrioModel::new(&germline_prior, &denovo_prior).with_options(TrioModelOptions {
            max_joint: 1,
            prune_gap: 20.0,
        });

        let latents = model
            .infer(
                &pool,
                &genotypes,
                &genotypes,
                &genotypes,
                &cache.prime("mother").unwrap(),
                &cache.prime("father").unwrap(),
                &cache.prime("child").unwrap(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(latents.joint.len(), 1);
        let map = latents.map_triple().unwrap();
        assert_eq!(genotypes[map.child].as_slice(), &[0, 0]);
        assert_relative_eq!(map.probability, 1.0);
    }

    #[test]
    fn test_underflow() {
        let pool = two_haplotype_pool();
        let genotypes = generate_all_genotypes(pool.len(), 2);
        let mut cache = HaplotypeLikelihoodCache::new(2);
        for sample in &["mother", "father", "child"] {
            cache.push_read(sample, vec![LogProb::ln_zero(), LogProb::ln_zero()]);
        }
        let germline_prior =
            CoalescentModel::new(reference_haplotype(), CoalescentParams::default());
        let denovo_prior = DeNovoModel::new(DeNovoParams::default());
        let model = TrioModel::new(&germline_prior, &denovo_prior);
        assert_eq!(
            model
                .infer(
                    &pool,
                    &genotypes,
                    &genotypes,
                    &genotypes,
                    &cache.prime("mother").unwrap(),
                    &cache.prime("father").unwrap(),
                    &cache.prime("child").unwrap(),
                    &CancelToken::new(),
                )
                .unwrap_err(),
            ModelError::NumericalUnderflow
        );
    }
}

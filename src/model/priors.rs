// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Prior models over haplotypes and genotypes: a coalescent-style germline
//! prior relative to the reference haplotype, a somatic-mutation prior on
//! top of it, and a de-novo prior for trio inference.

use std::collections::BTreeSet;

use bio::stats::LogProb;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::variants::genotype::{CancerGenotype, Genotype};
use crate::variants::haplotype::{Haplotype, HaplotypeId, HaplotypePool};

/// Per-site substitution rates of the germline prior. Transitions
/// (purine<->purine, pyrimidine<->pyrimidine) are roughly twice as likely as
/// transversions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoalescentParams {
    pub transition_rate: f64,
    pub transversion_rate: f64,
}

impl Default for CoalescentParams {
    fn default() -> Self {
        CoalescentParams {
            transition_rate: 0.000222,
            transversion_rate: 0.000111,
        }
    }
}

fn is_purine(base: u8) -> bool {
    matches!(base.to_ascii_uppercase(), b'A' | b'G')
}

fn is_transition(from: u8, to: u8) -> bool {
    is_purine(from) == is_purine(to)
}

/// Coalescent-style prior over haplotype sets, relative to the reference
/// haplotype of the region. The log-prior of a haplotype is the sum of the
/// per-difference substitution log-rates, hence monotone decreasing in edit
/// distance from the reference and symmetric over haplotype identity.
#[derive(Clone, Debug)]
pub struct CoalescentModel {
    reference: Haplotype,
    params: CoalescentParams,
}

impl CoalescentModel {
    pub fn new(reference: Haplotype, params: CoalescentParams) -> Self {
        CoalescentModel { reference, params }
    }

    pub fn reference(&self) -> &Haplotype {
        &self.reference
    }

    /// `ln P(haplotype)` relative to the reference.
    pub fn log_prior_haplotype(&self, haplotype: &Haplotype) -> LogProb {
        assert_eq!(
            self.reference.mapped_region(),
            haplotype.mapped_region(),
            "bug: prior requires haplotypes spanning the reference region"
        );
        let mut prior = 0.0;
        for (&from, &to) in self.reference.bases().iter().zip(haplotype.bases().iter()) {
            if from != to {
                prior += if is_transition(from, to) {
                    self.params.transition_rate.ln()
                } else {
                    self.params.transversion_rate.ln()
                };
            }
        }
        LogProb(prior)
    }

    /// Per-haplotype log-priors for a whole pool, indexed by haplotype id.
    pub fn pool_log_priors(&self, pool: &HaplotypePool) -> Vec<LogProb> {
        pool.iter()
            .map(|haplotype| self.log_prior_haplotype(haplotype))
            .collect_vec()
    }

    /// `ln P(genotype)`: product of the element priors.
    pub fn log_prior_genotype(
        &self,
        pool: &HaplotypePool,
        genotype: &Genotype<HaplotypeId>,
    ) -> LogProb {
        genotype
            .iter()
            .map(|&id| self.log_prior_haplotype(&pool[id]))
            .sum()
    }
}

/// Somatic-mutation prior: the germline prior of the cancer genotype's
/// germline component, multiplied by a per-base mutation-rate factor
/// proportional to the somatic haplotype's edit distance from the nearest
/// germline haplotype.
#[derive(Clone, Debug)]
pub struct SomaticMutationModel<'a> {
    germline: &'a CoalescentModel,
    somatic_mutation_rate: f64,
}

impl<'a> SomaticMutationModel<'a> {
    pub fn new(germline: &'a CoalescentModel, somatic_mutation_rate: f64) -> Self {
        assert!(somatic_mutation_rate > 0.0 && somatic_mutation_rate < 1.0);
        SomaticMutationModel {
            germline,
            somatic_mutation_rate,
        }
    }

    /// `ln P(somatic | germline)` for the somatic component alone.
    pub fn log_prior_somatic(
        &self,
        pool: &HaplotypePool,
        germline: &Genotype<HaplotypeId>,
        somatic: HaplotypeId,
    ) -> LogProb {
        let somatic_haplotype = &pool[somatic];
        let min_distance = germline
            .copy_unique()
            .iter()
            .map(|&id| pool[id].edit_distance(somatic_haplotype))
            .min()
            .unwrap_or(0);
        LogProb(min_distance as f64 * self.somatic_mutation_rate.ln())
    }

    /// `ln P(cancer genotype)`.
    pub fn log_prior(&self, pool: &HaplotypePool, genotype: &CancerGenotype) -> LogProb {
        self.germline.log_prior_genotype(pool, genotype.germline())
            + self.log_prior_somatic(pool, genotype.germline(), genotype.somatic())
    }
}

/// Per-site de-novo mutation rate of the trio prior.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeNovoParams {
    pub rate: f64,
}

impl Default for DeNovoParams {
    fn default() -> Self {
        DeNovoParams { rate: 1e-8 }
    }
}

/// De-novo prior: probability of the child genotype given the parental
/// genotypes, integrating the per-site de-novo rate.
///
/// The child multiset is split into a maternal and a paternal gamete; gamete
/// sizes follow the meiotic halves of the respective parental ploidy
/// (floor/ceil for odd ploidies). Transmission of a haplotype from a parent
/// is modelled as a uniform draw over the parental slots with a
/// `rate^edit_distance` mutation factor; splits whose sizes cannot add up to
/// the child ploidy have probability zero.
#[derive(Clone, Debug)]
pub struct DeNovoModel {
    params: DeNovoParams,
}

impl DeNovoModel {
    pub fn new(params: DeNovoParams) -> Self {
        assert!(params.rate > 0.0 && params.rate < 1.0);
        DeNovoModel { params }
    }

    fn gamete_sizes(parental_ploidy: usize) -> Vec<usize> {
        if parental_ploidy % 2 == 0 {
            vec![parental_ploidy / 2]
        } else {
            vec![parental_ploidy / 2, parental_ploidy / 2 + 1]
        }
    }

    /// Probability of transmitting `haplotype` in one meiotic draw from
    /// `parent`.
    fn transmission_prob(
        &self,
        pool: &HaplotypePool,
        haplotype: HaplotypeId,
        parent: &Genotype<HaplotypeId>,
    ) -> f64 {
        let target = &pool[haplotype];
        parent
            .iter()
            .map(|&id| {
                self.params
                    .rate
                    .powi(pool[id].edit_distance(target) as i32)
            })
            .sum::<f64>()
            / parent.ploidy() as f64
    }

    /// Probability of drawing the gamete multiset from the parent, with
    /// draws treated as independent.
    fn gamete_prob(
        &self,
        pool: &HaplotypePool,
        gamete: &[HaplotypeId],
        parent: &Genotype<HaplotypeId>,
    ) -> f64 {
        let mut prob = multiset_permutations(gamete) as f64;
        for &haplotype in gamete {
            prob *= self.transmission_prob(pool, haplotype, parent);
        }
        prob
    }

    /// `ln P(child | mother, father)`.
    pub fn log_prior(
        &self,
        pool: &HaplotypePool,
        child: &Genotype<HaplotypeId>,
        mother: &Genotype<HaplotypeId>,
        father: &Genotype<HaplotypeId>,
    ) -> LogProb {
        if mother.ploidy() == 0 || father.ploidy() == 0 {
            return LogProb::ln_zero();
        }

        let maternal_sizes = Self::gamete_sizes(mother.ploidy());
        let paternal_sizes = Self::gamete_sizes(father.ploidy());

        let mut total = 0.0;
        for &k in &maternal_sizes {
            if child.ploidy() < k || !paternal_sizes.contains(&(child.ploidy() - k)) {
                continue;
            }
            for (maternal_part, paternal_part) in multiset_splits(child.as_slice(), k) {
                total += self.gamete_prob(pool, &maternal_part, mother)
                    * self.gamete_prob(pool, &paternal_part, father);
            }
        }

        if total > 0.0 {
            LogProb(total.ln())
        } else {
            LogProb::ln_zero()
        }
    }
}

/// Distinct splits of `elements` into an ordered pair of multisets of sizes
/// `(k, len - k)`.
fn multiset_splits(elements: &[HaplotypeId], k: usize) -> Vec<(Vec<HaplotypeId>, Vec<HaplotypeId>)> {
    let mut splits = BTreeSet::new();
    for chosen in (0..elements.len()).combinations(k) {
        let mut left = Vec::with_capacity(k);
        let mut right = Vec::with_capacity(elements.len() - k);
        for (i, &element) in elements.iter().enumerate() {
            if chosen.contains(&i) {
                left.push(element);
            } else {
                right.push(element);
            }
        }
        // elements are sorted, so left/right are too: dedup via the set
        splits.insert((left, right));
    }
    splits.into_iter().collect_vec()
}

/// Number of distinct orderings of a sorted multiset.
fn multiset_permutations(elements: &[HaplotypeId]) -> u64 {
    let mut result = factorial(elements.len() as u64);
    for (_, group) in &elements.iter().group_by(|&&e| e) {
        result /= factorial(group.count() as u64);
    }
    result
}

fn factorial(n: u64) -> u64 {
    (1..=n).product::<u64>().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{reference_haplotype, snv, two_haplotype_pool};
    use crate::variants::{GenomicRegion, Variant};
    use approx::assert_relative_eq;

    fn coalescent() -> CoalescentModel {
        CoalescentModel::new(reference_haplotype(), CoalescentParams::default())
    }

    #[test]
    fn test_coalescent_monotone_in_edit_distance() {
        let model = coalescent();
        let one = reference_haplotype().with_substitutions(&[snv()]);
        let two = one.with_substitutions(&[Variant::new(
            GenomicRegion::new("1", 106, 107),
            b"G".to_vec(),
            b"C".to_vec(),
        )]);
        let p_ref = model.log_prior_haplotype(&reference_haplotype());
        let p_one = model.log_prior_haplotype(&one);
        let p_two = model.log_prior_haplotype(&two);
        assert!(p_ref > p_one);
        assert!(p_one > p_two);
        assert_relative_eq!(*p_ref, 0.0);
    }

    #[test]
    fn test_coalescent_transition_vs_transversion() {
        let model = coalescent();
        // reference base at 104 is A: A->G is a transition, A->T a transversion
        let transition = reference_haplotype().with_substitutions(&[Variant::new(
            GenomicRegion::new("1", 104, 105),
            b"A".to_vec(),
            b"G".to_vec(),
        )]);
        let transversion = reference_haplotype().with_substitutions(&[snv()]);
        assert!(
            model.log_prior_haplotype(&transition) > model.log_prior_haplotype(&transversion)
        );
    }

    #[test]
    fn test_coalescent_genotype_prior_is_product() {
        let model = coalescent();
        let pool = two_haplotype_pool();
        let het = Genotype::new(vec![0, 1]);
        let expected = model.log_prior_haplotype(&pool[0]) + model.log_prior_haplotype(&pool[1]);
        assert_relative_eq!(*model.log_prior_genotype(&pool, &het), *expected);
    }

    #[test]
    fn test_somatic_prior_distance_factor() {
        let model = coalescent();
        let somatic_model = SomaticMutationModel::new(&model, 1e-5);
        let pool = two_haplotype_pool();
        let hom_ref = Genotype::new(vec![0, 0]);

        // somatic haplotype equals a germline element: no mutation factor
        let same = somatic_model.log_prior_somatic(&pool, &hom_ref, 0);
        assert_relative_eq!(*same, 0.0);

        // somatic haplotype one substitution away
        let one_away = somatic_model.log_prior_somatic(&pool, &hom_ref, 1);
        assert_relative_eq!(*one_away, 1e-5f64.ln());
    }

    #[test]
    fn test_denovo_prior_mendelian_vs_denovo() {
        let denovo = DeNovoModel::new(DeNovoParams { rate: 1e-8 });
        let pool = two_haplotype_pool();
        let hom_ref = Genotype::new(vec![0, 0]);
        let het = Genotype::new(vec![0, 1]);

        let mendelian = denovo.log_prior(&pool, &hom_ref, &hom_ref, &hom_ref);
        let novel = denovo.log_prior(&pool, &het, &hom_ref, &hom_ref);
        assert!(mendelian > novel);
        assert_relative_eq!(*mendelian, 0.0, epsilon = 1e-6);
        // the alt copy may come from either parent
        assert_relative_eq!(*novel, (2.0f64 * 1e-8).ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_denovo_prior_symmetric_in_parents() {
        let denovo = DeNovoModel::new(DeNovoParams::default());
        let pool = two_haplotype_pool();
        let hom_ref = Genotype::new(vec![0, 0]);
        let het = Genotype::new(vec![0, 1]);

        let a = denovo.log_prior(&pool, &het, &hom_ref, &het);
        let b = denovo.log_prior(&pool, &het, &het, &hom_ref);
        assert_relative_eq!(*a, *b);
    }

    #[test]
    fn test_denovo_prior_ploidy_mismatch() {
        let denovo = DeNovoModel::new(DeNovoParams::default());
        let pool = two_haplotype_pool();
        let diploid = Genotype::new(vec![0, 0]);
        let tetraploid = Genotype::new(vec![0, 0, 0, 0]);

        // two diploid parents cannot produce a tetraploid child
        assert_eq!(
            denovo.log_prior(&pool, &tetraploid, &diploid, &diploid),
            LogProb::ln_zero()
        );
    }

    #[test]
    fn test_multiset_splits() {
        let splits = multiset_splits(&[0, 0, 1], 1);
        assert_eq!(
            splits,
            vec![(vec![0], vec![0, 1]), (vec![1], vec![0, 0])]
        );
    }

    #[test]
    fn test_multiset_permutations() {
        assert_eq!(multiset_permutations(&[0, 1]), 2);
        assert_eq!(multiset_permutations(&[0, 0]), 1);
        assert_eq!(multiset_permutations(&[0, 0, 1]), 3);
        assert_eq!(multiset_permutations(&[]), 1);
    }
}

// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Germline calling for a single sample with the exact individual model.

use bio::stats::LogProb;
use derive_builder::Builder;
use itertools::Itertools;

use crate::calling::{GenotypeCall, RegionInput, VariantCall};
use crate::errors::Error;
use crate::likelihood::SampleName;
use crate::model::individual::{IndividualLatents, IndividualModel};
use crate::model::priors::{CoalescentModel, CoalescentParams};
use crate::model::ModelError;
use crate::utils::Phred;
use crate::variants::genotype::{
    containment_index, generate_all_genotypes, genotype_contains_allele, splice, Genotype,
};
use crate::variants::haplotype::{Haplotype, HaplotypeId};

#[derive(Builder, Clone, Debug)]
pub struct IndividualCallerParams {
    pub ploidy: u32,
    pub min_variant_posterior: Phred,
    #[builder(default)]
    pub germline_prior: CoalescentParams,
}

#[derive(Clone, Debug)]
pub struct IndividualCaller {
    samples: Vec<SampleName>,
    params: IndividualCallerParams,
}

#[derive(Clone, Debug)]
pub struct IndividualCallerLatents {
    pub genotypes: Vec<Genotype<HaplotypeId>>,
    pub inferences: IndividualLatents,
}

impl IndividualCallerLatents {
    pub(crate) fn haplotype_posteriors(&self, input: &RegionInput) -> Vec<f64> {
        let index = containment_index(&self.genotypes, input.haplotypes.len());
        index
            .iter()
            .map(|genotype_ids| {
                genotype_ids
                    .iter()
                    .map(|&g| self.inferences.genotype_posteriors[g])
                    .sum()
            })
            .collect_vec()
    }
}

impl IndividualCaller {
    pub fn new(sample: SampleName, params: IndividualCallerParams) -> Result<Self, Error> {
        if params.ploidy == 0 {
            return Err(Error::ZeroPloidy);
        }
        Ok(IndividualCaller {
            samples: vec![sample],
            params,
        })
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    pub(crate) fn infer(
        &self,
        input: &RegionInput,
    ) -> Result<IndividualCallerLatents, ModelError> {
        let pool = &input.haplotypes;
        let genotypes = generate_all_genotypes(pool.len(), self.params.ploidy);

        let reference =
            Haplotype::from_reference(input.region.clone(), &input.reference_sequence);
        let prior = CoalescentModel::new(reference, self.params.germline_prior);

        let likelihoods = input
            .likelihoods
            .prime(&self.samples[0])
            .expect("bug: caller sample missing from likelihood cache");

        let inferences = IndividualModel::new(&prior).infer(pool, &genotypes, &likelihoods)?;

        Ok(IndividualCallerLatents {
            genotypes,
            inferences,
        })
    }

    pub(crate) fn call_variants(
        &self,
        input: &RegionInput,
        latents: &IndividualCallerLatents,
    ) -> Vec<VariantCall> {
        let pool = &input.haplotypes;
        let posteriors = &latents.inferences.genotype_posteriors;
        let map_genotype = &latents.genotypes[latents
            .inferences
            .map_genotype()
            .expect("bug: empty genotype space")];

        let mut calls = Vec::new();
        for candidate in &input.candidates {
            let alt = candidate.alt_allele();

            let error_mass: f64 = latents
                .genotypes
                .iter()
                .zip(posteriors.iter())
                .filter(|(genotype, _)| !genotype_contains_allele(pool, genotype, alt))
                .map(|(_, &posterior)| posterior)
                .sum();
            let posterior = Phred::from_log_error_prob(LogProb(error_mass.ln()));

            if posterior < self.params.min_variant_posterior
                || !genotype_contains_allele(pool, map_genotype, alt)
            {
                continue;
            }

            let spliced = match splice(pool, map_genotype, candidate.region()) {
                Some(spliced) => spliced,
                None => continue,
            };
            let genotype_error: f64 = latents
                .genotypes
                .iter()
                .zip(posteriors.iter())
                .filter(|(genotype, _)| {
                    splice(pool, genotype, candidate.region()).as_ref() != Some(&spliced)
                })
                .map(|(_, &posterior)| posterior)
                .sum();
            let genotype_posterior = Phred::from_log_error_prob(LogProb(genotype_error.ln()));

            calls.push(
                VariantCall::new(candidate.clone(), posterior).with_sample_calls(vec![(
                    self.samples[0].clone(),
                    GenotypeCall::new(spliced, genotype_posterior),
                )]),
            );
        }
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::{Caller, RegionOutcome};
    use crate::likelihood::HaplotypeLikelihoodCache;
    use crate::model::tests::{push_reads, snv, test_region, two_haplotype_pool};
    use crate::utils::CancelToken;
    use crate::variants::haplotype::HaplotypePool;

    fn params() -> IndividualCallerParams {
        IndividualCallerParamsBuilder::default()
            .ploidy(2u32)
            .min_variant_posterior(Phred::new(20.0))
            .build()
            .unwrap()
    }

    fn region_input(
        pool: HaplotypePool,
        cache: HaplotypeLikelihoodCache,
    ) -> RegionInput {
        RegionInput {
            region: test_region(),
            reference_sequence: b"ACGTACGTAC".to_vec(),
            haplotypes: pool,
            likelihoods: cache,
            candidates: vec![snv()],
        }
    }

    #[test]
    fn test_construction_rejects_zero_ploidy() {
        let params = IndividualCallerParamsBuilder::default()
            .ploidy(0u32)
            .min_variant_posterior(Phred::new(20.0))
            .build()
            .unwrap();
        assert_eq!(
            IndividualCaller::new("sample".to_owned(), params).unwrap_err(),
            Error::ZeroPloidy
        );
    }

    #[test]
    fn test_het_snv_is_called() {
        let pool = two_haplotype_pool();
        let mut cache = HaplotypeLikelihoodCache::new(pool.len());
        push_reads(&mut cache, "sample", pool.len(), &[(0, 5), (1, 5)]);

        let caller = Caller::Individual(
            IndividualCaller::new("sample".to_owned(), params()).unwrap(),
        );
        let outcome = caller.call_region(&region_input(pool, cache), &CancelToken::new());

        let calls = outcome.calls().unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.posterior().score() >= 30.0);
        let (sample, genotype_call) = &call.sample_calls()[0];
        assert_eq!(sample, "sample");
        let bases = genotype_call
            .genotype()
            .iter()
            .map(|allele| allele.bases().to_vec())
            .collect::<Vec<_>>();
        assert_eq!(bases, vec![b"A".to_vec(), b"T".to_vec()]);
    }

    #[test]
    fn test_ref_only_region_yields_no_calls() {
        let pool = HaplotypePool::from_haplotypes(vec![
            crate::model::tests::reference_haplotype(),
        ]);
        let mut cache = HaplotypeLikelihoodCache::new(pool.len());
        push_reads(&mut cache, "sample", pool.len(), &[(0, 5)]);

        let caller = Caller::Individual(
            IndividualCaller::new("sample".to_owned(), params()).unwrap(),
        );
        let input = region_input(pool, cache);

        let latents = caller.infer_latents(&input, &CancelToken::new()).unwrap();
        if let crate::calling::Latents::Individual(ref latents) = latents {
            assert_eq!(latents.inferences.genotype_posteriors, vec![1.0]);
        } else {
            unreachable!();
        }

        let outcome = caller.call_region(&input, &CancelToken::new());
        assert_eq!(outcome, RegionOutcome::Calls(Vec::new()));
    }

    #[test]
    fn test_empty_input_is_success() {
        let caller = Caller::Individual(
            IndividualCaller::new("sample".to_owned(), params()).unwrap(),
        );
        let input = RegionInput {
            region: test_region(),
            reference_sequence: b"ACGTACGTAC".to_vec(),
            haplotypes: HaplotypePool::from_haplotypes(Vec::new()),
            likelihoods: HaplotypeLikelihoodCache::new(0),
            candidates: vec![snv()],
        };
        assert_eq!(
            caller.call_region(&input, &CancelToken::new()),
            RegionOutcome::Calls(Vec::new())
        );
    }

    #[test]
    fn test_absent_alt_never_called() {
        // candidate alt allele is not carried by any pooled haplotype
        let pool = HaplotypePool::from_haplotypes(vec![
            crate::model::tests::reference_haplotype(),
        ]);
        let mut cache = HaplotypeLikelihoodCache::new(pool.len());
        push_reads(&mut cache, "sample", pool.len(), &[(0, 10)]);

        let caller =
            IndividualCaller::new("sample".to_owned(), params()).unwrap();
        let input = region_input(pool, cache);
        let latents = caller.infer(&input).unwrap();
        let calls = caller.call_variants(&input, &latents);
        assert!(calls.is_empty());
    }
}

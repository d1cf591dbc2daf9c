// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Trio calling: germline variants plus de-novo calls for the child, driven
//! by the joint trio model.

use bio::stats::LogProb;
use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::calling::{GenotypeCall, RegionInput, VariantCall};
use crate::errors::Error;
use crate::likelihood::SampleName;
use crate::model::priors::{
    CoalescentModel, CoalescentParams, DeNovoModel, DeNovoParams,
};
use crate::model::trio::{JointProbability, TrioLatents, TrioModel, TrioModelOptions};
use crate::model::ModelError;
use crate::utils::{CancelToken, Phred};
use crate::variants::genotype::{
    generate_all_genotypes, genotype_contains_allele, splice, Genotype,
};
use crate::variants::haplotype::{Haplotype, HaplotypeId, HaplotypePool};
use crate::variants::{Allele, GenomicRegion};

/// The three samples of a family trio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trio {
    mother: SampleName,
    father: SampleName,
    child: SampleName,
}

impl Trio {
    pub fn new(mother: SampleName, father: SampleName, child: SampleName) -> Result<Self, Error> {
        if mother == father || mother == child || father == child {
            return Err(Error::InvalidTrio);
        }
        Ok(Trio {
            mother,
            father,
            child,
        })
    }

    pub fn mother(&self) -> &SampleName {
        &self.mother
    }

    pub fn father(&self) -> &SampleName {
        &self.father
    }

    pub fn child(&self) -> &SampleName {
        &self.child
    }
}

#[derive(Builder, Clone, Debug)]
pub struct TrioCallerParams {
    pub trio: Trio,
    pub maternal_ploidy: u32,
    pub paternal_ploidy: u32,
    pub child_ploidy: u32,
    pub min_variant_posterior: Phred,
    #[builder(default)]
    pub germline_prior: CoalescentParams,
    #[builder(default)]
    pub denovo_prior: DeNovoParams,
    #[builder(default)]
    pub model_options: TrioModelOptions,
}

#[derive(Clone, Debug)]
pub struct TrioCaller {
    samples: Vec<SampleName>,
    params: TrioCallerParams,
}

#[derive(Clone, Debug)]
pub struct TrioCallerLatents {
    pub maternal_genotypes: Vec<Genotype<HaplotypeId>>,
    pub paternal_genotypes: Vec<Genotype<HaplotypeId>>,
    pub child_genotypes: Vec<Genotype<HaplotypeId>>,
    pub inferences: TrioLatents,
}

impl TrioCallerLatents {
    /// MAP triple of the joint posterior.
    pub fn map_triple(&self) -> &JointProbability {
        self.inferences
            .map_triple()
            .expect("bug: empty joint posterior")
    }

    pub(crate) fn haplotype_posteriors(&self, input: &RegionInput) -> Vec<f64> {
        let mut result = vec![0.0; input.haplotypes.len()];
        let members = [
            (&self.maternal_genotypes, &self.inferences.maternal_marginals),
            (&self.paternal_genotypes, &self.inferences.paternal_marginals),
            (&self.child_genotypes, &self.inferences.child_marginals),
        ];
        for (genotypes, marginals) in &members {
            for (genotype, &marginal) in genotypes.iter().zip(marginals.iter()) {
                for &haplotype in genotype.copy_unique().iter() {
                    result[haplotype] += marginal / members.len() as f64;
                }
            }
        }
        result
    }
}

impl TrioCaller {
    pub fn new(params: TrioCallerParams) -> Result<Self, Error> {
        if params.maternal_ploidy == 0 || params.paternal_ploidy == 0 || params.child_ploidy == 0
        {
            return Err(Error::ZeroPloidy);
        }
        let samples = vec![
            params.trio.mother().clone(),
            params.trio.father().clone(),
            params.trio.child().clone(),
        ];
        Ok(TrioCaller { samples, params })
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    pub fn trio(&self) -> &Trio {
        &self.params.trio
    }

    pub(crate) fn infer(
        &self,
        input: &RegionInput,
        cancel: &CancelToken,
    ) -> Result<TrioCallerLatents, ModelError> {
        let pool = &input.haplotypes;

        // candidate sets per family member; they only differ when ploidies do
        let maternal_genotypes = generate_all_genotypes(pool.len(), self.params.maternal_ploidy);
        let paternal_genotypes = if self.params.paternal_ploidy == self.params.maternal_ploidy {
            maternal_genotypes.clone()
        } else {
            generate_all_genotypes(pool.len(), self.params.paternal_ploidy)
        };
        let child_genotypes = if self.params.child_ploidy == self.params.maternal_ploidy {
            maternal_genotypes.clone()
        } else {
            generate_all_genotypes(pool.len(), self.params.child_ploidy)
        };

        let reference =
            Haplotype::from_reference(input.region.clone(), &input.reference_sequence);
        let germline_prior = CoalescentModel::new(reference, self.params.germline_prior);
        let denovo_prior = DeNovoModel::new(self.params.denovo_prior);
        let model = TrioModel::new(&germline_prior, &denovo_prior)
            .with_options(self.params.model_options);

        let prime = |sample: &SampleName| {
            input
                .likelihoods
                .prime(sample)
                .expect("bug: trio sample missing from likelihood cache")
        };

        let inferences = model.infer(
            pool,
            &maternal_genotypes,
            &paternal_genotypes,
            &child_genotypes,
            &prime(self.params.trio.mother()),
            &prime(self.params.trio.father()),
            &prime(self.params.trio.child()),
            cancel,
        )?;

        Ok(TrioCallerLatents {
            maternal_genotypes,
            paternal_genotypes,
            child_genotypes,
            inferences,
        })
    }

    fn triple_contains(
        &self,
        pool: &HaplotypePool,
        latents: &TrioCallerLatents,
        triple: &JointProbability,
        allele: &Allele,
    ) -> bool {
        genotype_contains_allele(pool, &latents.maternal_genotypes[triple.maternal], allele)
            || genotype_contains_allele(pool, &latents.paternal_genotypes[triple.paternal], allele)
            || genotype_contains_allele(pool, &latents.child_genotypes[triple.child], allele)
    }

    /// De-novo: present in the child, absent from both parents.
    fn is_denovo(
        &self,
        pool: &HaplotypePool,
        latents: &TrioCallerLatents,
        triple: &JointProbability,
        allele: &Allele,
    ) -> bool {
        genotype_contains_allele(pool, &latents.child_genotypes[triple.child], allele)
            && !genotype_contains_allele(
                pool,
                &latents.maternal_genotypes[triple.maternal],
                allele,
            )
            && !genotype_contains_allele(
                pool,
                &latents.paternal_genotypes[triple.paternal],
                allele,
            )
    }

    fn genotype_call(
        &self,
        pool: &HaplotypePool,
        genotypes: &[Genotype<HaplotypeId>],
        marginals: &[f64],
        map_genotype: usize,
        region: &GenomicRegion,
    ) -> Option<GenotypeCall> {
        let spliced = splice(pool, &genotypes[map_genotype], region)?;
        let error_mass: f64 = genotypes
            .iter()
            .zip(marginals.iter())
            .filter(|(genotype, _)| splice(pool, genotype, region).as_ref() != Some(&spliced))
            .map(|(_, &marginal)| marginal)
            .sum();
        Some(GenotypeCall::new(
            spliced,
            Phred::from_log_error_prob(LogProb(error_mass.ln())),
        ))
    }

    pub(crate) fn call_variants(
        &self,
        input: &RegionInput,
        latents: &TrioCallerLatents,
    ) -> Vec<VariantCall> {
        let pool = &input.haplotypes;
        let joint = &latents.inferences.joint;
        let map_triple = latents.map_triple();

        let mut calls = Vec::new();
        for candidate in &input.candidates {
            let alt = candidate.alt_allele();

            let error_mass: f64 = joint
                .iter()
                .filter(|triple| !self.triple_contains(pool, latents, triple, alt))
                .map(|triple| triple.probability)
                .sum();
            let posterior = Phred::from_log_error_prob(LogProb(error_mass.ln()));

            if posterior < self.params.min_variant_posterior
                || !self.triple_contains(pool, latents, map_triple, alt)
            {
                continue;
            }

            let denovo_error: f64 = joint
                .iter()
                .filter(|triple| !self.is_denovo(pool, latents, triple, alt))
                .map(|triple| triple.probability)
                .sum();
            let denovo_posterior = Phred::from_log_error_prob(LogProb(denovo_error.ln()));
            let denovo_called = denovo_posterior >= self.params.min_variant_posterior
                && genotype_contains_allele(
                    pool,
                    &latents.child_genotypes[map_triple.child],
                    alt,
                );

            let sample_calls = vec![
                (
                    self.params.trio.mother().clone(),
                    self.genotype_call(
                        pool,
                        &latents.maternal_genotypes,
                        &latents.inferences.maternal_marginals,
                        map_triple.maternal,
                        candidate.region(),
                    ),
                ),
                (
                    self.params.trio.father().clone(),
                    self.genotype_call(
                        pool,
                        &latents.paternal_genotypes,
                        &latents.inferences.paternal_marginals,
                        map_triple.paternal,
                        candidate.region(),
                    ),
                ),
                (
                    self.params.trio.child().clone(),
                    self.genotype_call(
                        pool,
                        &latents.child_genotypes,
                        &latents.inferences.child_marginals,
                        map_triple.child,
                        candidate.region(),
                    ),
                ),
            ]
            .into_iter()
            .filter_map(|(sample, call)| call.map(|call| (sample, call)))
            .collect_vec();

            let mut call =
                VariantCall::new(candidate.clone(), posterior).with_sample_calls(sample_calls);
            if denovo_called {
                call = call.with_denovo_posterior(denovo_posterior);
            }
            calls.push(call);
        }
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::Caller;
    use crate::likelihood::HaplotypeLikelihoodCache;
    use crate::model::tests::{push_reads, snv, test_region, two_haplotype_pool};

    fn trio() -> Trio {
        Trio::new("mother".to_owned(), "father".to_owned(), "child".to_owned()).unwrap()
    }

    fn params() -> TrioCallerParams {
        TrioCallerParamsBuilder::default()
            .trio(trio())
            .maternal_ploidy(2u32)
            .paternal_ploidy(2u32)
            .child_ploidy(2u32)
            .min_variant_posterior(Phred::new(20.0))
            .build()
            .unwrap()
    }

    fn region_input(
        mother_support: &[(usize, usize)],
        father_support: &[(usize, usize)],
        child_support: &[(usize, usize)],
    ) -> RegionInput {
        let pool = two_haplotype_pool();
        let mut cache = HaplotypeLikelihoodCache::new(pool.len());
        push_reads(&mut cache, "mother", pool.len(), mother_support);
        push_reads(&mut cache, "father", pool.len(), father_support);
        push_reads(&mut cache, "child", pool.len(), child_support);
        RegionInput {
            region: test_region(),
            reference_sequence: b"ACGTACGTAC".to_vec(),
            haplotypes: pool,
            likelihoods: cache,
            candidates: vec![snv()],
        }
    }

    #[test]
    fn test_invalid_trio() {
        assert_eq!(
            Trio::new("a".to_owned(), "a".to_owned(), "c".to_owned()).unwrap_err(),
            Error::InvalidTrio
        );
    }

    #[test]
    fn test_zero_ploidy() {
        let params = TrioCallerParamsBuilder::default()
            .trio(trio())
            .maternal_ploidy(2u32)
            .paternal_ploidy(0u32)
            .child_ploidy(2u32)
            .min_variant_posterior(Phred::new(20.0))
            .build()
            .unwrap();
        assert_eq!(TrioCaller::new(params).unwrap_err(), Error::ZeroPloidy);
    }

    #[test]
    fn test_mendelian_no_denovo() {
        let caller = Caller::Trio(TrioCaller::new(params()).unwrap());
        let input = region_input(&[(0, 8)], &[(0, 8)], &[(0, 8)]);
        let outcome = caller.call_region(&input, &CancelToken::new());
        // no alt support anywhere: nothing is called
        assert!(outcome.calls().unwrap().is_empty());
    }

    #[test]
    fn test_denovo_called() {
        let caller = Caller::Trio(TrioCaller::new(params()).unwrap());
        let input = region_input(&[(0, 30)], &[(0, 30)], &[(0, 6), (1, 6)]);
        let outcome = caller.call_region(&input, &CancelToken::new());

        let calls = outcome.calls().unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.is_denovo());
        assert!(call.denovo_posterior().unwrap().score() >= 30.0);

        // child genotype carries the alt, parents do not
        let genotype_of = |sample: &str| {
            call.sample_calls()
                .iter()
                .find(|(name, _)| name == sample)
                .map(|(_, call)| {
                    call.genotype()
                        .iter()
                        .map(|allele| allele.bases().to_vec())
                        .collect::<Vec<_>>()
                })
                .unwrap()
        };
        assert_eq!(genotype_of("child"), vec![b"A".to_vec(), b"T".to_vec()]);
        assert_eq!(genotype_of("mother"), vec![b"A".to_vec(), b"A".to_vec()]);
        assert_eq!(genotype_of("father"), vec![b"A".to_vec(), b"A".to_vec()]);
    }

    #[test]
    fn test_inherited_het_not_denovo() {
        let caller = Caller::Trio(TrioCaller::new(params()).unwrap());
        // mother carries the variant herself: child's copy is inherited
        let input = region_input(&[(0, 5), (1, 5)], &[(0, 8)], &[(0, 6), (1, 6)]);
        let outcome = caller.call_region(&input, &CancelToken::new());

        let calls = outcome.calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].is_denovo());
    }
}

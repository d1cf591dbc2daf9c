// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Tumour/normal calling. Three models compete per region: the germline
//! model on the pooled reads of all samples, the CNV model (per-sample
//! Dirichlet mixtures over germline genotypes) and the tumour model
//! (per-sample mixtures over cancer genotypes). Their evidence-weighted
//! posteriors are combined into germline and somatic variant calls.

use std::collections::HashMap;

use bio::stats::LogProb;
use derive_builder::Builder;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::warn;
use ordered_float::NotNan;

use crate::calling::{
    GenotypeCall, GenotypeCredibleRegions, RegionInput, SomaticCallInfo, VariantCall,
};
use crate::errors::Error;
use crate::likelihood::{SampleName, MERGED_SAMPLE};
use crate::model::cnv::{CnvLatents, CnvModel, CnvModelPriors};
use crate::model::individual::{IndividualLatents, IndividualModel};
use crate::model::priors::{CoalescentModel, CoalescentParams, SomaticMutationModel};
use crate::model::tumour::{TumourLatents, TumourModel, TumourModelPriors};
use crate::model::ModelError;
use crate::utils::stats::{beta_cdf, beta_hdi};
use crate::utils::{CancelToken, Phred};
use crate::variants::genotype::{
    containment_index, generate_all_cancer_genotypes, generate_all_genotypes,
    genotype_contains_allele, splice, CancerGenotype, Genotype,
};
use crate::variants::haplotype::{Haplotype, HaplotypeId, HaplotypePool};
use crate::variants::{Allele, GenomicRegion, Variant};

/// Prior probability of the CNV model.
const CNV_MODEL_PRIOR: f64 = 0.01;
/// Germline genotypes below this posterior are dropped from the cancer
/// genotype space when it exceeds `max_genotypes`.
const MIN_GERMLINE_POSTERIOR: f64 = 1e-30;
/// Cancer genotypes below this posterior are ignored during somatic call
/// extraction.
const MIN_CANCER_GENOTYPE_POSTERIOR: f64 = 1e-4;
/// Dirichlet prior alphas, germline slots.
const NORMAL_GERMLINE_ALPHA: f64 = 10.0;
const TUMOUR_CNV_ALPHA: f64 = 0.75;
const TUMOUR_GERMLINE_ALPHA: f64 = 1.0;
/// Dirichlet prior alphas, somatic slot.
const NORMAL_SOMATIC_ALPHA: f64 = 0.01;
const TUMOUR_SOMATIC_ALPHA: f64 = 0.8;

lazy_static! {
    /// Prior of the well-formed normal model in the normal-sample check.
    static ref NORMAL_MODEL_PRIOR: LogProb = LogProb(0.999f64.ln());
    static ref DUMMY_MODEL_PRIOR: LogProb = LogProb(0.001f64.ln());
}

#[derive(Builder, Clone, Debug)]
pub struct CancerCallerParams {
    pub ploidy: u32,
    pub max_genotypes: usize,
    #[builder(default)]
    pub normal_sample: Option<SampleName>,
    pub somatic_mutation_rate: f64,
    pub min_variant_posterior: Phred,
    pub min_somatic_posterior: Phred,
    pub min_somatic_frequency: f64,
    pub credible_mass: f64,
    #[builder(default)]
    pub germline_prior: CoalescentParams,
}

/// Prior weights of the three competing models.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPriors {
    pub germline: f64,
    pub cnv: f64,
    pub somatic: f64,
}

/// Evidence-weighted posterior weights of the three models.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPosteriors {
    pub germline: f64,
    pub cnv: f64,
    pub somatic: f64,
}

#[derive(Clone, Debug)]
pub struct CancerLatents {
    pub germline_genotypes: Vec<Genotype<HaplotypeId>>,
    pub cancer_genotypes: Vec<CancerGenotype>,
    pub model_priors: ModelPriors,
    pub germline: IndividualLatents,
    pub cnv: CnvLatents,
    pub somatic: TumourLatents,
    /// Posterior that the normal sample is explained by a well-formed
    /// germline model of the configured ploidy (against a ploidy+1 dummy).
    /// Absent without a normal sample.
    pub normal_model_posterior: Option<f64>,
}

impl CancerLatents {
    pub fn model_posteriors(&self) -> ModelPosteriors {
        let germline_jlp = LogProb(self.model_priors.germline.ln()) + self.germline.log_evidence;
        let cnv_jlp = LogProb(self.model_priors.cnv.ln()) + self.cnv.approx_log_evidence;
        let somatic_jlp =
            LogProb(self.model_priors.somatic.ln()) + self.somatic.approx_log_evidence;

        let norm = LogProb::ln_sum_exp(&[germline_jlp, cnv_jlp, somatic_jlp]);
        ModelPosteriors {
            germline: (germline_jlp - norm).exp(),
            cnv: (cnv_jlp - norm).exp(),
            somatic: (somatic_jlp - norm).exp(),
        }
    }

    /// Index of a cancer genotype's germline component within
    /// `germline_genotypes` (which are in lexicographic enumeration order).
    fn germline_index(&self, genotype: &CancerGenotype) -> usize {
        self.germline_genotypes
            .binary_search(genotype.germline())
            .expect("bug: cancer genotype with unknown germline component")
    }

    /// Combined germline genotype posterior: model-posterior-weighted sum of
    /// the three models' genotype posteriors, with cancer genotypes
    /// marginalised over their somatic element.
    pub fn germline_genotype_posteriors(&self, model_posteriors: &ModelPosteriors) -> Vec<f64> {
        let mut result = self
            .germline
            .genotype_posteriors
            .iter()
            .zip(self.cnv.genotype_posteriors.iter())
            .map(|(&germline, &cnv)| {
                model_posteriors.germline * germline + model_posteriors.cnv * cnv
            })
            .collect_vec();
        for (genotype, &posterior) in self
            .cancer_genotypes
            .iter()
            .zip(self.somatic.genotype_posteriors.iter())
        {
            result[self.germline_index(genotype)] += model_posteriors.somatic * posterior;
        }
        result
    }

    pub(crate) fn haplotype_posteriors(&self, input: &RegionInput) -> Vec<f64> {
        let model_posteriors = self.model_posteriors();
        let n = input.haplotypes.len();
        let index = containment_index(&self.germline_genotypes, n);

        let mut result = vec![0.0; n];
        for (haplotype, genotype_ids) in index.iter().enumerate() {
            for &g in genotype_ids {
                result[haplotype] += model_posteriors.germline
                    * self.germline.genotype_posteriors[g]
                    + model_posteriors.cnv * self.cnv.genotype_posteriors[g];
            }
        }
        for (genotype, &posterior) in self
            .cancer_genotypes
            .iter()
            .zip(self.somatic.genotype_posteriors.iter())
        {
            for &haplotype in genotype.germline().copy_unique().iter() {
                result[haplotype] += model_posteriors.somatic * posterior;
            }
            if !genotype.germline().contains(&genotype.somatic()) {
                result[genotype.somatic()] += model_posteriors.somatic * posterior;
            }
        }
        result
    }
}

#[derive(Clone, Debug)]
pub struct CancerCaller {
    samples: Vec<SampleName>,
    params: CancerCallerParams,
}

impl CancerCaller {
    pub fn new(samples: Vec<SampleName>, params: CancerCallerParams) -> Result<Self, Error> {
        if samples.is_empty() {
            return Err(Error::NoSamples);
        }
        if params.ploidy == 0 {
            return Err(Error::ZeroPloidy);
        }
        if params.max_genotypes == 0 {
            return Err(Error::ZeroMaxGenotypes);
        }
        if let Some(ref normal) = params.normal_sample {
            if !samples.contains(normal) {
                return Err(Error::InvalidNormalSample {
                    name: normal.clone(),
                });
            }
        }
        if params.somatic_mutation_rate <= 0.0 || params.somatic_mutation_rate >= 1.0 {
            return Err(Error::InvalidSomaticMutationRate {
                rate: params.somatic_mutation_rate,
            });
        }
        if params.credible_mass <= 0.0 || params.credible_mass >= 1.0 {
            return Err(Error::InvalidCredibleMass {
                mass: params.credible_mass,
            });
        }
        if params.min_somatic_frequency <= 0.0 || params.min_somatic_frequency >= 1.0 {
            return Err(Error::InvalidSomaticFrequency {
                freq: params.min_somatic_frequency,
            });
        }
        if params.min_variant_posterior == Phred::new(0.0) {
            warn!(
                "germline variant posterior threshold is zero; \
                 no somatic variants will be called"
            );
        }
        Ok(CancerCaller { samples, params })
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    fn has_normal_sample(&self) -> bool {
        self.params.normal_sample.is_some()
    }

    fn is_normal(&self, sample: &SampleName) -> bool {
        self.params.normal_sample.as_ref() == Some(sample)
    }

    pub fn model_priors(&self) -> ModelPriors {
        let cnv = CNV_MODEL_PRIOR;
        let somatic = self.params.somatic_mutation_rate;
        ModelPriors {
            germline: (1.0 - (cnv + somatic)).max(0.0),
            cnv,
            somatic,
        }
    }

    fn cnv_model_priors(&self) -> CnvModelPriors {
        let ploidy = self.params.ploidy as usize;
        CnvModelPriors {
            alphas: self
                .samples
                .iter()
                .map(|sample| {
                    let alpha = if self.is_normal(sample) {
                        NORMAL_GERMLINE_ALPHA
                    } else {
                        TUMOUR_CNV_ALPHA
                    };
                    (sample.clone(), vec![alpha; ploidy])
                })
                .collect(),
        }
    }

    fn somatic_model_priors(&self) -> TumourModelPriors {
        let ploidy = self.params.ploidy as usize;
        TumourModelPriors {
            alphas: self
                .samples
                .iter()
                .map(|sample| {
                    let mut alphas = if self.is_normal(sample) {
                        vec![NORMAL_GERMLINE_ALPHA; ploidy]
                    } else {
                        vec![TUMOUR_GERMLINE_ALPHA; ploidy]
                    };
                    alphas.push(if self.is_normal(sample) {
                        NORMAL_SOMATIC_ALPHA
                    } else {
                        TUMOUR_SOMATIC_ALPHA
                    });
                    (sample.clone(), alphas)
                })
                .collect(),
        }
    }

    /// Shrink the cancer genotype space by dropping genotypes whose germline
    /// component is all but ruled out by the germline model. Without a
    /// normal sample the germline posterior is less trustworthy, so the
    /// space is instead capped at the `max_genotypes` best-supported
    /// germline components.
    fn filter_cancer_genotypes(
        &self,
        cancer_genotypes: &mut Vec<CancerGenotype>,
        germline_genotypes: &[Genotype<HaplotypeId>],
        germline: &IndividualLatents,
    ) {
        if cancer_genotypes.len() <= self.params.max_genotypes {
            return;
        }

        let germline_posterior = |genotype: &CancerGenotype| {
            let index = germline_genotypes
                .binary_search(genotype.germline())
                .expect("bug: cancer genotype with unknown germline component");
            germline.genotype_posteriors[index]
        };

        if self.has_normal_sample() {
            cancer_genotypes
                .retain(|genotype| germline_posterior(genotype) >= MIN_GERMLINE_POSTERIOR);
        } else {
            let mut order = (0..cancer_genotypes.len()).collect_vec();
            order.sort_by_key(|&i| {
                std::cmp::Reverse(
                    NotNan::new(germline_posterior(&cancer_genotypes[i]))
                        .expect("bug: NaN posterior"),
                )
            });
            order.truncate(self.params.max_genotypes);
            order.sort_unstable();
            let kept = order
                .into_iter()
                .map(|i| cancer_genotypes[i].clone())
                .collect_vec();
            *cancer_genotypes = kept;
        }
        cancer_genotypes.shrink_to_fit();
    }

    /// Germline-model check on the normal sample: its reads under the
    /// configured ploidy versus a ploidy+1 dummy genotype space.
    fn normal_model_posterior(
        &self,
        input: &RegionInput,
        prior: &CoalescentModel,
        germline_genotypes: &[Genotype<HaplotypeId>],
    ) -> Result<Option<f64>, ModelError> {
        let normal = match self.params.normal_sample {
            Some(ref normal) => normal,
            None => return Ok(None),
        };
        let pool = &input.haplotypes;
        let likelihoods = input
            .likelihoods
            .prime(normal)
            .expect("bug: normal sample missing from likelihood cache");
        let model = IndividualModel::new(prior);

        let normal_inferences = model.infer(pool, germline_genotypes, &likelihoods)?;
        let dummy_genotypes = generate_all_genotypes(pool.len(), self.params.ploidy + 1);
        let dummy_inferences = model.infer(pool, &dummy_genotypes, &likelihoods)?;

        let normal_jlp = *NORMAL_MODEL_PRIOR + normal_inferences.log_evidence;
        let dummy_jlp = *DUMMY_MODEL_PRIOR + dummy_inferences.log_evidence;
        let norm = LogProb::ln_sum_exp(&[normal_jlp, dummy_jlp]);
        Ok(Some((normal_jlp - norm).exp()))
    }

    pub(crate) fn infer(
        &self,
        input: &RegionInput,
        cancel: &CancelToken,
    ) -> Result<CancerLatents, ModelError> {
        let pool = &input.haplotypes;

        let (mut cancer_genotypes, germline_genotypes) =
            generate_all_cancer_genotypes(pool.len(), self.params.ploidy);

        let reference =
            Haplotype::from_reference(input.region.clone(), &input.reference_sequence);
        let germline_prior_model = CoalescentModel::new(reference, self.params.germline_prior);
        let somatic_prior_model =
            SomaticMutationModel::new(&germline_prior_model, self.params.somatic_mutation_rate);

        // germline model sees the pooled reads of all samples
        let merged_likelihoods = input
            .likelihoods
            .merged_over(&self.samples)
            .expect("bug: caller sample missing from likelihood cache");
        let germline = IndividualModel::new(&germline_prior_model).infer(
            pool,
            &germline_genotypes,
            &merged_likelihoods
                .prime(MERGED_SAMPLE)
                .expect("bug: merged sample must exist"),
        )?;

        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        let cnv_model = CnvModel::new(&self.samples, self.cnv_model_priors(), &germline_prior_model);
        let cnv = cnv_model.infer(pool, &germline_genotypes, &input.likelihoods, cancel)?;

        self.filter_cancer_genotypes(&mut cancer_genotypes, &germline_genotypes, &germline);

        let somatic_model = TumourModel::new(
            &self.samples,
            self.somatic_model_priors(),
            &somatic_prior_model,
        );
        let somatic = somatic_model.infer(pool, &cancer_genotypes, &input.likelihoods, cancel)?;

        let normal_model_posterior =
            self.normal_model_posterior(input, &germline_prior_model, &germline_genotypes)?;

        Ok(CancerLatents {
            germline_genotypes,
            cancer_genotypes,
            model_priors: self.model_priors(),
            germline,
            cnv,
            somatic,
            normal_model_posterior,
        })
    }

    /// Per-sample probability that there is no somatic content above the
    /// frequency threshold: the Beta tail of the somatic Dirichlet slot.
    fn probability_samples_not_somatic(&self, latents: &CancerLatents) -> Vec<f64> {
        self.samples
            .iter()
            .map(|sample| {
                let alphas = &latents.somatic.alphas[sample];
                let (germline_alphas, somatic_alpha) =
                    alphas.split_at(alphas.len() - 1);
                let a0: f64 = germline_alphas.iter().sum();
                beta_cdf(somatic_alpha[0], a0, self.params.min_somatic_frequency)
            })
            .collect_vec()
    }

    fn credible_regions(
        &self,
        latents: &CancerLatents,
        somatic_samples: &[SampleName],
    ) -> HashMap<SampleName, GenotypeCredibleRegions> {
        self.samples
            .iter()
            .map(|sample| {
                let alphas = &latents.somatic.alphas[sample];
                let a0: f64 = alphas.iter().sum();
                let interval =
                    |alpha: f64| beta_hdi(alpha, a0 - alpha, self.params.credible_mass);
                let germline = alphas[..alphas.len() - 1]
                    .iter()
                    .map(|&alpha| interval(alpha))
                    .collect_vec();
                let somatic = if somatic_samples.contains(sample) {
                    Some(interval(alphas[alphas.len() - 1]))
                } else {
                    None
                };
                (
                    sample.clone(),
                    GenotypeCredibleRegions { germline, somatic },
                )
            })
            .collect()
    }

    /// Lower credible bound of each sample's somatic fraction, regardless of
    /// whether the sample ends up in the somatic set.
    fn somatic_lower_bounds(&self, latents: &CancerLatents) -> Vec<(SampleName, f64)> {
        self.samples
            .iter()
            .map(|sample| {
                let alphas = &latents.somatic.alphas[sample];
                let a0: f64 = alphas.iter().sum();
                let somatic_alpha = alphas[alphas.len() - 1];
                let (lower, _) =
                    beta_hdi(somatic_alpha, a0 - somatic_alpha, self.params.credible_mass);
                (sample.clone(), lower)
            })
            .collect_vec()
    }

    fn spliced_cancer_genotype(
        &self,
        pool: &HaplotypePool,
        genotype: &CancerGenotype,
        region: &GenomicRegion,
    ) -> Option<(Genotype<Allele>, Allele)> {
        let germline = splice(pool, genotype.germline(), region)?;
        let somatic = pool[genotype.somatic()].allele_at(region)?;
        Some((germline, somatic))
    }

    pub(crate) fn call_variants(
        &self,
        input: &RegionInput,
        latents: &CancerLatents,
    ) -> Vec<VariantCall> {
        let pool = &input.haplotypes;
        let model_posteriors = latents.model_posteriors();
        let germline_posteriors = latents.germline_genotype_posteriors(&model_posteriors);

        let map_germline_index = germline_posteriors
            .iter()
            .enumerate()
            .max_by_key(|(_, &p)| NotNan::new(p).expect("bug: NaN posterior"))
            .map(|(i, _)| i)
            .expect("bug: empty genotype space");
        let map_germline = &latents.germline_genotypes[map_germline_index];

        // germline candidate posteriors; candidates below the threshold stay
        // available for somatic calling
        let mut germline_calls: Vec<(Variant, Phred)> = Vec::new();
        let mut uncalled: Vec<&Variant> = Vec::new();
        for candidate in &input.candidates {
            let alt = candidate.alt_allele();
            let error_mass: f64 = latents
                .germline_genotypes
                .iter()
                .zip(germline_posteriors.iter())
                .filter(|(genotype, _)| !genotype_contains_allele(pool, genotype, alt))
                .map(|(_, &posterior)| posterior)
                .sum();
            let posterior = Phred::from_log_error_prob(LogProb(error_mass.ln()));
            if posterior >= self.params.min_variant_posterior {
                if genotype_contains_allele(pool, map_germline, alt) {
                    germline_calls.push((candidate.clone(), posterior));
                }
            } else {
                uncalled.push(candidate);
            }
        }

        // somatic gate
        let not_somatic = self.probability_samples_not_somatic(latents);
        let somatic_probability = model_posteriors.somatic
            * (1.0 - not_somatic.iter().product::<f64>());
        let somatic_posterior =
            Phred::from_log_error_prob(LogProb((1.0 - somatic_probability).max(0.0).ln()));

        let mut result = Vec::new();
        let mut called_somatic_haplotype: Option<HaplotypeId> = None;
        let mut somatic_samples: Vec<SampleName> = Vec::new();

        if somatic_posterior >= self.params.min_somatic_posterior {
            let reduced = latents
                .cancer_genotypes
                .iter()
                .zip(latents.somatic.genotype_posteriors.iter())
                .filter(|(_, &posterior)| posterior > MIN_CANCER_GENOTYPE_POSTERIOR)
                .map(|(genotype, &posterior)| (genotype, posterior))
                .collect_vec();

            let map_cancer = &latents.cancer_genotypes[latents
                .somatic
                .map_genotype()
                .expect("bug: empty cancer genotype space")];

            let mut somatic_calls: Vec<(Variant, Phred)> = Vec::new();
            for candidate in &uncalled {
                let alt = candidate.alt_allele();
                let support: f64 = reduced
                    .iter()
                    .filter(|(genotype, _)| {
                        pool[genotype.somatic()].contains(alt)
                            && !genotype_contains_allele(pool, genotype.germline(), alt)
                    })
                    .map(|(_, posterior)| posterior)
                    .sum();
                let error =
                    (1.0 - model_posteriors.somatic * support * somatic_probability).max(0.0);
                let posterior = Phred::from_log_error_prob(LogProb(error.ln()));

                let in_map = pool[map_cancer.somatic()].contains(alt)
                    || genotype_contains_allele(pool, map_cancer.germline(), alt);
                if posterior >= self.params.min_somatic_posterior && in_map {
                    somatic_calls.push(((*candidate).clone(), posterior));
                }
            }

            if !somatic_calls.is_empty() {
                for (sample, lower) in self.somatic_lower_bounds(latents) {
                    if lower >= self.params.min_somatic_frequency {
                        somatic_samples.push(sample);
                    }
                }
                if somatic_samples.is_empty() {
                    somatic_calls.clear();
                } else {
                    called_somatic_haplotype = Some(map_cancer.somatic());
                }
            }

            let credible_regions = self.credible_regions(latents, &somatic_samples);

            for (variant, posterior) in somatic_calls {
                let (spliced_germline, spliced_somatic) = match self.spliced_cancer_genotype(
                    pool,
                    map_cancer,
                    variant.region(),
                ) {
                    Some(spliced) => spliced,
                    None => continue,
                };

                let called = (spliced_germline.clone(), spliced_somatic.clone());
                let genotype_error: f64 = reduced
                    .iter()
                    .filter(|(genotype, _)| {
                        self.spliced_cancer_genotype(pool, genotype, variant.region())
                            != Some(called.clone())
                    })
                    .map(|(_, posterior)| posterior)
                    .sum();
                let genotype_posterior =
                    Phred::from_log_error_prob(LogProb(genotype_error.ln()));

                let sample_calls = self
                    .samples
                    .iter()
                    .map(|sample| {
                        let mut alleles = spliced_germline.iter().cloned().collect_vec();
                        if somatic_samples.contains(sample) {
                            alleles.push(spliced_somatic.clone());
                        }
                        (
                            sample.clone(),
                            GenotypeCall::new(Genotype::new(alleles), genotype_posterior),
                        )
                    })
                    .collect_vec();

                result.push(
                    VariantCall::new(variant, posterior)
                        .with_sample_calls(sample_calls)
                        .with_somatic(SomaticCallInfo::new(
                            somatic_posterior,
                            somatic_samples.clone(),
                            credible_regions.clone(),
                        )),
                );
            }
        }

        // germline genotype calls, with the called somatic allele appended
        // for somatic samples
        let map_error: f64 = germline_posteriors
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != map_germline_index)
            .map(|(_, &posterior)| posterior)
            .sum();
        let map_posterior = Phred::from_log_error_prob(LogProb(map_error.ln()));

        for (variant, posterior) in germline_calls {
            let spliced = match splice(pool, map_germline, variant.region()) {
                Some(spliced) => spliced,
                None => continue,
            };
            let spliced_somatic = called_somatic_haplotype
                .and_then(|haplotype| pool[haplotype].allele_at(variant.region()));

            let sample_calls = self
                .samples
                .iter()
                .map(|sample| {
                    let mut alleles = spliced.iter().cloned().collect_vec();
                    if let Some(ref somatic_allele) = spliced_somatic {
                        if somatic_samples.contains(sample) {
                            alleles.push(somatic_allele.clone());
                        }
                    }
                    (
                        sample.clone(),
                        GenotypeCall::new(Genotype::new(alleles), map_posterior),
                    )
                })
                .collect_vec();

            result.push(VariantCall::new(variant, posterior).with_sample_calls(sample_calls));
        }

        result
    }
}

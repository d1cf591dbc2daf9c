// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Variational CNV model: the germline genotype is shared across samples,
//! while each sample owns a Dirichlet mixture over the genotype's haplotype
//! slots, capturing copy-number driven deviations from the balanced mixture.

use std::collections::HashMap;

use bio::stats::LogProb;
use itertools::Itertools;
use log::warn;

use crate::likelihood::{HaplotypeLikelihoodCache, SampleName};
use crate::model::priors::CoalescentModel;
use crate::model::variational::{combine_genotype_fits, fit_sample, MeanFieldOptions, SampleFit};
use crate::model::ModelError;
use crate::utils::CancelToken;
use crate::variants::genotype::Genotype;
use crate::variants::haplotype::{HaplotypeId, HaplotypePool};

/// Per-sample Dirichlet prior alphas over the genotype's haplotype slots
/// (length = ploidy).
#[derive(Clone, Debug)]
pub struct CnvModelPriors {
    pub alphas: HashMap<SampleName, Vec<f64>>,
}

#[derive(Clone, Debug)]
pub struct CnvLatents {
    /// Linear posterior per candidate genotype, summing to one.
    pub genotype_posteriors: Vec<f64>,
    /// Per-sample posterior alphas of the MAP genotype.
    pub alphas: HashMap<SampleName, Vec<f64>>,
    pub approx_log_evidence: LogProb,
}

impl CnvLatents {
    pub fn map_genotype(&self) -> Option<usize> {
        self.genotype_posteriors
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("bug: NaN posterior"))
            .map(|(i, _)| i)
    }
}

#[derive(Clone, Debug)]
pub struct CnvModel<'a> {
    samples: &'a [SampleName],
    priors: CnvModelPriors,
    germline_prior: &'a CoalescentModel,
    options: MeanFieldOptions,
}

impl<'a> CnvModel<'a> {
    pub fn new(
        samples: &'a [SampleName],
        priors: CnvModelPriors,
        germline_prior: &'a CoalescentModel,
    ) -> Self {
        CnvModel {
            samples,
            priors,
            germline_prior,
            options: MeanFieldOptions::default(),
        }
    }

    pub fn infer(
        &self,
        pool: &HaplotypePool,
        genotypes: &[Genotype<HaplotypeId>],
        likelihoods: &HaplotypeLikelihoodCache,
        cancel: &CancelToken,
    ) -> Result<CnvLatents, ModelError> {
        let mut elbos = Vec::with_capacity(genotypes.len());
        let mut fits: Vec<Vec<SampleFit>> = Vec::with_capacity(genotypes.len());
        let mut unconverged = 0usize;

        for genotype in genotypes {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }

            let mut genotype_elbo = 0.0;
            let mut genotype_fits = Vec::with_capacity(self.samples.len());
            for sample in self.samples {
                let primed = likelihoods
                    .prime(sample)
                    .expect("bug: sample missing from likelihood cache");
                let component_log_likelihoods = primed
                    .iter()
                    .map(|row| genotype.iter().map(|&id| row[id]).collect_vec())
                    .collect_vec();
                let fit = fit_sample(
                    &self.priors.alphas[sample],
                    &component_log_likelihoods,
                    &self.options,
                );
                if !fit.converged {
                    unconverged += 1;
                }
                genotype_elbo += fit.elbo;
                genotype_fits.push(fit);
            }
            elbos.push(genotype_elbo);
            fits.push(genotype_fits);
        }

        if unconverged > 0 {
            warn!(
                "CNV model: {} mean-field fits did not converge within the iteration cap; \
                 keeping current alphas",
                unconverged
            );
        }

        let log_priors = genotypes
            .iter()
            .map(|genotype| self.germline_prior.log_prior_genotype(pool, genotype))
            .collect_vec();
        let (genotype_posteriors, approx_log_evidence) =
            combine_genotype_fits(&log_priors, &elbos)?;

        let map = genotype_posteriors
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("bug: NaN posterior"))
            .map(|(i, _)| i)
            .ok_or(ModelError::NumericalUnderflow)?;
        let alphas = self
            .samples
            .iter()
            .zip(fits[map].iter())
            .map(|(sample, fit)| (sample.clone(), fit.alphas.clone()))
            .collect();

        Ok(CnvLatents {
            genotype_posteriors,
            alphas,
            approx_log_evidence,
        })
    }
}

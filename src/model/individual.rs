// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Exact posterior inference over germline genotypes for a single pileup of
//! reads: likelihoods times the coalescent prior, normalised by
//! log-sum-exp.

use bio::stats::LogProb;
use itertools::Itertools;

use crate::likelihood::PrimedLikelihoods;
use crate::model::priors::CoalescentModel;
use crate::model::ModelError;
use crate::utils::stats::is_probability_simplex;
use crate::utils::PROB_SUM_TOLERANCE;
use crate::variants::genotype::Genotype;
use crate::variants::haplotype::{HaplotypeId, HaplotypePool};

/// `ln L(reads | genotype)`: per read, a uniform mixture over the genotype's
/// haplotypes; product over reads.
pub(crate) fn genotype_log_likelihood(
    genotype: &Genotype<HaplotypeId>,
    likelihoods: &PrimedLikelihoods,
) -> LogProb {
    if genotype.ploidy() == 0 {
        return if likelihoods.is_empty() {
            LogProb::ln_one()
        } else {
            LogProb::ln_zero()
        };
    }
    let ln_ploidy = (genotype.ploidy() as f64).ln();
    likelihoods
        .iter()
        .map(|row| {
            let components = genotype.iter().map(|&id| row[id]).collect_vec();
            LogProb(*LogProb::ln_sum_exp(&components) - ln_ploidy)
        })
        .sum()
}

#[derive(Clone, Debug)]
pub struct IndividualLatents {
    /// Linear posterior per candidate genotype, summing to one.
    pub genotype_posteriors: Vec<f64>,
    /// `ln L(reads | genotype)` per candidate genotype.
    pub genotype_log_likelihoods: Vec<LogProb>,
    /// Log-normaliser of the joint distribution.
    pub log_evidence: LogProb,
}

impl IndividualLatents {
    pub fn map_genotype(&self) -> Option<usize> {
        self.genotype_posteriors
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("bug: NaN posterior"))
            .map(|(i, _)| i)
    }
}

/// The individual (germline) model.
#[derive(Clone, Debug)]
pub struct IndividualModel<'a> {
    prior: &'a CoalescentModel,
}

impl<'a> IndividualModel<'a> {
    pub fn new(prior: &'a CoalescentModel) -> Self {
        IndividualModel { prior }
    }

    pub fn infer(
        &self,
        pool: &HaplotypePool,
        genotypes: &[Genotype<HaplotypeId>],
        likelihoods: &PrimedLikelihoods,
    ) -> Result<IndividualLatents, ModelError> {
        let genotype_log_likelihoods = genotypes
            .iter()
            .map(|genotype| genotype_log_likelihood(genotype, likelihoods))
            .collect_vec();

        let joints = genotypes
            .iter()
            .zip(genotype_log_likelihoods.iter())
            .map(|(genotype, &log_likelihood)| {
                log_likelihood + self.prior.log_prior_genotype(pool, genotype)
            })
            .collect_vec();

        let log_evidence = LogProb::ln_sum_exp(&joints);
        if log_evidence == LogProb::ln_zero() {
            return Err(ModelError::NumericalUnderflow);
        }

        let genotype_posteriors = joints
            .iter()
            .map(|&joint| (joint - log_evidence).exp())
            .collect_vec();
        debug_assert!(is_probability_simplex(
            &genotype_posteriors,
            PROB_SUM_TOLERANCE
        ));

        Ok(IndividualLatents {
            genotype_posteriors,
            genotype_log_likelihoods,
            log_evidence,
        })
    }
}

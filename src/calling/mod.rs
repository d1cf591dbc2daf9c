// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Region-level calling: the tagged caller union, its latents, structured
//! call records and the per-region pipeline
//! (enumerate -> infer -> combine -> extract).

use std::collections::HashMap;
use std::fmt;

use getset::Getters;
use serde::Serialize;

use crate::likelihood::{HaplotypeLikelihoodCache, SampleName};
use crate::model::ModelError;
use crate::utils::{CancelToken, Phred};
use crate::variants::genotype::Genotype;
use crate::variants::haplotype::HaplotypePool;
use crate::variants::{Allele, GenomicRegion, Variant};

pub mod cancer;
pub mod individual;
pub mod scheduler;
pub mod trio;

pub use cancer::{CancerCaller, CancerCallerParams, CancerCallerParamsBuilder, CancerLatents};
pub use individual::{
    IndividualCaller, IndividualCallerParams, IndividualCallerParamsBuilder,
    IndividualCallerLatents,
};
pub use trio::{Trio, TrioCaller, TrioCallerParams, TrioCallerParamsBuilder, TrioCallerLatents};

/// Everything the driver feeds into the core for one active region. The
/// haplotype pool owns the region's haplotypes; likelihood columns are in
/// pool id order.
#[derive(Clone, Debug)]
pub struct RegionInput {
    pub region: GenomicRegion,
    /// Reference sequence spanning `region` (reference I/O happens upstream).
    pub reference_sequence: Vec<u8>,
    pub haplotypes: HaplotypePool,
    pub likelihoods: HaplotypeLikelihoodCache,
    pub candidates: Vec<Variant>,
}

/// Per-sample genotype call at a variant site.
#[derive(Clone, Debug, PartialEq, Serialize, Getters)]
#[getset(get = "pub")]
pub struct GenotypeCall {
    genotype: Genotype<Allele>,
    posterior: Phred,
}

impl GenotypeCall {
    pub fn new(genotype: Genotype<Allele>, posterior: Phred) -> Self {
        GenotypeCall {
            genotype,
            posterior,
        }
    }
}

/// Credible intervals of a sample's mixture proportions: one per germline
/// slot, plus the somatic slot where the sample was called somatic.
#[derive(Clone, Debug, PartialEq, Serialize, Default)]
pub struct GenotypeCredibleRegions {
    pub germline: Vec<(f64, f64)>,
    pub somatic: Option<(f64, f64)>,
}

/// Somatic annotation of a call.
#[derive(Clone, Debug, PartialEq, Serialize, Getters)]
#[getset(get = "pub")]
pub struct SomaticCallInfo {
    /// Site-level posterior that any sample carries somatic content.
    posterior: Phred,
    /// Samples whose lower credible somatic-fraction bound passed the
    /// frequency gate.
    somatic_samples: Vec<SampleName>,
    credible_regions: HashMap<SampleName, GenotypeCredibleRegions>,
}

impl SomaticCallInfo {
    pub fn new(
        posterior: Phred,
        somatic_samples: Vec<SampleName>,
        credible_regions: HashMap<SampleName, GenotypeCredibleRegions>,
    ) -> Self {
        SomaticCallInfo {
            posterior,
            somatic_samples,
            credible_regions,
        }
    }
}

/// A called variant with its posterior and per-sample genotype calls.
#[derive(Clone, Debug, PartialEq, Serialize, Getters)]
#[getset(get = "pub")]
pub struct VariantCall {
    variant: Variant,
    /// PHRED-scaled posterior that the variant is present.
    posterior: Phred,
    sample_calls: Vec<(SampleName, GenotypeCall)>,
    /// Present for somatic calls of the cancer caller.
    somatic: Option<SomaticCallInfo>,
    /// Present for de-novo calls of the trio caller.
    denovo_posterior: Option<Phred>,
}

impl VariantCall {
    pub fn new(variant: Variant, posterior: Phred) -> Self {
        VariantCall {
            variant,
            posterior,
            sample_calls: Vec::new(),
            somatic: None,
            denovo_posterior: None,
        }
    }

    pub fn with_sample_calls(mut self, sample_calls: Vec<(SampleName, GenotypeCall)>) -> Self {
        self.sample_calls = sample_calls;
        self
    }

    pub fn with_somatic(mut self, somatic: SomaticCallInfo) -> Self {
        self.somatic = Some(somatic);
        self
    }

    pub fn with_denovo_posterior(mut self, posterior: Phred) -> Self {
        self.denovo_posterior = Some(posterior);
        self
    }

    pub fn is_somatic(&self) -> bool {
        self.somatic.is_some()
    }

    pub fn is_denovo(&self) -> bool {
        self.denovo_posterior.is_some()
    }
}

/// Why a region yielded no calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Every joint log-probability underflowed to -inf.
    NumericalUnderflow,
    /// The cooperative cancel flag was raised.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SkipReason::NumericalUnderflow => f.write_str("numerical underflow"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of calling one region. Nothing else crosses the region boundary:
/// fatal configuration problems surface at caller construction, and soft
/// region conditions become `Skipped`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum RegionOutcome {
    Calls(Vec<VariantCall>),
    Skipped(SkipReason),
}

impl RegionOutcome {
    pub fn calls(&self) -> Option<&[VariantCall]> {
        match self {
            RegionOutcome::Calls(calls) => Some(calls),
            RegionOutcome::Skipped(_) => None,
        }
    }
}

impl From<ModelError> for RegionOutcome {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::NumericalUnderflow => {
                RegionOutcome::Skipped(SkipReason::NumericalUnderflow)
            }
            ModelError::Cancelled => RegionOutcome::Skipped(SkipReason::Cancelled),
        }
    }
}

/// The callers of this crate as a tagged union; a single dispatch drives the
/// per-region pipeline for all of them.
#[derive(Clone, Debug)]
pub enum Caller {
    Individual(IndividualCaller),
    Trio(TrioCaller),
    Cancer(CancerCaller),
}

/// Inferred latent state of one region, tagged per caller so downstream
/// stages match on the concrete variant instead of downcasting.
#[derive(Clone, Debug)]
pub enum Latents {
    Individual(IndividualCallerLatents),
    Trio(TrioCallerLatents),
    Cancer(CancerLatents),
}

impl Caller {
    pub fn samples(&self) -> &[SampleName] {
        match self {
            Caller::Individual(caller) => caller.samples(),
            Caller::Trio(caller) => caller.samples(),
            Caller::Cancer(caller) => caller.samples(),
        }
    }

    /// Run the full pipeline for one region:
    /// `Idle -> Enumerating -> Inferring -> Combining -> Extracting -> Done`.
    /// Stages are linear; any failure skips the region without partial
    /// output.
    pub fn call_region(&self, input: &RegionInput, cancel: &CancelToken) -> RegionOutcome {
        if input.haplotypes.is_empty() || input.candidates.is_empty() {
            // nothing to call; this is success, not an error
            return RegionOutcome::Calls(Vec::new());
        }
        if cancel.is_cancelled() {
            return RegionOutcome::Skipped(SkipReason::Cancelled);
        }

        // Enumerating + Inferring
        let latents = match self.infer_latents(input, cancel) {
            Ok(latents) => latents,
            Err(error) => {
                log::warn!("skipping region {}: {}", input.region, error);
                return error.into();
            }
        };

        if cancel.is_cancelled() {
            return RegionOutcome::Skipped(SkipReason::Cancelled);
        }

        // Combining + Extracting
        let mut calls = match (self, &latents) {
            (Caller::Individual(caller), Latents::Individual(latents)) => {
                caller.call_variants(input, latents)
            }
            (Caller::Trio(caller), Latents::Trio(latents)) => caller.call_variants(input, latents),
            (Caller::Cancer(caller), Latents::Cancer(latents)) => {
                caller.call_variants(input, latents)
            }
            _ => unreachable!("bug: latents do not match caller variant"),
        };

        calls.sort_by(|a, b| a.variant().region().cmp(b.variant().region()));
        RegionOutcome::Calls(calls)
    }

    /// The inference stage alone; exposed for diagnostics and tests.
    pub fn infer_latents(
        &self,
        input: &RegionInput,
        cancel: &CancelToken,
    ) -> Result<Latents, ModelError> {
        match self {
            Caller::Individual(caller) => caller.infer(input).map(Latents::Individual),
            Caller::Trio(caller) => caller.infer(input, cancel).map(Latents::Trio),
            Caller::Cancer(caller) => caller.infer(input, cancel).map(Latents::Cancer),
        }
    }
}

/// Marginal posterior mass per pooled haplotype, for downstream phasing
/// heuristics.
impl Latents {
    pub fn haplotype_posteriors(&self, input: &RegionInput) -> Vec<f64> {
        match self {
            Latents::Individual(latents) => latents.haplotype_posteriors(input),
            Latents::Trio(latents) => latents.haplotype_posteriors(input),
            Latents::Cancer(latents) => latents.haplotype_posteriors(input),
        }
    }
}

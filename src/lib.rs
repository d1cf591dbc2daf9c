// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Calliope is the Bayesian inference core of a haplotype-based short-read
//! variant caller. Given the candidate haplotypes of a small genomic window
//! and per-read likelihoods against them, it infers posterior distributions
//! over genotypes under several generative models (germline individual, trio
//! with de-novo mutation, tumour/normal with copy-number and somatic
//! sub-clones) and emits structured variant calls with calibrated posterior
//! probabilities.
//!
//! Reference I/O, read alignment, candidate discovery and VCF output are
//! external collaborators; see `reference::ReferenceGenome`,
//! `likelihood::HaplotypeLikelihoodCache` and `calling::RegionInput` for the
//! seams.

pub mod calling;
pub mod errors;
pub mod likelihood;
pub mod model;
pub mod reference;
pub mod utils;
pub mod variants;

pub use crate::calling::scheduler::{call_regions, RegionCalls};
pub use crate::calling::{
    Caller, GenotypeCall, Latents, RegionInput, RegionOutcome, SkipReason, VariantCall,
};
pub use crate::likelihood::{HaplotypeLikelihoodCache, SampleName};
pub use crate::reference::{InMemoryReference, ReferenceGenome};
pub use crate::utils::{CancelToken, Phred};
pub use crate::variants::genotype::{CancerGenotype, Genotype};
pub use crate::variants::haplotype::{Haplotype, HaplotypePool};
pub use crate::variants::{Allele, GenomicRegion, Variant};

// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Latent-posterior inference over candidate genotypes. Four models share
//! the genotype space built by `variants::genotype`: the exact individual
//! model, the joint trio model and the two variational Dirichlet-mixture
//! models (CNV and tumour).

use thiserror::Error;

pub mod cnv;
pub mod individual;
pub mod priors;
pub mod trio;
pub mod tumour;
pub(crate) mod variational;

/// Conditions that abort inference for the current region. They never unwind
/// past the region boundary; the caller maps them onto its region outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    #[error("all joint log-probabilities are -inf; cannot normalise posterior")]
    NumericalUnderflow,
    #[error("inference cancelled")]
    Cancelled,
}

// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-region store of read-versus-haplotype log-likelihoods, as produced by
//! an upstream pair-HMM. Rows are reads, columns are `HaplotypePool` ids.
//!
//! Priming a sample hands out an immutable borrowed view for the duration of
//! one inference call; there is no process-global "current sample" cursor,
//! so concurrent region workers can prime independently.

use std::collections::HashMap;

use bio::stats::LogProb;

use crate::errors::Error;

pub type SampleName = String;

/// Sample name under which `merged_over` pools reads of several samples.
pub(crate) const MERGED_SAMPLE: &str = "merged";

#[derive(Clone, Debug, Default)]
pub struct HaplotypeLikelihoodCache {
    n_haplotypes: usize,
    // insertion order of samples, for deterministic iteration
    samples: Vec<SampleName>,
    likelihoods: HashMap<SampleName, Vec<Vec<LogProb>>>,
}

impl HaplotypeLikelihoodCache {
    pub fn new(n_haplotypes: usize) -> Self {
        HaplotypeLikelihoodCache {
            n_haplotypes,
            samples: Vec::new(),
            likelihoods: HashMap::new(),
        }
    }

    pub fn n_haplotypes(&self) -> usize {
        self.n_haplotypes
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    /// Register a read of the given sample with its log-likelihood against
    /// every pooled haplotype (in pool id order).
    pub fn push_read(&mut self, sample: &str, likelihoods: Vec<LogProb>) {
        assert_eq!(
            likelihoods.len(),
            self.n_haplotypes,
            "bug: read likelihood row must cover all pooled haplotypes"
        );
        if !self.likelihoods.contains_key(sample) {
            self.samples.push(sample.to_owned());
        }
        self.likelihoods
            .entry(sample.to_owned())
            .or_insert_with(Vec::new)
            .push(likelihoods);
    }

    /// Register a sample without reads.
    pub fn register_sample(&mut self, sample: &str) {
        if !self.likelihoods.contains_key(sample) {
            self.samples.push(sample.to_owned());
            self.likelihoods.insert(sample.to_owned(), Vec::new());
        }
    }

    /// `ln L(read | haplotype)` for the given sample.
    pub fn at(&self, sample: &str, read: usize, haplotype: usize) -> LogProb {
        self.likelihoods[sample][read][haplotype]
    }

    pub fn read_count(&self, sample: &str) -> usize {
        self.likelihoods.get(sample).map_or(0, |rows| rows.len())
    }

    /// Borrow the given sample's likelihoods as an immutable view.
    pub fn prime(&self, sample: &str) -> Result<PrimedLikelihoods, Error> {
        self.likelihoods
            .get(sample)
            .map(|rows| PrimedLikelihoods { rows })
            .ok_or_else(|| Error::UnknownSample {
                name: sample.to_owned(),
            })
    }

    /// A cache holding the concatenated reads of the given samples under the
    /// single sample `merged`, preserving the given sample order.
    pub fn merged_over(&self, samples: &[SampleName]) -> Result<HaplotypeLikelihoodCache, Error> {
        let mut merged = HaplotypeLikelihoodCache::new(self.n_haplotypes);
        merged.register_sample(MERGED_SAMPLE);
        for sample in samples {
            let rows = self
                .likelihoods
                .get(sample)
                .ok_or_else(|| Error::UnknownSample {
                    name: sample.clone(),
                })?;
            for row in rows {
                merged.push_read(MERGED_SAMPLE, row.clone());
            }
        }
        Ok(merged)
    }
}

/// Immutable single-sample view into a `HaplotypeLikelihoodCache`, valid for
/// the duration of one inference call.
#[derive(Clone, Copy, Debug)]
pub struct PrimedLikelihoods<'a> {
    rows: &'a [Vec<LogProb>],
}

impl<'a> PrimedLikelihoods<'a> {
    pub fn read_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn read(&self, read: usize) -> &'a [LogProb] {
        &self.rows[read]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [LogProb]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

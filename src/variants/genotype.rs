// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::slice;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::variants::haplotype::{HaplotypeId, HaplotypePool};
use crate::variants::{Allele, GenomicRegion};

/// Unordered multiset of `ploidy` elements. Elements are kept in canonical
/// sorted order; equality is multiset equality. Inside the inference core
/// `T = HaplotypeId` (indices into the region's `HaplotypePool`); at the
/// output boundary genotypes are spliced into `Genotype<Allele>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Genotype<T: Ord> {
    elements: Vec<T>,
}

impl<T: Ord> Genotype<T> {
    pub fn new(mut elements: Vec<T>) -> Self {
        elements.sort();
        Genotype { elements }
    }

    pub fn ploidy(&self) -> usize {
        self.elements.len()
    }

    pub fn iter(&self) -> slice::Iter<T> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn contains(&self, element: &T) -> bool {
        self.elements.binary_search(element).is_ok()
    }

    /// De-duplicated element set, for marginalisation.
    pub fn copy_unique(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.elements.iter().cloned().dedup().collect_vec()
    }
}

impl<'a, T: Ord> IntoIterator for &'a Genotype<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: Ord + fmt::Display> fmt::Display for Genotype<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.elements.iter().join(", "))
    }
}

/// A germline genotype paired with one additional somatic haplotype. The
/// somatic slot is distinguished and never merged into the germline
/// multiset; it may duplicate a germline element.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CancerGenotype {
    germline: Genotype<HaplotypeId>,
    somatic: HaplotypeId,
}

impl CancerGenotype {
    pub fn new(germline: Genotype<HaplotypeId>, somatic: HaplotypeId) -> Self {
        CancerGenotype { germline, somatic }
    }

    pub fn germline(&self) -> &Genotype<HaplotypeId> {
        &self.germline
    }

    pub fn somatic(&self) -> HaplotypeId {
        self.somatic
    }

    pub fn total_ploidy(&self) -> usize {
        self.germline.ploidy() + 1
    }

    pub fn contains(&self, haplotype: HaplotypeId) -> bool {
        self.somatic == haplotype || self.germline.contains(&haplotype)
    }
}

/// All multisets of size `ploidy` over `n_haplotypes` pool ids, in
/// lexicographic order of the canonical haplotype ordering. `ploidy = 0`
/// yields the single empty genotype; an empty pool with `ploidy > 0` yields
/// nothing.
pub fn generate_all_genotypes(n_haplotypes: usize, ploidy: u32) -> Vec<Genotype<HaplotypeId>> {
    if ploidy == 0 {
        return vec![Genotype::new(Vec::new())];
    }
    if n_haplotypes == 0 {
        return Vec::new();
    }
    (0..n_haplotypes)
        .combinations_with_replacement(ploidy as usize)
        .map(Genotype::new)
        .collect_vec()
}

/// The cartesian-product extension of `generate_all_genotypes`: every
/// germline genotype of size `ploidy` paired with every haplotype as the
/// somatic element. Returns `(cancer_genotypes, germline_genotypes)`.
pub fn generate_all_cancer_genotypes(
    n_haplotypes: usize,
    ploidy: u32,
) -> (Vec<CancerGenotype>, Vec<Genotype<HaplotypeId>>) {
    let germline_genotypes = generate_all_genotypes(n_haplotypes, ploidy);
    let cancer_genotypes = germline_genotypes
        .iter()
        .cartesian_product(0..n_haplotypes)
        .map(|(germline, somatic)| CancerGenotype::new(germline.clone(), somatic))
        .collect_vec();
    (cancer_genotypes, germline_genotypes)
}

/// Number of genotypes `C(n + p - 1, p)` without enumerating them.
pub fn num_genotypes(n_haplotypes: u64, ploidy: u32) -> u64 {
    if ploidy == 0 {
        return 1;
    }
    if n_haplotypes == 0 {
        return 0;
    }
    let mut result: u128 = 1;
    for i in 0..ploidy as u128 {
        result = result * (n_haplotypes as u128 + i) / (i + 1);
    }
    result as u64
}

/// Inverse index from haplotype id to the genotypes containing it. Built
/// once per region for fast marginalisation.
pub fn containment_index(
    genotypes: &[Genotype<HaplotypeId>],
    n_haplotypes: usize,
) -> Vec<Vec<usize>> {
    let mut index = vec![Vec::new(); n_haplotypes];
    for (i, genotype) in genotypes.iter().enumerate() {
        for &haplotype in genotype.copy_unique().iter() {
            index[haplotype].push(i);
        }
    }
    index
}

/// Project a haplotype genotype onto a sub-region, yielding the allele
/// genotype of matching ploidy. `None` if the region is not contained in the
/// haplotypes.
pub fn splice(
    pool: &HaplotypePool,
    genotype: &Genotype<HaplotypeId>,
    region: &GenomicRegion,
) -> Option<Genotype<Allele>> {
    genotype
        .iter()
        .map(|&id| pool[id].allele_at(region))
        .collect::<Option<Vec<_>>>()
        .map(Genotype::new)
}

/// Whether any haplotype of the genotype carries the given allele.
pub fn genotype_contains_allele(
    pool: &HaplotypePool,
    genotype: &Genotype<HaplotypeId>,
    allele: &Allele,
) -> bool {
    genotype.iter().any(|&id| pool[id].contains(allele))
}

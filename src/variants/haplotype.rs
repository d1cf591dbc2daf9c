// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::ops::Index;
use std::str;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::variants::{Allele, GenomicRegion, Variant};

/// Stable index of a haplotype within its region's `HaplotypePool`.
pub type HaplotypeId = usize;

/// A candidate sequence spanning the active region, with substitutions
/// applied to the reference. Substitution-only haplotypes keep reference
/// coordinates aligned, so sub-region lookups are plain slice operations.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Haplotype {
    region: GenomicRegion,
    bases: Vec<u8>,
}

impl Haplotype {
    pub fn new(region: GenomicRegion, bases: Vec<u8>) -> Self {
        assert_eq!(
            region.len() as usize,
            bases.len(),
            "bug: haplotype sequence length must match its region"
        );
        Haplotype { region, bases }
    }

    /// The reference haplotype of a region.
    pub fn from_reference(region: GenomicRegion, reference_sequence: &[u8]) -> Self {
        Haplotype::new(region, reference_sequence.to_owned())
    }

    /// Apply the alt alleles of the given variants on top of this haplotype.
    /// Variants outside the region or with length-changing alleles are not
    /// representable and panic.
    pub fn with_substitutions(&self, variants: &[Variant]) -> Self {
        let mut bases = self.bases.clone();
        for variant in variants {
            assert!(
                self.region.contains(variant.region()),
                "bug: substitution outside of haplotype region"
            );
            let alt = variant.alt_allele().bases();
            assert_eq!(
                alt.len() as u64,
                variant.region().len(),
                "bug: only substitutions can be applied to a haplotype"
            );
            let offset = (variant.region().begin() - self.region.begin()) as usize;
            bases[offset..offset + alt.len()].copy_from_slice(alt);
        }
        Haplotype::new(self.region.clone(), bases)
    }

    pub fn mapped_region(&self) -> &GenomicRegion {
        &self.region
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// The allele this haplotype shows at the given sub-region.
    pub fn allele_at(&self, region: &GenomicRegion) -> Option<Allele> {
        if !self.region.contains(region) {
            return None;
        }
        let offset = (region.begin() - self.region.begin()) as usize;
        let bases = self.bases[offset..offset + region.len() as usize].to_owned();
        Some(Allele::new(region.clone(), bases))
    }

    /// Whether this haplotype carries the given allele.
    pub fn contains(&self, allele: &Allele) -> bool {
        self.allele_at(allele.region())
            .map_or(false, |own| own.bases() == allele.bases())
    }

    /// Number of differing positions against another haplotype over the same
    /// region.
    pub fn edit_distance(&self, other: &Haplotype) -> u64 {
        assert_eq!(
            self.region, other.region,
            "bug: edit distance requires haplotypes of the same region"
        );
        self.bases
            .iter()
            .zip(other.bases.iter())
            .filter(|(a, b)| a != b)
            .count() as u64
    }
}

impl fmt::Display for Haplotype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.region,
            str::from_utf8(&self.bases).unwrap_or("<non-utf8>")
        )
    }
}

/// Per-region arena of haplotypes. Content-deduplicated; ids are assigned in
/// canonical `(region, bases)` order and index genotypes, likelihood columns
/// and posterior vectors alike. Haplotypes outlive everything that refers to
/// them within the region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HaplotypePool {
    haplotypes: Vec<Haplotype>,
}

impl HaplotypePool {
    pub fn from_haplotypes(haplotypes: Vec<Haplotype>) -> Self {
        let haplotypes = haplotypes.into_iter().sorted().dedup().collect_vec();
        if let Some(first) = haplotypes.first() {
            assert!(
                haplotypes
                    .iter()
                    .all(|h| h.mapped_region() == first.mapped_region()),
                "bug: all haplotypes of a region must span the same interval"
            );
        }
        HaplotypePool { haplotypes }
    }

    pub fn len(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes.is_empty()
    }

    pub fn get(&self, id: HaplotypeId) -> &Haplotype {
        &self.haplotypes[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Haplotype> {
        self.haplotypes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = HaplotypeId> {
        0..self.haplotypes.len()
    }

    pub fn id_of(&self, haplotype: &Haplotype) -> Option<HaplotypeId> {
        self.haplotypes.binary_search(haplotype).ok()
    }

    /// The common region of all pooled haplotypes.
    pub fn region(&self) -> Option<&GenomicRegion> {
        self.haplotypes.first().map(|h| h.mapped_region())
    }
}

impl Index<HaplotypeId> for HaplotypePool {
    type Output = Haplotype;

    fn index(&self, id: HaplotypeId) -> &Haplotype {
        &self.haplotypes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> GenomicRegion {
        GenomicRegion::new("1", 100, 110)
    }

    fn reference() -> Haplotype {
        Haplotype::from_reference(region(), b"ACGTACGTAC")
    }

    #[test]
    fn test_substitution() {
        let snv = Variant::new(GenomicRegion::new("1", 102, 103), b"G".to_vec(), b"T".to_vec());
        let alt = reference().with_substitutions(&[snv.clone()]);
        assert_eq!(alt.bases(), b"ACTTACGTAC");
        assert!(alt.contains(snv.alt_allele()));
        assert!(!reference().contains(snv.alt_allele()));
        assert!(reference().contains(snv.ref_allele()));
    }

    #[test]
    fn test_allele_at() {
        let sub = GenomicRegion::new("1", 104, 106);
        let allele = reference().allele_at(&sub).unwrap();
        assert_eq!(allele.bases(), b"AC");
        assert!(reference()
            .allele_at(&GenomicRegion::new("1", 108, 112))
            .is_none());
    }

    #[test]
    fn test_edit_distance() {
        let snv = Variant::new(GenomicRegion::new("1", 102, 103), b"G".to_vec(), b"T".to_vec());
        let alt = reference().with_substitutions(&[snv]);
        assert_eq!(reference().edit_distance(&alt), 1);
        assert_eq!(reference().edit_distance(&reference()), 0);
    }

    #[test]
    fn test_pool_dedup_and_order() {
        let snv = Variant::new(GenomicRegion::new("1", 102, 103), b"G".to_vec(), b"T".to_vec());
        let alt = reference().with_substitutions(&[snv]);
        let pool = HaplotypePool::from_haplotypes(vec![
            alt.clone(),
            reference(),
            alt.clone(),
            reference(),
        ]);
        assert_eq!(pool.len(), 2);
        // canonical order is (region, bases): ACGT... sorts before ACTT...
        assert_eq!(pool[0], reference());
        assert_eq!(pool[1], alt);
        assert_eq!(pool.id_of(&alt), Some(1));
    }
}

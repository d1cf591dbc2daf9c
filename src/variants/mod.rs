// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::ops::Range;
use std::str;

use bio_types::genome::{AbstractInterval, Position};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod genotype;
pub mod haplotype;

/// Half-open interval `[begin, end)` on a named contig.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenomicRegion {
    contig: String,
    begin: u64,
    end: u64,
}

impl GenomicRegion {
    pub fn new<C: Into<String>>(contig: C, begin: u64, end: u64) -> Self {
        assert!(begin <= end, "bug: region begin must not exceed end");
        GenomicRegion {
            contig: contig.into(),
            begin,
            end,
        }
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, other: &GenomicRegion) -> bool {
        self.contig == other.contig && self.begin <= other.begin && other.end <= self.end
    }

    pub fn overlaps(&self, other: &GenomicRegion) -> bool {
        self.contig == other.contig && self.begin < other.end && other.begin < self.end
    }
}

impl AbstractInterval for GenomicRegion {
    fn contig(&self) -> &str {
        &self.contig
    }

    fn range(&self) -> Range<Position> {
        self.begin..self.end
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.begin, self.end)
    }
}

/// A sequence observed at a genomic region.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Allele {
    region: GenomicRegion,
    bases: Vec<u8>,
}

impl Allele {
    pub fn new(region: GenomicRegion, bases: Vec<u8>) -> Self {
        Allele { region, bases }
    }

    pub fn region(&self) -> &GenomicRegion {
        &self.region
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }
}

impl fmt::Display for Allele {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}={}",
            self.region,
            str::from_utf8(&self.bases).unwrap_or("<non-utf8>")
        )
    }
}

/// A candidate variant: reference and alternative allele over the same
/// region.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variant {
    ref_allele: Allele,
    alt_allele: Allele,
}

impl Variant {
    pub fn new(region: GenomicRegion, ref_bases: Vec<u8>, alt_bases: Vec<u8>) -> Self {
        Variant {
            ref_allele: Allele::new(region.clone(), ref_bases),
            alt_allele: Allele::new(region, alt_bases),
        }
    }

    pub fn region(&self) -> &GenomicRegion {
        self.ref_allele.region()
    }

    pub fn ref_allele(&self) -> &Allele {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &Allele {
        &self.alt_allele
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}>{}",
            self.region(),
            str::from_utf8(self.ref_allele.bases()).unwrap_or("<non-utf8>"),
            str::from_utf8(self.alt_allele.bases()).unwrap_or("<non-utf8>"),
        )
    }
}

/// Distinct alt alleles of the given candidates, in canonical order.
pub fn decompose(candidates: &[Variant]) -> Vec<Allele> {
    candidates
        .iter()
        .map(|variant| variant.alt_allele().clone())
        .sorted()
        .dedup()
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_containment() {
        let outer = GenomicRegion::new("1", 100, 200);
        let inner = GenomicRegion::new("1", 150, 151);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&GenomicRegion::new("2", 150, 151)));
    }

    #[test]
    fn test_region_overlap() {
        let a = GenomicRegion::new("1", 100, 200);
        assert!(a.overlaps(&GenomicRegion::new("1", 199, 250)));
        assert!(!a.overlaps(&GenomicRegion::new("1", 200, 250)));
        assert!(!a.overlaps(&GenomicRegion::new("2", 150, 160)));
    }

    #[test]
    fn test_variant_alleles_share_region() {
        let variant = Variant::new(GenomicRegion::new("1", 10, 11), b"A".to_vec(), b"T".to_vec());
        assert_eq!(variant.ref_allele().region(), variant.alt_allele().region());
        assert_eq!(variant.alt_allele().bases(), b"T");
    }

    #[test]
    fn test_decompose_dedups() {
        let region = GenomicRegion::new("1", 10, 11);
        let a = Variant::new(region.clone(), b"A".to_vec(), b"T".to_vec());
        let b = Variant::new(region, b"A".to_vec(), b"T".to_vec());
        assert_eq!(decompose(&[a, b]).len(), 1);
    }
}

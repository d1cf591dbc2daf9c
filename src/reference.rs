// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::variants::GenomicRegion;

/// Read-only access to a reference genome. Implementations must be shareable
/// across region workers.
pub trait ReferenceGenome: Send + Sync {
    fn fetch_sequence(&self, region: &GenomicRegion) -> Result<Vec<u8>>;

    fn contig_size(&self, name: &str) -> Option<u64>;

    fn contigs(&self) -> Vec<String>;
}

/// Reference genome held fully in memory. Contig sequences are shared via
/// `Arc` so that cloning the buffer is cheap.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReference {
    sequences: HashMap<String, Arc<Vec<u8>>>,
    // insertion order, for deterministic contig listing
    names: Vec<String>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        InMemoryReference::default()
    }

    pub fn add_contig<N: Into<String>>(&mut self, name: N, sequence: Vec<u8>) {
        let name = name.into();
        if !self.sequences.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.sequences.insert(name, Arc::new(sequence));
    }
}

impl ReferenceGenome for InMemoryReference {
    fn fetch_sequence(&self, region: &GenomicRegion) -> Result<Vec<u8>> {
        let sequence = match self.sequences.get(region.contig()) {
            Some(sequence) => sequence,
            None => bail!("unknown contig {}", region.contig()),
        };
        if region.end() as usize > sequence.len() {
            bail!(
                "region {} exceeds contig length {}",
                region,
                sequence.len()
            );
        }
        Ok(sequence[region.begin() as usize..region.end() as usize].to_owned())
    }

    fn contig_size(&self, name: &str) -> Option<u64> {
        self.sequences.get(name).map(|seq| seq.len() as u64)
    }

    fn contigs(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_sequence() {
        let mut reference = InMemoryReference::new();
        reference.add_contig("1", b"ACGTACGT".to_vec());
        let seq = reference
            .fetch_sequence(&GenomicRegion::new("1", 2, 5))
            .unwrap();
        assert_eq!(seq, b"GTA");
    }

    #[test]
    fn test_fetch_errors() {
        let mut reference = InMemoryReference::new();
        reference.add_contig("1", b"ACGT".to_vec());
        assert!(reference
            .fetch_sequence(&GenomicRegion::new("2", 0, 1))
            .is_err());
        assert!(reference
            .fetch_sequence(&GenomicRegion::new("1", 0, 5))
            .is_err());
    }

    #[test]
    fn test_contigs() {
        let mut reference = InMemoryReference::new();
        reference.add_contig("1", b"ACGT".to_vec());
        reference.add_contig("2", b"AC".to_vec());
        assert_eq!(reference.contigs(), vec!["1".to_owned(), "2".to_owned()]);
        assert_eq!(reference.contig_size("2"), Some(2));
        assert_eq!(reference.contig_size("3"), None);
    }
}

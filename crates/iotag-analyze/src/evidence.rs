//! Evidence vectors and evidence sets.
//!
//! An evidence vector records which vulnerabilities one derivation of a node
//! required; bit `i` is set when vulnerability `i` was needed. A node's
//! evidence set holds every distinct vector found for it, in the order they
//! were first produced.

use std::collections::HashSet;

use crate::error::{AnalyzeError, Result};

const WORD_BITS: usize = 64;

/// Fixed-width bitset over the known vulnerabilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvidenceVector {
    words: Box<[u64]>,
}

impl EvidenceVector {
    /// The all-zero vector for `width` vulnerabilities.
    pub fn zeros(width: usize) -> Self {
        Self {
            words: vec![0; width.div_ceil(WORD_BITS)].into_boxed_slice(),
        }
    }

    /// A vector with only bit `index` set.
    pub fn unit(width: usize, index: usize) -> Self {
        let mut v = Self::zeros(width);
        v.set(index);
        v
    }

    /// Build a vector from the indices of its set bits.
    #[cfg(test)]
    pub fn from_indices(width: usize, indices: &[usize]) -> Self {
        let mut v = Self::zeros(width);
        for &i in indices {
            v.set(i);
        }
        v
    }

    /// Set bit `index`.
    ///
    /// Panics if `index` is outside the width the vector was created with
    /// (rounded up to a whole word).
    pub fn set(&mut self, index: usize) {
        self.words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (index % WORD_BITS)) != 0)
    }

    /// Elementwise maximum of two vectors of the same width.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a | b)
                .collect(),
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The index of the set bit if exactly one bit is set.
    pub fn single(&self) -> Option<usize> {
        if self.count_ones() != 1 {
            return None;
        }
        self.ones().next()
    }

    /// Indices of the set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| w * WORD_BITS + bit)
        })
    }
}

/// Deduplicated, insertion-ordered collection of evidence vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    vectors: Vec<EvidenceVector>,
    seen: HashSet<EvidenceVector>,
}

impl EvidenceSet {
    pub fn singleton(vector: EvidenceVector) -> Self {
        let mut set = Self::default();
        set.insert(vector);
        set
    }

    /// Insert a vector. Returns `false` if an equal vector was already present.
    pub fn insert(&mut self, vector: EvidenceVector) -> bool {
        if self.seen.contains(&vector) {
            return false;
        }
        self.seen.insert(vector.clone());
        self.vectors.push(vector);
        true
    }

    pub fn contains(&self, vector: &EvidenceVector) -> bool {
        self.seen.contains(vector)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceVector> {
        self.vectors.iter()
    }

    /// OR merge: ordered union of both sets.
    pub fn merge_or(&self, other: &Self, limit: usize) -> Result<Self> {
        let mut merged = self.clone();
        for v in other.iter() {
            if merged.insert(v.clone()) {
                check_size(&merged, limit)?;
            }
        }
        Ok(merged)
    }

    /// AND merge: elementwise maximum of every pair drawn from the two sets.
    pub fn merge_and(&self, other: &Self, limit: usize) -> Result<Self> {
        let mut merged = Self::default();
        for a in self.iter() {
            for b in other.iter() {
                if merged.insert(a.union(b)) {
                    check_size(&merged, limit)?;
                }
            }
        }
        Ok(merged)
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a EvidenceVector;
    type IntoIter = std::slice::Iter<'a, EvidenceVector>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn check_size(set: &EvidenceSet, limit: usize) -> Result<()> {
    if set.len() > limit {
        return Err(AnalyzeError::ResourceExhausted {
            resource: "evidence set size",
            limit,
        });
    }
    Ok(())
}

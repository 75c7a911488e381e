//! Bounded top-K selection with a deterministic tie-break.
//!
//! Candidates are ordered by distance ascending, then ID ascending. The
//! selector keeps at most `k` candidates in a max-heap whose root is the
//! current worst, so memory stays O(k) however many rows are streamed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::record::Record;

/// A scored candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Distance to the query, lower is better.
    pub distance: f64,
    /// The candidate record.
    pub record: Record,
}

impl Candidate {
    /// Total "worse than" order: larger distance is worse, then larger ID.
    ///
    /// NaN distances sort after every real distance.
    fn worse_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or_else(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.record.id.cmp(&other.record.id))
    }

    /// Returns true if `self` ranks strictly before `other`.
    #[must_use]
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.worse_cmp(other) == Ordering::Less
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.worse_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.worse_cmp(other)
    }
}

/// Keeps the `k` best candidates seen so far.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    /// Creates a selector for `k` results.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(1024)),
        }
    }

    /// Offers a candidate. Returns true if it was kept.
    pub fn push(&mut self, candidate: Candidate) -> bool {
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate.is_better_than(worst) => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Number of candidates currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if nothing has been kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains the selector, best candidate first.
    #[must_use]
    pub fn into_sorted_vec(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }
}

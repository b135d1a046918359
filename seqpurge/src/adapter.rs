use crate::params::ADAPTER_OVERLAP;
use crate::probability::MatchProbabilityCache;

/// Thresholds a base-by-base comparison must pass to count as a significant
/// (non-random) match.
#[derive(Debug, Clone, Copy)]
pub struct MatchCriteria {
    pub match_perc: f64,
    pub mep: f64,
    pub min_overlap: usize,
}

/// Result of comparing two sequences position by position. Positions with an
/// `N` on either side are neither matches nor mismatches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchCount {
    pub matches: usize,
    pub mismatches: usize,
}

impl MatchCount {
    /// Compare the common prefix of `seq1` and `seq2`.
    pub fn compare(seq1: &[u8], seq2: &[u8]) -> Self {
        Self::compare_bounded(seq1, seq2, usize::MAX)
    }

    /// Like [`MatchCount::compare`], but stops as soon as more than
    /// `max_mismatches` mismatches have been seen.
    pub fn compare_bounded(seq1: &[u8], seq2: &[u8], max_mismatches: usize) -> Self {
        let mut result = Self::default();
        for (&b1, &b2) in seq1.iter().zip(seq2) {
            if b1 == b'N' || b2 == b'N' {
                continue;
            } else if b1 == b2 {
                result.matches += 1;
            } else {
                result.mismatches += 1;
                if result.mismatches > max_mismatches {
                    break;
                }
            }
        }
        result
    }

    pub fn total(&self) -> usize {
        self.matches + self.mismatches
    }

    pub fn percent(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            100.0 * self.matches as f64 / self.total() as f64
        }
    }

    /// Probability of at least this many matches between random sequences.
    pub fn probability(&self, cache: &MatchProbabilityCache) -> f64 {
        cache.random_match(self.matches, self.total())
    }

    /// Probability of the match if it passes the length and identity
    /// criteria and is below `mep`.
    pub fn significance(&self, criteria: &MatchCriteria, cache: &MatchProbabilityCache) -> Option<f64> {
        if self.total() < criteria.min_overlap || self.percent() < criteria.match_perc {
            return None;
        }
        let p = self.probability(cache);
        (p <= criteria.mep).then_some(p)
    }
}

/// Find the first position of `read` at which `adapter` starts with a
/// significant match. The comparison is restricted to the bases available
/// before the end of the read.
pub fn find_adapter(
    read: &[u8],
    adapter: &[u8],
    criteria: &MatchCriteria,
    cache: &MatchProbabilityCache,
) -> Option<(usize, f64)> {
    (0..read.len()).find_map(|offset| {
        MatchCount::compare(&read[offset..], adapter)
            .significance(criteria, cache)
            .map(|p| (offset, p))
    })
}

/// Check that the bases following a candidate insert boundary look like
/// adapter sequence in at least one of the reads.
///
/// `tail1` and `tail2` are the bases of read 1 and read 2 after the insert,
/// `offset` is the number of adapter bases implied by the candidate. Short
/// tails only allow a small number of mismatches, longer ones must be
/// significant in combination.
pub fn has_adapter_evidence(
    offset: usize,
    tail1: &[u8],
    tail2: &[u8],
    adapter1: &[u8],
    adapter2: &[u8],
    mep: f64,
    cache: &MatchProbabilityCache,
) -> bool {
    let tail1 = &tail1[..tail1.len().min(ADAPTER_OVERLAP)];
    let tail2 = &tail2[..tail2.len().min(ADAPTER_OVERLAP)];
    let count1 = MatchCount::compare(tail1, adapter1);
    let count2 = MatchCount::compare(tail2, adapter2);
    if offset < ADAPTER_OVERLAP {
        let max_mismatches = match offset {
            0..=2 => 0,
            3..=5 => 1,
            _ => 2,
        };
        count1.mismatches <= max_mismatches || count2.mismatches <= max_mismatches
    } else {
        count1.probability(cache) * count2.probability(cache) <= mep
    }
}

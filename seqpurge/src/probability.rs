//! Binomial significance of base matches.
//!
//! Two unrelated DNA sequences agree at a given position with probability
//! 0.25. The probability of seeing at least `k` matches among `n` compared
//! bases is the upper tail of a binomial distribution, which quickly becomes
//! tiny for genuine overlaps. Log-factorials are precomputed once so that
//! every tail evaluation is a short sum of exponentials.

use crate::params::MAXLEN;

/// Probability of two random bases being identical.
pub const RANDOM_MATCH_PROB: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct MatchProbabilityCache {
    ln_factorials: Vec<f64>,
}

impl Default for MatchProbabilityCache {
    fn default() -> Self {
        Self::new(MAXLEN)
    }
}

impl MatchProbabilityCache {
    /// Precompute `ln(k!)` for `k` in `0..=max_n`.
    pub fn new(max_n: usize) -> Self {
        let mut ln_factorials = Vec::with_capacity(max_n + 1);
        let mut acc = 0.0;
        ln_factorials.push(acc);
        for k in 1..=max_n {
            acc += (k as f64).ln();
            ln_factorials.push(acc);
        }
        Self { ln_factorials }
    }

    pub fn max_n(&self) -> usize {
        self.ln_factorials.len() - 1
    }

    fn ln_factorial(&self, n: usize) -> f64 {
        match self.ln_factorials.get(n) {
            Some(x) => *x,
            None => self.ln_factorials[self.max_n()]
                + (self.max_n() + 1..=n).map(|k| (k as f64).ln()).sum::<f64>(),
        }
    }

    fn ln_binomial(&self, n: usize, k: usize) -> f64 {
        self.ln_factorial(n) - self.ln_factorial(k) - self.ln_factorial(n - k)
    }

    /// Probability of observing `matches` or more matches among `count`
    /// compared positions if each position matches with probability `p`.
    pub fn match_probability(&self, p: f64, matches: usize, count: usize) -> f64 {
        if matches == 0 || count == 0 {
            return 1.0;
        }
        if matches > count {
            return 0.0;
        }
        let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());
        let prob: f64 = (matches..=count)
            .map(|i| {
                let mismatches = count - i;
                // 0 * ln(0) must contribute nothing when p == 1
                let ln_mm = if mismatches == 0 { 0.0 } else { mismatches as f64 * ln_q };
                (self.ln_binomial(count, i) + i as f64 * ln_p + ln_mm).exp()
            })
            .sum();
        prob.min(1.0)
    }

    /// [`Self::match_probability`] for random DNA.
    pub fn random_match(&self, matches: usize, count: usize) -> f64 {
        self.match_probability(RANDOM_MATCH_PROB, matches, count)
    }
}

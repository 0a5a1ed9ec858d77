//! Key range model and write-distribution statistics.
//!
//! A [`KeyRanges`] value models how a range-sharded store has split its key
//! space. Feeding keys through a [`RangeHistogram`] shows how evenly a key
//! strategy spreads writes across those ranges.

use serde::{Deserialize, Serialize};

/// Ordered split points dividing the key space into contiguous ranges.
///
/// Range `i` holds keys `k` with `split[i - 1] <= k < split[i]`; the first
/// range is unbounded below and the last unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRanges {
    split_points: Vec<String>,
}

impl KeyRanges {
    /// The whole key space as one range.
    pub fn single() -> Self {
        Self {
            split_points: Vec::new(),
        }
    }

    /// `n` equal ranges over lowercase hex keys, split on four-digit prefixes.
    pub fn uniform_hex(n: usize) -> Self {
        let n = n.clamp(1, 65536);
        let split_points = (1..n)
            .map(|i| format!("{:04x}", i * 65536 / n))
            .collect();
        Self { split_points }
    }

    /// Ranges from explicit split points. Points are sorted and deduplicated.
    pub fn from_split_points<I, S>(points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut split_points: Vec<String> = points.into_iter().map(Into::into).collect();
        split_points.sort();
        split_points.dedup();
        Self { split_points }
    }

    /// `n` ranges holding roughly equal shares of `sample`.
    ///
    /// This is how a store that splits on size ends up partitioned after
    /// loading `sample`; new writes are then measured against those ranges.
    pub fn from_sample(sample: &[String], n: usize) -> Self {
        if sample.is_empty() || n <= 1 {
            return Self::single();
        }
        let mut sorted: Vec<&str> = sample.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let points = (1..n).map(|i| sorted[i * sorted.len() / n]);
        Self::from_split_points(points)
    }

    pub fn len(&self) -> usize {
        self.split_points.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn split_points(&self) -> &[String] {
        &self.split_points
    }

    /// Index of the range holding `key`.
    pub fn range_of(&self, key: &str) -> usize {
        self.split_points.partition_point(|p| p.as_str() <= key)
    }
}

impl Default for KeyRanges {
    fn default() -> Self {
        Self::uniform_hex(16)
    }
}

/// Pearson chi-square statistic of `counts` against a uniform expectation.
///
/// Zero means perfectly even. Returns 0 for an empty histogram.
pub fn chi_square(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 || counts.is_empty() {
        return 0.0;
    }
    let expected = total as f64 / counts.len() as f64;
    counts
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

/// Per-range write counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeHistogram {
    ranges: KeyRanges,
    counts: Vec<u64>,
}

impl RangeHistogram {
    pub fn new(ranges: KeyRanges) -> Self {
        let counts = vec![0; ranges.len()];
        Self { ranges, counts }
    }

    pub fn record(&mut self, key: &str) {
        let idx = self.ranges.range_of(key);
        self.counts[idx] += 1;
    }

    pub fn ranges(&self) -> &KeyRanges {
        &self.ranges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn chi_square(&self) -> f64 {
        chi_square(&self.counts)
    }

    /// Index and count of the busiest range.
    pub fn hottest(&self) -> Option<(usize, u64)> {
        self.counts
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(i, c)| (c, std::cmp::Reverse(i)))
            .filter(|&(_, c)| c > 0)
    }

    /// Fraction of all writes that hit the busiest range.
    pub fn hottest_share(&self) -> f64 {
        let total = self.total();
        match self.hottest() {
            Some((_, c)) if total > 0 => c as f64 / total as f64,
            _ => 0.0,
        }
    }
}

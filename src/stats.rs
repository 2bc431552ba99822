use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from the (possibly parallel) enrichment pass
#[derive(Default)]
pub struct EnrichmentStats {
    pub rows_enriched: AtomicU64,
    pub rows_matched: AtomicU64,
    pub rows_unmatched: AtomicU64,
    pub empty_keys: AtomicU64,
}

/// Plain snapshot of [`EnrichmentStats`] for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentCounts {
    pub rows_enriched: u64,
    pub rows_matched: u64,
    pub rows_unmatched: u64,
    pub empty_keys: u64,
}

impl EnrichmentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_matched(&self, count: u64) {
        self.rows_matched.fetch_add(count, Ordering::Relaxed);
        self.rows_enriched.fetch_add(count, Ordering::Relaxed);
    }

    /// Rows with an empty key are also unmatched; `empty` counts the subset.
    pub fn add_unmatched(&self, count: u64, empty: u64) {
        self.rows_unmatched.fetch_add(count, Ordering::Relaxed);
        self.rows_enriched.fetch_add(count, Ordering::Relaxed);
        self.empty_keys.fetch_add(empty, Ordering::Relaxed);
    }

    pub fn enriched(&self) -> u64 {
        self.rows_enriched.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.rows_matched.load(Ordering::Relaxed)
    }

    pub fn unmatched(&self) -> u64 {
        self.rows_unmatched.load(Ordering::Relaxed)
    }

    pub fn empty(&self) -> u64 {
        self.empty_keys.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EnrichmentCounts {
        EnrichmentCounts {
            rows_enriched: self.enriched(),
            rows_matched: self.matched(),
            rows_unmatched: self.unmatched(),
            empty_keys: self.empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn default_values_are_zero() {
        let stats = EnrichmentStats::new();
        assert_eq!(stats.snapshot(), EnrichmentCounts::default());
    }

    #[test]
    fn matched_and_unmatched_add_up() {
        let stats = EnrichmentStats::new();
        stats.add_matched(3);
        stats.add_unmatched(2, 1);
        stats.add_matched(1);

        assert_eq!(stats.matched(), 4);
        assert_eq!(stats.unmatched(), 2);
        assert_eq!(stats.empty(), 1);
        assert_eq!(stats.enriched(), 6);
    }

    #[test]
    fn concurrent_updates() {
        let stats = EnrichmentStats::new();
        (0..1000u64).into_par_iter().for_each(|i| {
            if i % 2 == 0 {
                stats.add_matched(1);
            } else {
                stats.add_unmatched(1, 0);
            }
        });
        assert_eq!(stats.matched(), 500);
        assert_eq!(stats.unmatched(), 500);
        assert_eq!(stats.enriched(), 1000);
    }
}

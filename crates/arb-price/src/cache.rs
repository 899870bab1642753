//! Quote cache keyed by `(symbol, mode)`.

use arb_core::{ProviderQuote, QuoteMode};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// TTL cache of resolved quotes.
///
/// Signal and convergence lookups apply different floors, so the same
/// symbol is cached once per mode.
#[derive(Debug)]
pub struct QuoteCache {
    entries: DashMap<(String, QuoteMode), ProviderQuote>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `(symbol, mode)`. A stale entry is evicted.
    pub fn get(&self, symbol: &str, mode: QuoteMode, now: DateTime<Utc>) -> Option<ProviderQuote> {
        let key = (symbol.to_string(), mode);
        match self.entries.get(&key) {
            Some(entry) if entry.age(now) < self.ttl => return Some(entry.clone()),
            Some(_) => {}
            None => return None,
        }
        // Freshness is re-checked under the shard lock; a quote inserted
        // since the read above stays.
        self.entries.remove_if(&key, |_, q| q.age(now) >= self.ttl);
        None
    }

    pub fn insert(&self, symbol: &str, mode: QuoteMode, quote: ProviderQuote) {
        self.entries.insert((symbol.to_string(), mode), quote);
    }

    /// Drop every stale entry.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, q| q.age(now) < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{Price, ProviderId};
    use rust_decimal_macros::dec;

    fn sample_quote(fetched_at: DateTime<Utc>) -> ProviderQuote {
        let mut quote = ProviderQuote::new(
            ProviderId::Aggregator,
            Price::new(dec!(1.03)),
            dec!(50000),
            dec!(100000),
            "bsc",
        );
        quote.fetched_at = fetched_at;
        quote
    }

    #[test]
    fn test_fresh_hit() {
        let cache = QuoteCache::new(Duration::seconds(300));
        let now = Utc::now();
        cache.insert("FOO", QuoteMode::Signal, sample_quote(now));

        let hit = cache.get("FOO", QuoteMode::Signal, now + Duration::seconds(299));
        assert_eq!(hit.map(|q| q.price), Some(Price::new(dec!(1.03))));
    }

    #[test]
    fn test_modes_are_separate() {
        let cache = QuoteCache::new(Duration::seconds(300));
        let now = Utc::now();
        cache.insert("FOO", QuoteMode::Signal, sample_quote(now));

        assert!(cache.get("FOO", QuoteMode::Convergence, now).is_none());
    }

    #[test]
    fn test_stale_entry_evicted() {
        let cache = QuoteCache::new(Duration::seconds(300));
        let now = Utc::now();
        cache.insert("FOO", QuoteMode::Signal, sample_quote(now));

        assert!(cache.get("FOO", QuoteMode::Signal, now + Duration::seconds(300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = QuoteCache::new(Duration::seconds(60));
        let now = Utc::now();
        cache.insert("OLD", QuoteMode::Signal, sample_quote(now - Duration::seconds(120)));
        cache.insert("NEW", QuoteMode::Signal, sample_quote(now));

        assert_eq!(cache.purge_expired(now), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_concurrent_refresh() {
        let cache = QuoteCache::new(Duration::seconds(60));
        let now = Utc::now();
        let stale = sample_quote(now - Duration::seconds(120));

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..5_000 {
                    cache.insert("FOO", QuoteMode::Signal, stale.clone());
                    cache.insert("FOO", QuoteMode::Signal, sample_quote(now));
                }
            });
            s.spawn(|| {
                for _ in 0..5_000 {
                    cache.get("FOO", QuoteMode::Signal, now);
                }
            });
        });

        assert!(cache.get("FOO", QuoteMode::Signal, now).is_some());
    }
}

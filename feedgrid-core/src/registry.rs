use crate::trade::PairKey;
use fnv::FnvHashMap;
use tracing::warn;

/// A live `(exchange, pair)` feed: exists iff the adapter has emitted `connected` and not yet
/// `disconnected` for that pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEntry {
    /// Identifier of the underlying upstream socket; multiple pairs may share one.
    pub api_id: String,
    pub exchange: String,
    pub pair: String,
    /// Count of trades observed since registration.
    pub hit: u64,
    /// Monotonic ms at registration.
    pub start: i64,
    /// Monotonic ms of last trade.
    pub timestamp: i64,
}

/// Per-`apiId` snapshot returned by [`ConnectionRegistry::snapshot_by_api`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiSnapshot {
    pub pairs: Vec<PairKey>,
    pub hits: Vec<u64>,
    pub timestamps: Vec<i64>,
    pub start_times: Vec<i64>,
}

/// Tracks live `(exchange, pair)` feeds, per-feed counters and per-API grouping.
///
/// Only adapter lifecycle events mutate this registry; the Activity Monitor only ever reads
/// snapshots of it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: FnvHashMap<PairKey, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on adapter `connected`. Fails silently (logs) if the key already exists - this is
    /// treated as a bug in the calling adapter, not a reason to tear down state.
    pub fn register(&mut self, exchange: &str, pair: &str, api_id: &str, now: i64) {
        let key = PairKey::new(exchange, pair);

        if self.entries.contains_key(&key) {
            warn!(%key, "register called for a feed that is already present in the registry");
            return;
        }

        self.entries.insert(
            key,
            ConnectionEntry {
                api_id: api_id.to_string(),
                exchange: exchange.to_string(),
                pair: pair.to_string(),
                hit: 0,
                start: now,
                timestamp: now,
            },
        );
    }

    /// Called on adapter `disconnected`. Fails silently if the key is absent.
    pub fn deregister(&mut self, exchange: &str, pair: &str) {
        let key = PairKey::new(exchange, pair);

        if self.entries.remove(&key).is_none() {
            warn!(%key, "deregister called for a feed that is not present in the registry");
        }
    }

    /// Increments `hit` and sets `timestamp = now` for an existing feed.
    ///
    /// Returns `false`, leaving the registry untouched, if no entry exists for the key - an
    /// under-subscribed feed must never gain a phantom registration via `touch`.
    pub fn touch(&mut self, exchange: &str, pair: &str, now: i64) -> bool {
        let key = PairKey::new(exchange, pair);

        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.hit += 1;
                entry.timestamp = now;
                true
            }
            None => false,
        }
    }

    /// Returns whether a feed is currently registered, without mutating anything.
    pub fn contains(&self, exchange: &str, pair: &str) -> bool {
        self.entries.contains_key(&PairKey::new(exchange, pair))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PairKey, &ConnectionEntry)> {
        self.entries.iter()
    }

    /// For each `apiId`, returns the pairs it carries alongside their hits, timestamps and start
    /// times - the input the Activity Monitor needs to compute per-API staleness.
    pub fn snapshot_by_api(&self) -> FnvHashMap<String, ApiSnapshot> {
        let mut snapshot: FnvHashMap<String, ApiSnapshot> = FnvHashMap::default();

        for (key, entry) in &self.entries {
            let api = snapshot.entry(entry.api_id.clone()).or_default();
            api.pairs.push(key.clone());
            api.hits.push(entry.hit);
            api.timestamps.push(entry.timestamp);
            api.start_times.push(entry.start);
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_touch_updates_hit_and_timestamp() {
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);

        assert!(registry.touch("X", "BTC", 100));
        assert!(registry.touch("X", "BTC", 200));

        let entry = registry
            .entries()
            .find(|(key, _)| key.exchange == "X" && key.pair == "BTC")
            .map(|(_, entry)| entry)
            .unwrap();

        assert_eq!(entry.hit, 2);
        assert_eq!(entry.timestamp, 200);
        assert_eq!(entry.start, 0);
    }

    #[test]
    fn touch_without_registration_does_not_create_an_entry() {
        let mut registry = ConnectionRegistry::new();

        assert!(!registry.touch("X", "ETH", 100));
        assert!(!registry.contains("X", "ETH"));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_twice_logs_and_keeps_first_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);
        registry.register("X", "BTC", "api-2", 999);

        let entry = registry
            .entries()
            .find(|(key, _)| key.exchange == "X" && key.pair == "BTC")
            .map(|(_, entry)| entry)
            .unwrap();

        assert_eq!(entry.api_id, "api-1");
        assert_eq!(entry.start, 0);
    }

    #[test]
    fn deregister_removes_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);
        registry.deregister("X", "BTC");

        assert!(!registry.contains("X", "BTC"));
    }

    #[test]
    fn snapshot_by_api_groups_feeds_sharing_a_connection() {
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);
        registry.register("X", "ETH", "api-1", 0);
        registry.touch("X", "BTC", 10);

        let snapshot = registry.snapshot_by_api();
        let api = snapshot.get("api-1").unwrap();

        assert_eq!(api.pairs.len(), 2);
        assert_eq!(api.hits.iter().sum::<u64>(), 1);
    }
}

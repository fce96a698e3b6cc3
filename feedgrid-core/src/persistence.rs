use crate::trade::Trade;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Gates which operations a storage driver's `fetch` response supports - a typed replacement for
/// comparing a raw `"trade"` / `"point"` string at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    /// `fetch` returns raw [`Trade`] records.
    Trade,
    /// `fetch` returns pre-bucketed [`PointRecord`]s.
    Point,
}

/// A single pre-bucketed OHLCV-style aggregate, as emitted by a `point`-format storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub timestamp: i64,
    pub market: String,
    pub vbuy: f64,
    pub vsell: f64,
    pub cbuy: u64,
    pub csell: u64,
    pub lbuy: f64,
    pub lsell: f64,
}

/// Result of a [`Storage::fetch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutput {
    Trades(Vec<Trade>),
    Points(Vec<PointRecord>),
    Empty,
}

/// Query parameters accepted by [`Storage::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    pub from: i64,
    pub to: i64,
    pub timeframe: Option<i64>,
    pub markets: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage '{name}' failed to connect: {reason}")]
    Connect { name: String, reason: String },
    #[error("storage '{name}' failed to save batch: {reason}")]
    Save { name: String, reason: String },
    #[error("storage '{name}' failed to fetch: {reason}")]
    Fetch { name: String, reason: String },
}

/// A pluggable persistence sink/fetcher. Opaque from the scheduler's perspective - it only needs
/// to know the format of what `fetch` returns and how to invoke `save`/`fetch`.
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    fn format(&self) -> StorageFormat;

    async fn connect(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(&self, batch: &[Trade], is_exit_flush: bool) -> Result<(), StorageError>;

    async fn fetch(&self, query: &FetchQuery) -> Result<FetchOutput, StorageError>;
}

/// Compute the delay until the next aligned flush boundary.
///
/// Flushes are staggered to the start of each `interval`-sized wall-clock bucket, leaving a 20ms
/// safety gap; if that would leave under 1 second until the boundary, roll forward a full
/// interval so back-to-back flushes never collide.
pub fn next_flush_delay(now_ms: i64, interval_ms: i64) -> Duration {
    let next_boundary = ((now_ms + interval_ms - 1) / interval_ms) * interval_ms;
    let mut delay = next_boundary - now_ms - 20;

    if delay < 1000 {
        delay += interval_ms;
    }

    Duration::from_millis(delay.max(0) as u64)
}

/// The in-memory chunk of trades pending the next flush, and the logic that drains it.
///
/// Invariant: a trade is either in the chunk, in flight to a storage, or durably stored - never
/// lost while the process is live, never duplicated within a single flush. The drain is a
/// pointer-swap, not a per-element removal, so ingestion during a save can never observe or
/// mutate the batch being saved.
#[derive(Debug, Default)]
pub struct PendingChunk {
    trades: Vec<Trade>,
}

impl PendingChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the Ingestion Router is expected to call this.
    pub fn append(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn extend(&mut self, trades: impl IntoIterator<Item = Trade>) {
        self.trades.extend(trades);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Atomically swap the chunk for an empty one, returning the removed contents.
    pub fn swap(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.trades)
    }
}

/// Swaps the pending chunk, writes the removed batch to every configured storage and schedules
/// the next aligned flush.
pub struct PersistenceScheduler {
    storages: Vec<Box<dyn Storage>>,
    interval_ms: i64,
}

impl fmt::Debug for PersistenceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceScheduler")
            .field("storages", &self.storages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("interval_ms", &self.interval_ms)
            .finish()
    }
}

impl PersistenceScheduler {
    pub fn new(storages: Vec<Box<dyn Storage>>, interval_ms: i64) -> Self {
        Self {
            storages,
            interval_ms,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.storages.is_empty()
    }

    pub fn primary_format(&self) -> Option<StorageFormat> {
        self.storages.first().map(|storage| storage.format())
    }

    pub fn delay_until_next_flush(&self, now_ms: i64) -> Duration {
        next_flush_delay(now_ms, self.interval_ms)
    }

    /// Run one flush: swap the chunk, and if non-empty, save it to every storage. A failing
    /// storage is logged and does not prevent the others from being attempted.
    pub async fn flush(&self, chunk: &mut PendingChunk, is_exit_flush: bool) {
        let batch = chunk.swap();

        if batch.is_empty() {
            return;
        }

        for storage in &self.storages {
            if let Err(error) = storage.save(&batch, is_exit_flush).await {
                error!(storage = storage.name(), %error, "storage save failed, batch lost for this flush");
            }
        }
    }

    pub async fn fetch_primary(&self, query: &FetchQuery) -> Result<FetchOutput, StorageError> {
        match self.storages.first() {
            Some(storage) => storage.fetch(query).await,
            None => {
                warn!("historical fetch requested with no storage configured");
                Ok(FetchOutput::Empty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_delay_leaves_a_twenty_ms_safety_gap() {
        // S4: backupInterval=10_000, now=12_345 -> delay = 20000 - 12345 - 20 = 7635ms
        assert_eq!(next_flush_delay(12_345, 10_000), Duration::from_millis(7_635));
    }

    #[test]
    fn near_boundary_delay_rolls_forward_a_full_interval() {
        // S4: now=19_990 -> raw delay = -10, < 1000 -> add 10_000 -> 9990ms
        assert_eq!(next_flush_delay(19_990, 10_000), Duration::from_millis(9_990));
    }

    #[test]
    fn pending_chunk_swap_empties_the_chunk_and_returns_prior_contents() {
        let mut chunk = PendingChunk::new();
        chunk.append(Trade {
            exchange: "X".to_string(),
            pair: "BTC".to_string(),
            timestamp: 0,
            side: feedgrid_instrument::Side::Buy,
            price: 1.0,
            size: 1.0,
            liquidation: false,
        });

        let drained = chunk.swap();
        assert_eq!(drained.len(), 1);
        assert!(chunk.is_empty());
    }
}

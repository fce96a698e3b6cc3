use async_trait::async_trait;
use feedgrid_core::persistence::{FetchOutput, FetchQuery, Storage, StorageError, StorageFormat};
use feedgrid_core::Trade;
use std::sync::Mutex;
use tracing::info;

/// Process-local trade-format storage. Durable storages are opaque external drivers wired in by
/// deployment; this is the default used when none are configured, so the server is runnable
/// standalone and historical queries over recently-flushed data still work.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    trades: Mutex<Vec<Trade>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn format(&self) -> StorageFormat {
        StorageFormat::Trade
    }

    async fn save(&self, batch: &[Trade], is_exit_flush: bool) -> Result<(), StorageError> {
        let mut trades = self.trades.lock().expect("storage mutex poisoned");
        trades.extend(batch.iter().cloned());
        info!(count = batch.len(), is_exit_flush, "flushed batch to memory storage");
        Ok(())
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<FetchOutput, StorageError> {
        let trades = self.trades.lock().expect("storage mutex poisoned");
        let matched: Vec<Trade> = trades
            .iter()
            .filter(|trade| trade.timestamp >= query.from && trade.timestamp <= query.to)
            .filter(|trade| query.markets.is_empty() || query.markets.contains(&trade.key().as_string()))
            .cloned()
            .collect();

        if matched.is_empty() {
            Ok(FetchOutput::Empty)
        } else {
            Ok(FetchOutput::Trades(matched))
        }
    }
}

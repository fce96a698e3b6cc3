use crate::{
    aggregator::Aggregator,
    broadcast::BroadcastMode,
    persistence::PendingChunk,
    registry::ConnectionRegistry,
    trade::Trade,
};

/// What the Ingestion Router should do with a batch once every trade in it has cleared
/// registration gating.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedBatch {
    /// Aggregated mode: trades were fed into the [`Aggregator`]; any composites it sealed as a
    /// side effect of displacement.
    Aggregated { sealed: Vec<Trade> },
    /// Immediate mode: the whole batch should be handed to the broadcast dispatcher synchronously.
    Immediate { trades: Vec<Trade> },
    /// Debounced mode: trades were appended to the delayed-broadcast queue, returned here so the
    /// caller can push them.
    Debounced { trades: Vec<Trade> },
    /// Broadcast disabled: nothing further to do.
    None,
}

/// Consumes `{exchange, batch}` events from exchange adapters, updates the Connection Registry
/// and forks accepted trades into the persistence chunk, the aggregation map and/or the broadcast
/// queue.
///
/// Touches the registry before anything else: a trade whose key lacks a registry entry is
/// discarded for both the persistence and aggregation paths, never just one.
#[derive(Debug)]
pub struct IngestionRouter {
    pub mode: BroadcastMode,
    persistence_enabled: bool,
}

impl IngestionRouter {
    pub fn new(mode: BroadcastMode, persistence_enabled: bool) -> Self {
        Self {
            mode,
            persistence_enabled,
        }
    }

    /// Route one batch of trades, in array order, preserving that order into both the
    /// persistence chunk and any broadcast queue.
    pub fn route(
        &self,
        batch: Vec<Trade>,
        now: i64,
        registry: &mut ConnectionRegistry,
        chunk: &mut PendingChunk,
        aggregator: &mut Aggregator,
    ) -> RoutedBatch {
        let mut accepted = Vec::with_capacity(batch.len());

        for trade in batch {
            if !registry.touch(&trade.exchange, &trade.pair, now) {
                continue;
            }

            if self.persistence_enabled {
                chunk.append(trade.clone());
            }

            accepted.push(trade);
        }

        if accepted.is_empty() {
            return RoutedBatch::None;
        }

        match self.mode {
            BroadcastMode::Disabled => RoutedBatch::None,
            BroadcastMode::Aggregated => {
                let mut sealed = Vec::new();
                for trade in accepted {
                    aggregator.ingest(trade, now, &mut sealed);
                }
                RoutedBatch::Aggregated { sealed }
            }
            BroadcastMode::Immediate => RoutedBatch::Immediate { trades: accepted },
            BroadcastMode::Debounced { .. } => RoutedBatch::Debounced { trades: accepted },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgrid_instrument::Side;

    fn trade(exchange: &str, pair: &str) -> Trade {
        Trade {
            exchange: exchange.to_string(),
            pair: pair.to_string(),
            timestamp: 0,
            side: Side::Buy,
            price: 1.0,
            size: 1.0,
            liquidation: false,
        }
    }

    #[test]
    fn unregistered_feed_is_dropped_from_both_chunk_and_aggregation() {
        // S1: registration gating
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);

        let mut chunk = PendingChunk::new();
        let mut aggregator = Aggregator::new();
        let router = IngestionRouter::new(BroadcastMode::Disabled, true);

        router.route(
            vec![trade("X", "BTC"), trade("X", "ETH")],
            10,
            &mut registry,
            &mut chunk,
            &mut aggregator,
        );

        assert_eq!(chunk.len(), 1);
        let hit = registry
            .entries()
            .find(|(key, _)| key.pair == "BTC")
            .map(|(_, entry)| entry.hit)
            .unwrap();
        assert_eq!(hit, 1);
    }

    #[test]
    fn immediate_mode_returns_accepted_trades_for_synchronous_dispatch() {
        let mut registry = ConnectionRegistry::new();
        registry.register("X", "BTC", "api-1", 0);

        let mut chunk = PendingChunk::new();
        let mut aggregator = Aggregator::new();
        let router = IngestionRouter::new(BroadcastMode::Immediate, false);

        let routed = router.route(
            vec![trade("X", "BTC")],
            0,
            &mut registry,
            &mut chunk,
            &mut aggregator,
        );

        assert!(matches!(routed, RoutedBatch::Immediate { trades } if trades.len() == 1));
        assert!(chunk.is_empty());
    }
}

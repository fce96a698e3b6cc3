use crate::trade::{PairKey, Trade};
use fnv::FnvHashMap;

/// Window within which a burst of same-`(timestamp, side)` trades is merged into one composite.
pub const COMPOSITE_TIMEOUT_MS: i64 = 50;

/// A composite trade being accumulated for a single key.
///
/// While open, `price` holds `Σ(price·size)` rather than a price - it is only a true
/// volume-weighted price once [`OpenComposite::seal`] divides it by `size`.
#[derive(Debug, Clone, PartialEq)]
struct OpenComposite {
    trade: Trade,
    /// Wall-clock deadline (ms) by which this composite must be sealed even absent displacement.
    timeout: i64,
}

impl OpenComposite {
    fn start(trade: Trade, now: i64) -> Self {
        let price_volume = trade.price * trade.size;
        Self {
            trade: Trade {
                price: price_volume,
                ..trade
            },
            timeout: now + COMPOSITE_TIMEOUT_MS,
        }
    }

    fn merge(&mut self, incoming: &Trade) {
        self.trade.size += incoming.size;
        self.trade.price += incoming.price * incoming.size;
    }

    fn seal(self) -> Trade {
        let mut sealed = self.trade;
        sealed.price /= sealed.size;
        sealed
    }
}

/// Collapses micro-bursts where an exchange emits multiple fills on the same wall-clock
/// millisecond and side into one volume-weighted composite trade.
///
/// Only the [`Aggregator`] mutates its own map; nothing else is permitted to.
#[derive(Debug, Default)]
pub struct Aggregator {
    open: FnvHashMap<PairKey, OpenComposite>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a single trade, pushing any displaced composite onto `sealed`.
    pub fn ingest(&mut self, trade: Trade, now: i64, sealed: &mut Vec<Trade>) {
        let key = trade.key();

        match self.open.get_mut(&key) {
            Some(open) if open.trade.timestamp == trade.timestamp && open.trade.side == trade.side => {
                open.merge(&trade);
            }
            Some(_) => {
                let displaced = self.open.remove(&key).expect("checked Some above");
                sealed.push(displaced.seal());
                self.open.insert(key, OpenComposite::start(trade, now));
            }
            None => {
                self.open.insert(key, OpenComposite::start(trade, now));
            }
        }
    }

    /// Seal every open composite whose timeout has expired, pushing it onto `sealed`.
    ///
    /// Invoked every 50ms by the broadcast tick in aggregated mode.
    pub fn sweep_timeouts(&mut self, now: i64, sealed: &mut Vec<Trade>) {
        let expired: Vec<PairKey> = self
            .open
            .iter()
            .filter(|(_, open)| open.timeout <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            if let Some(open) = self.open.remove(&key) {
                sealed.push(open.seal());
            }
        }
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgrid_instrument::Side;

    fn trade(ts: i64, side: Side, price: f64, size: f64) -> Trade {
        Trade {
            exchange: "X".to_string(),
            pair: "BTC".to_string(),
            timestamp: ts,
            side,
            price,
            size,
            liquidation: false,
        }
    }

    #[test]
    fn volume_weighted_merge_of_same_timestamp_and_side() {
        let mut aggregator = Aggregator::new();
        let mut sealed = Vec::new();

        aggregator.ingest(trade(1000, Side::Buy, 100.0, 2.0), 0, &mut sealed);
        aggregator.ingest(trade(1000, Side::Buy, 110.0, 3.0), 10, &mut sealed);

        assert!(sealed.is_empty());
        assert_eq!(aggregator.open_len(), 1);

        aggregator.sweep_timeouts(60, &mut sealed);

        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].size, 5.0);
        assert_eq!(sealed[0].price, (100.0 * 2.0 + 110.0 * 3.0) / 5.0);
    }

    #[test]
    fn displacement_by_different_side_seals_immediately() {
        let mut aggregator = Aggregator::new();
        let mut sealed = Vec::new();

        aggregator.ingest(trade(1000, Side::Buy, 100.0, 1.0), 0, &mut sealed);
        aggregator.ingest(trade(1000, Side::Sell, 100.0, 1.0), 0, &mut sealed);

        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].side, Side::Buy);
        assert_eq!(sealed[0].price, 100.0);
        assert_eq!(sealed[0].size, 1.0);
        assert_eq!(aggregator.open_len(), 1);
    }

    #[test]
    fn displacement_by_different_timestamp_seals_immediately() {
        let mut aggregator = Aggregator::new();
        let mut sealed = Vec::new();

        aggregator.ingest(trade(1000, Side::Buy, 100.0, 1.0), 0, &mut sealed);
        aggregator.ingest(trade(1001, Side::Buy, 105.0, 1.0), 1, &mut sealed);

        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].timestamp, 1000);
    }

    #[test]
    fn open_composite_seals_within_fifty_ms_of_creation() {
        let mut aggregator = Aggregator::new();
        let mut sealed = Vec::new();

        aggregator.ingest(trade(1000, Side::Buy, 100.0, 1.0), 0, &mut sealed);
        aggregator.sweep_timeouts(49, &mut sealed);
        assert!(sealed.is_empty());

        aggregator.sweep_timeouts(50, &mut sealed);
        assert_eq!(sealed.len(), 1);
    }
}

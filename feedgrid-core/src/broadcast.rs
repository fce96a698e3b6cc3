use crate::trade::Trade;
use fnv::FnvHashMap;
use serde::Serialize;
use std::time::Duration;

/// How pending trades travel from the Ingestion Router to the Broadcast Dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// No broadcast fan-out configured.
    Disabled,
    /// Each batch is dispatched synchronously by the Ingestion Router.
    Immediate,
    /// Batches accumulate in `delayedForBroadcast` and drain on a fixed tick.
    Debounced { tick: Duration },
    /// Trades are first merged by the [`Aggregator`](crate::aggregator::Aggregator) and the
    /// sealed composites drain on a fixed tick.
    Aggregated,
}

/// A single broadcast-client connection's subscription state.
///
/// `pairs` is the set of `"{exchange}:{pair}"` keys the client wishes to receive, initially
/// populated from the connection URL and replaceable via inbound `"A+B+C"` text messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSession {
    pub pairs: Vec<String>,
}

impl ClientSession {
    pub fn from_path(path: &str) -> Self {
        Self {
            pairs: split_pairs(path),
        }
    }

    /// Replace the subscription set from an inbound `"+"`-delimited text message.
    pub fn resubscribe(&mut self, message: &str) {
        self.pairs = split_pairs(message);
    }
}

fn split_pairs(raw: &str) -> Vec<String> {
    raw.trim_matches('/')
        .split('+')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tracks every broadcast client's subscription list, keyed by an opaque connection id assigned
/// by the transport layer.
#[derive(Debug, Default)]
pub struct ClientSessionManager {
    sessions: FnvHashMap<u64, ClientSession>,
}

impl ClientSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, id: u64, path: &str) -> &ClientSession {
        self.sessions.insert(id, ClientSession::from_path(path));
        self.sessions.get(&id).expect("just inserted")
    }

    pub fn disconnect(&mut self, id: u64) {
        self.sessions.remove(&id);
    }

    pub fn resubscribe(&mut self, id: u64, message: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.resubscribe(message);
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&u64, &ClientSession)> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// A frame the dispatcher hands to the transport layer for a single client: either a lifecycle
/// envelope or a `[pairKey, trades]` data frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Data(String, Vec<Trade>),
}

/// Groups pending trades by market and produces, per connected client, at most one data frame
/// per subscribed pair per dispatch.
///
/// The dispatcher itself holds no socket handles - it only computes *what* to send to *which*
/// client id; the transport layer owns the actual send.
#[derive(Debug, Default)]
pub struct BroadcastDispatcher;

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Group `trades` by `"{exchange}:{pair}"`, then for every session compute the ordered list
    /// of data frames it should receive - one frame per pair it subscribes to that has pending
    /// trades, in the order the session lists its pairs.
    pub fn broadcast_trades(
        &self,
        trades: Vec<Trade>,
        sessions: &ClientSessionManager,
    ) -> FnvHashMap<u64, Vec<OutboundFrame>> {
        let mut by_pair: FnvHashMap<String, Vec<Trade>> = FnvHashMap::default();
        for trade in trades {
            by_pair.entry(trade.key().as_string()).or_default().push(trade);
        }

        let mut frames_by_session = FnvHashMap::default();
        for (id, session) in sessions.sessions() {
            let mut frames = Vec::new();
            for pair in &session.pairs {
                if let Some(pair_trades) = by_pair.get(pair) {
                    frames.push(OutboundFrame::Data(pair.clone(), pair_trades.clone()));
                }
            }
            if !frames.is_empty() {
                frames_by_session.insert(*id, frames);
            }
        }

        frames_by_session
    }
}

/// A queue of pending trades awaiting the next dispatch tick.
///
/// Holds either raw trades (debounced mode) or sealed composites (aggregated mode) - never both
/// at once, since a deployment runs in exactly one broadcast mode.
#[derive(Debug, Default)]
pub struct BroadcastQueue {
    pending: Vec<Trade>,
}

impl BroadcastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: Trade) {
        self.pending.push(trade);
    }

    pub fn extend(&mut self, trades: impl IntoIterator<Item = Trade>) {
        self.pending.extend(trades);
    }

    /// Drain the whole queue, preserving arrival order, ready to hand to
    /// [`BroadcastDispatcher::broadcast_trades`].
    pub fn drain(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
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
    fn client_session_parses_plus_delimited_pairs_from_path() {
        let session = ClientSession::from_path("/X:BTC+X:ETH");
        assert_eq!(session.pairs, vec!["X:BTC".to_string(), "X:ETH".to_string()]);
    }

    #[test]
    fn resubscribe_replaces_the_subscription_set() {
        let mut session = ClientSession::from_path("/X:BTC");
        session.resubscribe("Y:BTC+Y:ETH");
        assert_eq!(session.pairs, vec!["Y:BTC".to_string(), "Y:ETH".to_string()]);
    }

    #[test]
    fn each_client_gets_at_most_one_frame_per_subscribed_pair() {
        let mut sessions = ClientSessionManager::new();
        sessions.connect(1, "/X:BTC+X:ETH");

        let dispatcher = BroadcastDispatcher::new();
        let frames = dispatcher.broadcast_trades(
            vec![trade("X", "BTC"), trade("X", "BTC"), trade("X", "ETH")],
            &sessions,
        );

        let session_frames = frames.get(&1).unwrap();
        assert_eq!(session_frames.len(), 2);
    }

    #[test]
    fn session_with_no_matching_pending_trades_receives_no_frames() {
        let mut sessions = ClientSessionManager::new();
        sessions.connect(1, "/Y:BTC");

        let dispatcher = BroadcastDispatcher::new();
        let frames = dispatcher.broadcast_trades(vec![trade("X", "BTC")], &sessions);

        assert!(!frames.contains_key(&1));
    }
}

use crate::frames::{LifecycleEnvelope, ServerFrame, WelcomeEnvelope};
use feedgrid_core::{
    aggregator::Aggregator,
    broadcast::{BroadcastDispatcher, BroadcastMode, BroadcastQueue, ClientSessionManager, OutboundFrame},
    historical::{HistoricalQuery, HistoricalQueryError, HistoricalQueryHandler, HistoricalResponse},
    monitor::ActivityMonitor,
    now_ms,
    persistence::{PendingChunk, PersistenceScheduler, Storage},
    registry::ConnectionRegistry,
    router::{IngestionRouter, RoutedBatch},
    Trade,
};
use fnv::FnvHashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Everything a caller outside the single-writer core may ask of it. Delivered over an unbounded
/// channel and processed one at a time by [`run`], preserving the single-logical-event-loop
/// invariant without requiring any shared-state locking.
///
/// The `Exchange*` variants are the adapter-facing half of this contract (§6's `trades`,
/// `liquidations`, `connected`, `disconnected`, `err` events) - this workspace has no concrete
/// exchange adapter wired in (adapters are an external collaborator per the spec's scope), so
/// they are only constructed from tests here, by whatever external adapter code sends them in a
/// full deployment.
#[allow(dead_code)]
pub enum CoreCommand {
    ExchangeBatch {
        exchange: String,
        trades: Vec<Trade>,
    },
    ExchangeConnected {
        exchange: String,
        pair: String,
        api_id: String,
    },
    ExchangeDisconnected {
        exchange: String,
        pair: String,
    },
    ExchangeError {
        message: String,
    },
    ClientConnect {
        id: u64,
        path: String,
        tx: mpsc::UnboundedSender<ServerFrame>,
    },
    ClientDisconnect {
        id: u64,
    },
    ClientResubscribe {
        id: u64,
        message: String,
    },
    Historical {
        query: HistoricalQuery,
        reply: oneshot::Sender<Result<HistoricalResponse, HistoricalQueryError>>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::UnboundedSender<CoreCommand>,
}

impl CoreHandle {
    pub fn send(&self, command: CoreCommand) {
        let _ = self.tx.send(command);
    }

    pub async fn historical(
        &self,
        query: HistoricalQuery,
    ) -> Result<HistoricalResponse, HistoricalQueryError> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreCommand::Historical { query, reply });
        rx.await
            .unwrap_or(Err(HistoricalQueryError::Storage("core unavailable".into())))
    }
}

impl crate::shutdown::AsyncShutdown for CoreHandle {
    type Result = ();

    async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        self.send(CoreCommand::Shutdown { ack });
        let _ = rx.await;
    }
}

pub struct CoreConfig {
    pub broadcast_mode: BroadcastMode,
    pub persistence_enabled: bool,
    pub backup_interval_ms: i64,
    pub monitor_interval_ms: i64,
    pub reconnection_threshold_ms: f64,
    pub max_fetch_length: i64,
    pub exchanges: Vec<String>,
}

/// Spawn the core as its own task and return a cloneable handle to it. All registry, chunk,
/// aggregation and session state lives exclusively inside the spawned task.
pub fn spawn(config: CoreConfig, storages: Vec<Box<dyn Storage>>) -> CoreHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(config, storages, rx));
    CoreHandle { tx }
}

async fn run(
    config: CoreConfig,
    storages: Vec<Box<dyn Storage>>,
    mut rx: mpsc::UnboundedReceiver<CoreCommand>,
) {
    let mut registry = ConnectionRegistry::new();
    let mut aggregator = Aggregator::new();
    let mut chunk = PendingChunk::new();
    let mut queue = BroadcastQueue::new();
    let mut sessions = ClientSessionManager::new();
    let mut outbound: FnvHashMap<u64, mpsc::UnboundedSender<ServerFrame>> = FnvHashMap::default();

    let dispatcher = BroadcastDispatcher::new();
    let router = IngestionRouter::new(config.broadcast_mode, config.persistence_enabled);
    let scheduler = PersistenceScheduler::new(storages, config.backup_interval_ms);
    let historical = HistoricalQueryHandler::new(config.max_fetch_length);
    let mut monitor = ActivityMonitor::new(config.reconnection_threshold_ms);

    let broadcast_tick_duration = match config.broadcast_mode {
        BroadcastMode::Debounced { tick } => tick,
        BroadcastMode::Aggregated => Duration::from_millis(50),
        BroadcastMode::Disabled | BroadcastMode::Immediate => Duration::from_secs(3600),
    };
    let mut broadcast_tick = tokio::time::interval(broadcast_tick_duration);
    let mut monitor_tick =
        tokio::time::interval(Duration::from_millis(config.monitor_interval_ms.max(1) as u64));
    let mut flush_sleep = Box::pin(tokio::time::sleep(scheduler.delay_until_next_flush(now_ms())));

    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                if handle_command(
                    command,
                    &router,
                    &dispatcher,
                    &scheduler,
                    &historical,
                    &mut registry,
                    &mut chunk,
                    &mut aggregator,
                    &mut queue,
                    &mut sessions,
                    &mut outbound,
                    &config,
                )
                .await
                {
                    break;
                }
            }
            _ = broadcast_tick.tick() => {
                let now = now_ms();
                if matches!(config.broadcast_mode, BroadcastMode::Aggregated) {
                    let mut sealed = Vec::new();
                    aggregator.sweep_timeouts(now, &mut sealed);
                    queue.extend(sealed);
                }
                let trades = queue.drain();
                if !trades.is_empty() {
                    let frames = dispatcher.broadcast_trades(trades, &sessions);
                    send_frames(&outbound, frames);
                }
            }
            _ = monitor_tick.tick() => {
                for api in monitor.tick(now_ms(), &registry) {
                    warn!(api, "activity monitor: api stalled, reconnection requested");
                }
            }
            _ = &mut flush_sleep => {
                scheduler.flush(&mut chunk, false).await;
                flush_sleep.set(tokio::time::sleep(scheduler.delay_until_next_flush(now_ms())));
            }
        }
    }

    info!("core shutting down, running exit flush");
    scheduler.flush(&mut chunk, true).await;
}

/// Handle one [`CoreCommand`]. Returns `true` if the core should stop its event loop.
#[allow(clippy::too_many_arguments)]
async fn handle_command(
    command: CoreCommand,
    router: &IngestionRouter,
    dispatcher: &BroadcastDispatcher,
    scheduler: &PersistenceScheduler,
    historical: &HistoricalQueryHandler,
    registry: &mut ConnectionRegistry,
    chunk: &mut PendingChunk,
    aggregator: &mut Aggregator,
    queue: &mut BroadcastQueue,
    sessions: &mut ClientSessionManager,
    outbound: &mut FnvHashMap<u64, mpsc::UnboundedSender<ServerFrame>>,
    config: &CoreConfig,
) -> bool {
    match command {
        CoreCommand::ExchangeBatch { exchange, trades } => {
            let now = now_ms();
            tracing::trace!(exchange, count = trades.len(), "routing exchange batch");
            let routed = router.route(trades, now, registry, chunk, aggregator);
            match routed {
                RoutedBatch::Aggregated { sealed } => queue.extend(sealed),
                RoutedBatch::Debounced { trades } => queue.extend(trades),
                RoutedBatch::Immediate { trades } => {
                    let frames = dispatcher.broadcast_trades(trades, sessions);
                    send_frames(outbound, frames);
                }
                RoutedBatch::None => {}
            }
        }
        CoreCommand::ExchangeConnected { exchange, pair, api_id } => {
            registry.register(&exchange, &pair, &api_id, now_ms());
            broadcast_lifecycle(
                outbound,
                LifecycleEnvelope::ExchangeConnected { exchange, pair },
            );
        }
        CoreCommand::ExchangeDisconnected { exchange, pair } => {
            registry.deregister(&exchange, &pair);
            broadcast_lifecycle(
                outbound,
                LifecycleEnvelope::ExchangeDisconnected { exchange, pair },
            );
        }
        CoreCommand::ExchangeError { message } => {
            warn!(message, "exchange adapter reported an error");
            broadcast_lifecycle(outbound, LifecycleEnvelope::ExchangeError { message });
        }
        CoreCommand::ClientConnect { id, path, tx } => {
            let session = sessions.connect(id, &path);
            let welcome = WelcomeEnvelope {
                pairs: session.pairs.clone(),
                exchanges: config.exchanges.clone(),
            };
            let _ = tx.send(ServerFrame::Welcome(welcome));
            outbound.insert(id, tx);
        }
        CoreCommand::ClientDisconnect { id } => {
            sessions.disconnect(id);
            outbound.remove(&id);
        }
        CoreCommand::ClientResubscribe { id, message } => {
            sessions.resubscribe(id, &message);
        }
        CoreCommand::Historical { query, reply } => {
            let tail: Vec<Trade> = chunk.iter().cloned().collect();
            let result = historical.handle(query, scheduler, &tail).await;
            let _ = reply.send(result);
        }
        CoreCommand::Shutdown { ack } => {
            let _ = ack.send(());
            return true;
        }
    }

    false
}

fn send_frames(
    outbound: &FnvHashMap<u64, mpsc::UnboundedSender<ServerFrame>>,
    frames: FnvHashMap<u64, Vec<OutboundFrame>>,
) {
    for (id, session_frames) in frames {
        if let Some(tx) = outbound.get(&id) {
            for frame in session_frames {
                let _ = tx.send(ServerFrame::Data(frame));
            }
        }
    }
}

fn broadcast_lifecycle(
    outbound: &FnvHashMap<u64, mpsc::UnboundedSender<ServerFrame>>,
    event: LifecycleEnvelope,
) {
    for tx in outbound.values() {
        let _ = tx.send(ServerFrame::Lifecycle(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgrid_core::persistence::{FetchOutput, FetchQuery, StorageError, StorageFormat};
    use feedgrid_instrument::Side;

    struct NullStorage;

    #[async_trait::async_trait]
    impl Storage for NullStorage {
        fn name(&self) -> &str {
            "null"
        }

        fn format(&self) -> StorageFormat {
            StorageFormat::Trade
        }

        async fn save(&self, _batch: &[Trade], _is_exit_flush: bool) -> Result<(), StorageError> {
            Ok(())
        }

        async fn fetch(&self, _query: &FetchQuery) -> Result<FetchOutput, StorageError> {
            Ok(FetchOutput::Empty)
        }
    }

    fn test_config() -> CoreConfig {
        CoreConfig {
            broadcast_mode: BroadcastMode::Immediate,
            persistence_enabled: true,
            backup_interval_ms: 10_000,
            monitor_interval_ms: 1_000,
            reconnection_threshold_ms: 60_000.0,
            max_fetch_length: 10_000,
            exchanges: vec!["X".to_string()],
        }
    }

    /// Drives the full adapter-facing surface a real exchange integration would call: lifecycle
    /// events ripple into the connection registry and out to connected broadcast clients, and a
    /// trade batch for a registered pair reaches the client's socket as a `[pairKey, trades]`
    /// frame.
    #[tokio::test]
    async fn exchange_lifecycle_and_trade_batch_reach_a_connected_client() {
        let handle = spawn(test_config(), vec![Box::new(NullStorage)]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.send(CoreCommand::ClientConnect {
            id: 1,
            path: "/X:BTC".to_string(),
            tx,
        });
        assert!(matches!(rx.recv().await, Some(ServerFrame::Welcome(_))));

        handle.send(CoreCommand::ExchangeConnected {
            exchange: "X".to_string(),
            pair: "BTC".to_string(),
            api_id: "api-1".to_string(),
        });
        assert!(matches!(
            rx.recv().await,
            Some(ServerFrame::Lifecycle(LifecycleEnvelope::ExchangeConnected { .. }))
        ));

        handle.send(CoreCommand::ExchangeBatch {
            exchange: "X".to_string(),
            trades: vec![Trade {
                exchange: "X".to_string(),
                pair: "BTC".to_string(),
                timestamp: 0,
                side: Side::Buy,
                price: 100.0,
                size: 1.0,
                liquidation: false,
            }],
        });
        assert!(matches!(rx.recv().await, Some(ServerFrame::Data(_))));

        handle.send(CoreCommand::ExchangeError {
            message: "upstream closed".to_string(),
        });
        assert!(matches!(
            rx.recv().await,
            Some(ServerFrame::Lifecycle(LifecycleEnvelope::ExchangeError { .. }))
        ));

        handle.send(CoreCommand::ExchangeDisconnected {
            exchange: "X".to_string(),
            pair: "BTC".to_string(),
        });
        assert!(matches!(
            rx.recv().await,
            Some(ServerFrame::Lifecycle(LifecycleEnvelope::ExchangeDisconnected { .. }))
        ));

        let (ack, ack_rx) = oneshot::channel();
        handle.send(CoreCommand::Shutdown { ack });
        assert!(ack_rx.await.is_ok());
    }
}

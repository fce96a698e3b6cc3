#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # feedgrid-core
//! Ingestion, aggregation, persistence scheduling and broadcast fan-out for a multi-source
//! market-trade aggregator.
//!
//! Exchange adapters and storage drivers are external collaborators - opaque producers and sinks
//! with a fixed contract - wired up by a transport crate such as `feedgrid-server`. This crate
//! owns only the core: the Connection Registry, Ingestion Router, Aggregator, Broadcast
//! Dispatcher, Persistence Scheduler, Activity Monitor, Historical Query Handler and Client
//! Session Manager.
//!
//! All mutation of shared state (the registry, the pending chunk, the aggregation map, the
//! broadcast queues) is expected to happen from a single logical execution context - one task
//! owning a [`registry::ConnectionRegistry`], [`persistence::PendingChunk`],
//! [`aggregator::Aggregator`] and [`broadcast::ClientSessionManager`], driven by events arriving
//! over channels rather than by locking shared state across tasks.

/// Per-`(exchange, pair)` feed liveness tracking and per-API grouping (C1).
pub mod registry;

/// Accepts normalized trade batches and forks them into persistence, aggregation and broadcast
/// paths (C2).
pub mod router;

/// Volume-weighted composite trade merging on a timeout-or-displacement basis (C3).
pub mod aggregator;

/// Groups pending trades by market and fans them out to subscribed broadcast clients (C4, C8).
pub mod broadcast;

/// Pluggable storage driver contract and wall-clock-aligned flush scheduling (C5).
pub mod persistence;

/// Per-API staleness detection and stalled-feed reconnection triggers (C6).
pub mod monitor;

/// Historical range queries merging storage output with the unflushed tail (C7).
pub mod historical;

/// Normalised trade record and the `"{exchange}:{pair}"` key used throughout the core.
pub mod trade;

/// Ambient runtime configuration recognized by the core.
pub mod config;

pub mod error;

/// Wall-clock helpers shared by the scheduling components.
pub mod time;

pub use error::CoreError;
pub use time::now_ms;
pub use trade::{PairKey, Trade};

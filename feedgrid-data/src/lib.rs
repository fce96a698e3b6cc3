#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # feedgrid-data
//! Normalised market data types shared between an exchange adapter and the aggregator core.
//!
//! An exchange adapter is an external collaborator: something that owns a WebSocket connection
//! to a specific venue, authenticates, subscribes to channels and decodes venue-specific frames.
//! This crate does not implement any adapter itself - it defines the [`ExchangeAdapter`] contract
//! an adapter must satisfy, and the normalised [`MarketEvent`] / [`DataKind`] types an adapter
//! produces, so that the rest of the workspace can treat every venue identically.

use crate::event::MarketEvent;
use feedgrid_instrument::exchange::ExchangeId;
use futures::Stream;

/// All [`Error`](std::error::Error)s generated in feedgrid-data.
pub mod error;

/// Defines the generic [`MarketEvent<T>`](event::MarketEvent) produced by every adapter.
pub mod event;

/// [`Streams`](streams::Streams) collection and reconnecting-stream utilities used to consume
/// adapter output.
pub mod streams;

/// Types that communicate the type of data an adapter connection yields.
pub mod subscription;

/// An external source of normalised market data for a single exchange.
///
/// Implementations own the connection lifecycle (connect, authenticate, subscribe, decode) and
/// are expected to yield a continuous [`Stream`] of [`MarketEvent`]s for as long as the
/// connection stays healthy, terminating the stream when it should be reconnected.
pub trait ExchangeAdapter {
    /// Identity of the venue this adapter integrates with.
    const ID: ExchangeId;

    /// Market data item produced for each subscribed instrument.
    type Event: Send;

    /// The `Stream` of [`MarketEvent`]s this adapter produces once connected.
    type MarketStream: Stream<Item = MarketEvent<String, Self::Event>> + Send + Unpin;

    /// Establish the connection and begin streaming normalised market events for the given pairs.
    fn connect(
        &self,
        pairs: &[String],
    ) -> impl std::future::Future<Output = Result<Self::MarketStream, error::DataError>> + Send;
}

use feedgrid_core::broadcast::OutboundFrame;
use serde::Serialize;

/// Envelope sent immediately after a broadcast client connects: the pairs it is subscribed to
/// and the set of exchanges the server currently ingests from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "welcome")]
pub struct WelcomeEnvelope {
    pub pairs: Vec<String>,
    pub exchanges: Vec<String>,
}

/// Lifecycle events mirrored to every connected broadcast client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
pub enum LifecycleEnvelope {
    ExchangeConnected { exchange: String, pair: String },
    ExchangeDisconnected { exchange: String, pair: String },
    ExchangeError { message: String },
}

/// Everything the transport layer may push down a single broadcast client's socket: the
/// one-time welcome envelope, a lifecycle event, or a `[pairKey, trades]` data frame.
///
/// `untagged` so a data frame serialises as the bare two-element array the wire contract
/// promises, rather than being wrapped in an object alongside the lifecycle variants.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Welcome(WelcomeEnvelope),
    Lifecycle(LifecycleEnvelope),
    Data(OutboundFrame),
}

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Liquidation [`SubscriptionKind`] and the associated output data model.
pub mod liquidation;

/// Public trade [`SubscriptionKind`] and the associated output data model.
pub mod trade;

/// Defines the type of a subscription, and the output [`Self::Event`] that it yields.
pub trait SubscriptionKind
where
    Self: Debug + Clone,
{
    type Event: Debug;

    fn as_str(&self) -> &'static str;
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize, Display,
)]
pub enum SubKind {
    PublicTrades,
    Liquidations,
}

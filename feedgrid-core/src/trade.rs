use feedgrid_instrument::Side;
use serde::{ser::SerializeSeq, Deserialize, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Identifies a feed as `"{exchange}:{pair}"`, used throughout the registry, aggregation map and
/// broadcast routing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct PairKey {
    pub exchange: String,
    pub pair: String,
}

impl Display for PairKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.pair)
    }
}

impl PairKey {
    pub fn new(exchange: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            pair: pair.into(),
        }
    }

    pub fn as_string(&self) -> String {
        format!("{}:{}", self.exchange, self.pair)
    }
}

/// Normalised trade record, immutable once received from an exchange adapter.
///
/// Serialises as a positional array `[exchange, timestamp, price, side, size, liquidation]` -
/// the historical query handler relies on `timestamp` sitting at index 1 of that array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trade {
    pub exchange: String,
    pub pair: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub liquidation: bool,
}

impl Trade {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.exchange.clone(), self.pair.clone())
    }
}

impl Serialize for Trade {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(6))?;
        seq.serialize_element(&self.exchange)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.price)?;
        seq.serialize_element(&self.side)?;
        seq.serialize_element(&self.size)?;
        seq.serialize_element(&self.liquidation)?;
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_formats_as_exchange_colon_pair() {
        let key = PairKey::new("binance", "BTCUSDT");
        assert_eq!(key.as_string(), "binance:BTCUSDT");
        assert_eq!(key.to_string(), "binance:BTCUSDT");
    }

    #[test]
    fn trade_serialises_with_timestamp_at_index_one() {
        let trade = Trade {
            exchange: "binance".to_string(),
            pair: "BTCUSDT".to_string(),
            timestamp: 1_700_000_000_000,
            side: Side::Buy,
            price: 100.0,
            size: 2.0,
            liquidation: false,
        };

        let value = serde_json::to_value(&trade).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array[1], serde_json::json!(1_700_000_000_000i64));
    }
}

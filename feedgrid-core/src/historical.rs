use crate::{
    persistence::{FetchOutput, FetchQuery, PersistenceScheduler, StorageError, StorageFormat},
    trade::Trade,
};
use thiserror::Error;

const DEFAULT_TIMEFRAME_MS: i64 = 60_000;

#[derive(Debug, Error, PartialEq)]
pub enum HistoricalQueryError {
    #[error("missing interval")]
    MissingInterval,
    #[error("too many bars: {requested} exceeds the configured maximum of {max}")]
    TooManyBars { requested: i64, max: i64 },
    #[error("storage not configured")]
    StorageAbsent,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for HistoricalQueryError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "format", content = "results", rename_all = "lowercase")]
pub enum HistoricalResponse {
    Trade(Vec<Trade>),
    Point(Vec<crate::persistence::PointRecord>),
}

/// Raw request parameters, prior to validation - mirrors the `:from/:to/:timeframe?/:markets?`
/// path parameters of the exposed HTTP route.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalQuery {
    pub from: i64,
    pub to: i64,
    pub timeframe: Option<i64>,
    pub markets: Vec<String>,
}

/// Serves historical range fetches, merging pluggable storage output with the not-yet-flushed
/// tail of the pending chunk.
#[derive(Debug)]
pub struct HistoricalQueryHandler {
    max_fetch_length: i64,
}

impl HistoricalQueryHandler {
    pub fn new(max_fetch_length: i64) -> Self {
        Self { max_fetch_length }
    }

    pub async fn handle(
        &self,
        mut query: HistoricalQuery,
        scheduler: &PersistenceScheduler,
        pending_tail: &[Trade],
    ) -> Result<HistoricalResponse, HistoricalQueryError> {
        if query.from > query.to {
            std::mem::swap(&mut query.from, &mut query.to);
        }

        let Some(primary_format) = scheduler.primary_format() else {
            return Err(HistoricalQueryError::StorageAbsent);
        };

        if primary_format == StorageFormat::Point {
            let timeframe = query.timeframe.unwrap_or(DEFAULT_TIMEFRAME_MS);
            query.from = (query.from / timeframe) * timeframe;
            query.to = ((query.to + timeframe - 1) / timeframe) * timeframe;

            let length = (query.to - query.from) / timeframe;
            if length > self.max_fetch_length {
                return Err(HistoricalQueryError::TooManyBars {
                    requested: length,
                    max: self.max_fetch_length,
                });
            }
        }

        let output = scheduler
            .fetch_primary(&FetchQuery {
                from: query.from,
                to: query.to,
                timeframe: query.timeframe,
                markets: query.markets,
            })
            .await?;

        match output {
            FetchOutput::Trades(mut trades) => {
                trades.extend(
                    pending_tail
                        .iter()
                        .filter(|trade| trade.timestamp > query.from && trade.timestamp < query.to)
                        .cloned(),
                );
                Ok(HistoricalResponse::Trade(trades))
            }
            FetchOutput::Points(points) => Ok(HistoricalResponse::Point(points)),
            FetchOutput::Empty if primary_format == StorageFormat::Point => {
                Ok(HistoricalResponse::Point(vec![]))
            }
            FetchOutput::Empty => Ok(HistoricalResponse::Trade(
                pending_tail
                    .iter()
                    .filter(|trade| trade.timestamp > query.from && trade.timestamp < query.to)
                    .cloned()
                    .collect(),
            )),
        }
    }
}

pub fn parse_from_to(from: &str, to: &str) -> Result<(i64, i64), HistoricalQueryError> {
    let from = from.parse().map_err(|_| HistoricalQueryError::MissingInterval)?;
    let to = to.parse().map_err(|_| HistoricalQueryError::MissingInterval)?;
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FetchQuery as PFetchQuery, Storage};
    use async_trait::async_trait;
    use feedgrid_instrument::Side;

    fn trade(exchange: &str, pair: &str, timestamp: i64) -> Trade {
        Trade {
            exchange: exchange.to_string(),
            pair: pair.to_string(),
            timestamp,
            side: Side::Buy,
            price: 1.0,
            size: 1.0,
            liquidation: false,
        }
    }

    struct MockTradeStorage {
        results: Vec<Trade>,
    }

    #[async_trait]
    impl Storage for MockTradeStorage {
        fn name(&self) -> &str {
            "mock"
        }

        fn format(&self) -> StorageFormat {
            StorageFormat::Trade
        }

        async fn save(&self, _batch: &[Trade], _is_exit_flush: bool) -> Result<(), StorageError> {
            Ok(())
        }

        async fn fetch(&self, _query: &PFetchQuery) -> Result<FetchOutput, StorageError> {
            Ok(FetchOutput::Trades(self.results.clone()))
        }
    }

    #[tokio::test]
    async fn merges_storage_output_with_strictly_interior_tail_trades() {
        // S5: storage returns A@100, B@200; live chunk has C@150, D@300; query from=50,to=250
        // expected: A, B, C present; D absent (300 >= 250)
        let scheduler = PersistenceScheduler::new(
            vec![Box::new(MockTradeStorage {
                results: vec![trade("X", "A", 100), trade("X", "B", 200)],
            })],
            10_000,
        );

        let handler = HistoricalQueryHandler::new(1_000);
        let tail = vec![trade("X", "C", 150), trade("X", "D", 300)];

        let response = handler
            .handle(
                HistoricalQuery {
                    from: 50,
                    to: 250,
                    timeframe: None,
                    markets: vec![],
                },
                &scheduler,
                &tail,
            )
            .await
            .unwrap();

        let HistoricalResponse::Trade(trades) = response else {
            panic!("expected trade-format response");
        };

        let pairs: Vec<&str> = trades.iter().map(|trade| trade.pair.as_str()).collect();
        assert!(pairs.contains(&"A"));
        assert!(pairs.contains(&"B"));
        assert!(pairs.contains(&"C"));
        assert!(!pairs.contains(&"D"));
    }

    struct MockPointStorage;

    #[async_trait]
    impl Storage for MockPointStorage {
        fn name(&self) -> &str {
            "mock-point"
        }

        fn format(&self) -> StorageFormat {
            StorageFormat::Point
        }

        async fn save(&self, _batch: &[Trade], _is_exit_flush: bool) -> Result<(), StorageError> {
            Ok(())
        }

        async fn fetch(&self, _query: &PFetchQuery) -> Result<FetchOutput, StorageError> {
            Ok(FetchOutput::Empty)
        }
    }

    #[tokio::test]
    async fn empty_point_format_fetch_yields_an_empty_point_response_not_a_trade_tail() {
        let scheduler = PersistenceScheduler::new(vec![Box::new(MockPointStorage)], 10_000);
        let handler = HistoricalQueryHandler::new(1_000);

        let response = handler
            .handle(
                HistoricalQuery {
                    from: 0,
                    to: 60_000,
                    timeframe: None,
                    markets: vec![],
                },
                &scheduler,
                &[trade("X", "C", 150)],
            )
            .await
            .unwrap();

        assert_eq!(response, HistoricalResponse::Point(vec![]));
    }

    #[tokio::test]
    async fn swaps_inverted_from_and_to() {
        let scheduler = PersistenceScheduler::new(
            vec![Box::new(MockTradeStorage { results: vec![] })],
            10_000,
        );
        let handler = HistoricalQueryHandler::new(1_000);

        let response = handler
            .handle(
                HistoricalQuery {
                    from: 250,
                    to: 50,
                    timeframe: None,
                    markets: vec![],
                },
                &scheduler,
                &[trade("X", "C", 150)],
            )
            .await
            .unwrap();

        let HistoricalResponse::Trade(trades) = response else {
            panic!("expected trade-format response");
        };
        assert_eq!(trades.len(), 1);
    }
}

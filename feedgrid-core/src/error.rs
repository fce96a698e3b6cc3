use crate::{historical::HistoricalQueryError, persistence::StorageError};
use thiserror::Error;

/// Top-level errors surfaced by the core to its callers (the HTTP/WebSocket transport, adapter
/// wiring). Transient ingest drops and registry inconsistencies never reach this type - they are
/// locally recovered and only logged, per the propagation policy.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Query(#[from] HistoricalQueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

//! Error types for the MES server

use thiserror::Error;

/// Result type for MES operations
pub type MesResult<T> = Result<T, MesError>;

/// Error taxonomy for the MES server.
///
/// Only `Config` is fatal, and only at startup. Everything else is
/// recoverable: the dispatcher logs and degrades to a default release
/// decision.
#[derive(Error, Debug)]
pub enum MesError {
    /// Malformed or incomplete configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Station id not present in the graph
    #[error("Station {0} not found")]
    UnknownStation(u32),

    /// No transfer arc between the given stations
    #[error("Transfer {0} -> {1} not found")]
    UnknownTransfer(u32, u32),

    /// Order id not present in the pool
    #[error("Order {0} not found")]
    UnknownOrder(u32),

    /// No station advertises the required process capability
    #[error("No station can execute process {0}")]
    NoCapableStation(u8),

    /// No path exists between the given stations
    #[error("No path from station {from} to station {to}")]
    Unreachable { from: u32, to: u32 },

    /// Executed process steps diverge from the product plan
    #[error("Executed steps of order {0} diverge from the product plan")]
    PlanDiverged(u32),

    /// Product plan has no process steps
    #[error("Product plan has no process steps")]
    EmptyPlan,

    /// Malformed or unexpected wire message
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

use thiserror::Error;

/// Failure taxonomy for every engine operation. Infrastructure faults are
/// separated from domain failures so the facade can map them without
/// inspecting messages.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("insufficient stock on listing {listing_id}: requested {requested}, available {available}")]
    InsufficientStock {
        listing_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("booking {booking_id}: cannot {operation} in state {state}")]
    InvalidStateTransition {
        booking_id: i64,
        operation: &'static str,
        state: &'static str,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("actor {actor} is not permitted to {action}")]
    Unauthorized { actor: i64, action: &'static str },

    #[error("invoice for booking {booking_id} is not yet available")]
    InvoiceNotReady { booking_id: i64 },

    #[error("invalid quantity: {reason}")]
    InvalidQuantity { reason: String },

    /// A stored value that cannot be interpreted. There is no safe default
    /// to substitute, so the operation aborts.
    #[error("data integrity error: {0}")]
    Data(String),

    #[error("storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

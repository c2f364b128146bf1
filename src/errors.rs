use serde::Serialize;
use uuid::Uuid;

/// Domain error taxonomy for the checkout and payment core.
///
/// Every variant carries a human-readable message; [`ServiceError::kind`]
/// exposes the stable machine-readable code callers branch on. Raw
/// persistence errors are wrapped in `DatabaseError` and never surfaced
/// as domain errors themselves.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("Checkout attempted with an empty cart")]
    EmptyCart,

    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: Uuid, requested: i32 },

    #[error("Invalid voucher: {0}")]
    InvalidVoucher(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Invalid payment callback: {0}")]
    InvalidCallback(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl ServiceError {
    /// Stable machine-readable error code, suitable for API payloads and
    /// client branching. Messages may change; these strings may not.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::InvalidOperation(_) => "invalid_operation",
            ServiceError::InvalidStatus(_) => "invalid_status",
            ServiceError::EmptyCart => "empty_cart",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::InvalidVoucher(_) => "invalid_voucher",
            ServiceError::PaymentFailed(_) => "payment_failed",
            ServiceError::InvalidCallback(_) => "invalid_callback",
            ServiceError::InternalError(_) => "internal_error",
            ServiceError::Other(_) => "internal_error",
        }
    }

    /// Whether the caller can recover by adjusting the request
    /// (as opposed to an infrastructure fault).
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::EmptyCart
                | ServiceError::InsufficientStock { .. }
                | ServiceError::InvalidVoucher(_)
                | ServiceError::PaymentFailed(_)
                | ServiceError::ValidationError(_)
                | ServiceError::InvalidOperation(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

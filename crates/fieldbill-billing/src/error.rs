use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Requested {requested_days} days exceeds the maximum rental of {max_days} days")]
    RateExceeded { requested_days: u32, max_days: u32 },

    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    InvalidDiscount { subtotal: Decimal, discount: Decimal },

    #[error("Sequence collision in scope {scope}: {reason}")]
    SequenceCollision { scope: String, reason: String },

    #[error("Invoice {invoice_id} changed since it was read (expected version {expected_version}, found {actual_version})")]
    StaleInvoiceState {
        invoice_id: String,
        expected_version: u64,
        actual_version: u64,
    },

    #[error("Validation error on {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Invalid rate table: {reason}")]
    InvalidRateTable { reason: String },

    #[error("Rate table is not in effect on {date}")]
    RateTableNotEffective { date: chrono::NaiveDate },

    #[error("Rate table not found: {name}")]
    RateTableNotFound { name: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invoice not found: {id}")]
    InvoiceNotFound { id: String },

    #[error("Database error during {operation}: {source}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl BillingError {
    /// Whether the caller may re-read its inputs and try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::StaleInvoiceState { .. })
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        BillingError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

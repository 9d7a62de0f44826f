//! Error types for the campus library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    DbFailure = 3,
    NotFound = 5,
    BookUnavailable = 7,
    Duplicate = 8,
    BorrowLimitExceeded = 11,
    DuplicateLoan = 13,
    BadValue = 18,
    OutstandingFine = 22,
    NotActive = 23,
    AlreadyOverdue = 24,
    RenewalLimitReached = 25,
    AlreadyReserved = 26,
    NotPending = 27,
    NothingDue = 28,
    ProcessorDeclined = 29,
    AccountInactive = 30,
    AmountMismatch = 31,
    Integrity = 32,
}

/// Business-rule refusals raised by the ledger, reservation queue and
/// subscription bookkeeping. Each variant is caller-correctable and never
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Book has no available copies")]
    BookUnavailable,

    #[error("User already has this book on loan")]
    DuplicateLoan,

    #[error("Borrow limit reached ({current}/{max})")]
    BorrowLimitExceeded { current: i64, max: i32 },

    #[error("Outstanding unpaid fine of {amount}")]
    OutstandingFine { amount: Decimal },

    #[error("Borrowing is not active")]
    NotActive,

    #[error("Loan is overdue and cannot be renewed")]
    AlreadyOverdue,

    #[error("Renewal limit reached ({current}/{max})")]
    RenewalLimitReached { current: i32, max: i32 },

    #[error("User already has a pending reservation for this book")]
    AlreadyReserved,

    #[error("Reservation is not pending")]
    NotPending,

    #[error("No fine is due")]
    NothingDue,

    #[error("Payment declined: {0}")]
    ProcessorDeclined(String),

    #[error("User account is suspended")]
    AccountInactive,

    #[error("Payment amount {offered} does not match amount due {due}")]
    AmountMismatch { due: Decimal, offered: Decimal },
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::BookUnavailable => ErrorCode::BookUnavailable,
            LedgerError::DuplicateLoan => ErrorCode::DuplicateLoan,
            LedgerError::BorrowLimitExceeded { .. } => ErrorCode::BorrowLimitExceeded,
            LedgerError::OutstandingFine { .. } => ErrorCode::OutstandingFine,
            LedgerError::NotActive => ErrorCode::NotActive,
            LedgerError::AlreadyOverdue => ErrorCode::AlreadyOverdue,
            LedgerError::RenewalLimitReached { .. } => ErrorCode::RenewalLimitReached,
            LedgerError::AlreadyReserved => ErrorCode::AlreadyReserved,
            LedgerError::NotPending => ErrorCode::NotPending,
            LedgerError::NothingDue => ErrorCode::NothingDue,
            LedgerError::ProcessorDeclined(_) => ErrorCode::ProcessorDeclined,
            LedgerError::AccountInactive => ErrorCode::AccountInactive,
            LedgerError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LedgerError::ProcessorDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            LedgerError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            LedgerError::AccountInactive => StatusCode::FORBIDDEN,
            _ => StatusCode::CONFLICT,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl AppError {
    /// Returns the business refusal carried by this error, if any
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            AppError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Ledger(e) => (e.status(), e.code(), e.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::Integrity(msg) => {
                tracing::error!("Integrity violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Integrity,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

/// True when the database rejected a write because of a unique index
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// True when the database rejected a write because of a CHECK constraint
pub(crate) fn is_check_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23514"))
}

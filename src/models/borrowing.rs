//! Borrowing (loan) model, loan policy and fine arithmetic

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::{config::LibraryConfig, error::LedgerError};

use super::{reservation::Reservation, subscription::SubscriptionPlan, user::OutstandingFine};

/// Loan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "borrowing_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Borrowed,
    Returned,
    Cancelled,
    Lost,
}

/// Loan record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub renewed_count: i32,
    /// Persisted fine snapshot; only meaningful once the loan is closed or
    /// the fine has been paid
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    /// Total collected so far for this loan
    pub fine_paid_amount: Decimal,
    pub status: BorrowingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Whole days elapsed past the due date, never negative
pub fn days_overdue(due_date: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    (as_of - due_date).num_days().max(0)
}

/// Fine accrued by a loan. `end` is the return date for closed loans and
/// "now" for open ones.
pub fn accrued_fine(
    due_date: DateTime<Utc>,
    status: BorrowingStatus,
    end: DateTime<Utc>,
    rate_per_day: Decimal,
) -> Decimal {
    match status {
        BorrowingStatus::Cancelled => Decimal::ZERO,
        _ => Decimal::from(days_overdue(due_date, end)) * rate_per_day,
    }
}

impl Borrowing {
    pub fn is_active(&self) -> bool {
        self.status == BorrowingStatus::Borrowed
    }

    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        self.is_active() && as_of > self.due_date
    }

    /// Fine as of `as_of`: computed while the loan is open, the persisted
    /// snapshot afterwards
    pub fn current_fine(&self, as_of: DateTime<Utc>, rate_per_day: Decimal) -> Decimal {
        if self.is_active() {
            accrued_fine(self.due_date, self.status, as_of, rate_per_day)
        } else {
            self.fine_amount
        }
    }

    /// Unpaid part of the fine as of `as_of`. A payment on an open loan
    /// settles the fine accrued so far; later days are owed again.
    pub fn amount_due(&self, as_of: DateTime<Utc>, rate_per_day: Decimal) -> Decimal {
        (self.current_fine(as_of, rate_per_day) - self.fine_paid_amount).max(Decimal::ZERO)
    }

    /// The unpaid fine of this loan, if any
    pub fn outstanding(&self, as_of: DateTime<Utc>, rate_per_day: Decimal) -> Option<OutstandingFine> {
        let amount = self.amount_due(as_of, rate_per_day);
        if amount <= Decimal::ZERO {
            return None;
        }
        let end = self.return_date.unwrap_or(as_of);
        Some(OutstandingFine {
            borrowing_id: self.id,
            book_id: self.book_id,
            days_overdue: days_overdue(self.due_date, end),
            amount,
            accruing: self.is_active(),
        })
    }

    /// Checks renewal eligibility, reporting the specific refusal
    pub fn check_renewal(&self, as_of: DateTime<Utc>, max_renewals: i32) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::NotActive);
        }
        if self.is_overdue(as_of) {
            return Err(LedgerError::AlreadyOverdue);
        }
        if self.renewed_count >= max_renewals {
            return Err(LedgerError::RenewalLimitReached {
                current: self.renewed_count,
                max: max_renewals,
            });
        }
        Ok(())
    }

    /// Due date after one renewal; extends from the current due date
    pub fn renewed_due_date(&self, extension_days: i64) -> DateTime<Utc> {
        self.due_date + Duration::days(extension_days)
    }
}

/// Effective lending rules for one user at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LoanPolicy {
    pub loan_period_days: i64,
    pub max_books: i32,
    pub max_renewals: i32,
    pub renewal_days: i64,
    pub fine_per_day: Decimal,
    pub hold_days: i64,
    pub block_on_outstanding_fine: bool,
    pub fee_waiver: bool,
}

impl LoanPolicy {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            loan_period_days: config.loan_period_days,
            max_books: config.max_books_per_user,
            max_renewals: config.max_renewals,
            renewal_days: config.renewal_days,
            fine_per_day: config.fine_per_day,
            hold_days: config.reservation_hold_days,
            block_on_outstanding_fine: config.block_borrow_on_outstanding_fine,
            fee_waiver: false,
        }
    }

    /// Applies the overrides carried by a subscription plan
    pub fn with_plan(mut self, plan: &SubscriptionPlan) -> Self {
        self.max_books = plan.max_books;
        self.max_renewals = plan.max_renewals;
        self.fee_waiver = plan.no_late_fees;
        self
    }

    /// Daily fine rate after waivers
    pub fn fine_rate(&self) -> Decimal {
        if self.fee_waiver {
            Decimal::ZERO
        } else {
            self.fine_per_day
        }
    }

    pub fn due_date_from(&self, borrow_date: DateTime<Utc>) -> DateTime<Utc> {
        borrow_date + Duration::days(self.loan_period_days)
    }
}

/// Facts gathered under lock before a borrow is allowed
#[derive(Debug, Clone)]
pub struct BorrowEligibility {
    pub user_active: bool,
    pub available_copies: i32,
    pub holds_active_loan: bool,
    pub active_loans: i64,
    pub outstanding_fine: Decimal,
}

impl BorrowEligibility {
    /// First failing precondition wins
    pub fn check(&self, policy: &LoanPolicy) -> Result<(), LedgerError> {
        if !self.user_active {
            return Err(LedgerError::AccountInactive);
        }
        if self.available_copies <= 0 {
            return Err(LedgerError::BookUnavailable);
        }
        if self.holds_active_loan {
            return Err(LedgerError::DuplicateLoan);
        }
        if self.active_loans >= i64::from(policy.max_books) {
            return Err(LedgerError::BorrowLimitExceeded {
                current: self.active_loans,
                max: policy.max_books,
            });
        }
        if policy.block_on_outstanding_fine
            && !policy.fee_waiver
            && self.outstanding_fine > Decimal::ZERO
        {
            return Err(LedgerError::OutstandingFine {
                amount: self.outstanding_fine,
            });
        }
        Ok(())
    }
}

/// Result of a return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub borrowing: Borrowing,
    pub fine: Decimal,
    /// Reservation promoted to `fulfilled` by this return, if any
    pub reservation_fulfilled: Option<Reservation>,
}

/// Result of a renewal
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RenewOutcome {
    pub borrowing_id: i32,
    pub new_due_date: DateTime<Utc>,
    pub renewed_count: i32,
}

/// Borrowing joined with the title it refers to
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub borrowing: Borrowing,
    pub book_title: String,
    pub book_isbn: String,
}

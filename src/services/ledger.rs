//! Borrowing ledger: borrow, return, renew and fine payment
//!
//! Each mutation runs in one transaction. Rows are locked in a fixed order
//! (user, borrowing, book, reservations) and collaborators are only called
//! once no lock is held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, LedgerError},
    models::{
        borrowing::{accrued_fine, BorrowEligibility, Borrowing, BorrowingStatus, RenewOutcome, ReturnOutcome},
        notification::LedgerEvent,
        payment::{FineReceipt, FineSettlement, PaymentMethod, PaymentPurpose, PaymentStatus},
    },
    repository::Repository,
};

use super::{
    notifier::Notifier,
    payment::{charge_or_decline, ChargeRequest, PaymentProcessor},
    reservations::ReservationService,
    subscriptions::SubscriptionService,
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
    subscriptions: SubscriptionService,
    reservations: ReservationService,
    processor: Arc<dyn PaymentProcessor>,
    notifier: Notifier,
    currency: String,
}

impl LedgerService {
    pub fn new(
        repository: Repository,
        subscriptions: SubscriptionService,
        reservations: ReservationService,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Notifier,
        currency: String,
    ) -> Self {
        Self {
            repository,
            subscriptions,
            reservations,
            processor,
            notifier,
            currency,
        }
    }

    pub async fn get(&self, borrowing_id: i32) -> AppResult<Borrowing> {
        self.repository.borrowings.get_by_id(borrowing_id).await
    }

    /// Lend one copy of a book to a user
    pub async fn borrow(
        &self,
        user_id: i32,
        book_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Borrowing> {
        let mut tx = self.repository.begin().await?;

        let user = self.repository.users.lock(&mut tx, user_id).await?;
        let policy = self.subscriptions.policy_in(&mut tx, user_id, as_of).await?;
        let book = self.repository.books.lock(&mut tx, book_id).await?;

        // Copies held for other members are not on the shelf
        let held_for_others = self
            .repository
            .reservations
            .count_open_holds(&mut tx, book_id, as_of, Some(user_id))
            .await?;
        let available_copies = if book.is_active {
            (i64::from(book.available_copies) - held_for_others).max(0) as i32
        } else {
            0
        };

        let outstanding_fine: Decimal = self
            .repository
            .borrowings
            .with_unpaid_fines(&mut tx, user_id, as_of)
            .await?
            .iter()
            .map(|b| b.amount_due(as_of, policy.fine_rate()))
            .sum();

        let eligibility = BorrowEligibility {
            user_active: user.is_active,
            available_copies,
            holds_active_loan: self
                .repository
                .borrowings
                .has_active(&mut tx, user_id, book_id)
                .await?,
            active_loans: self.repository.borrowings.count_active(&mut tx, user_id).await?,
            outstanding_fine,
        };
        eligibility.check(&policy)?;

        if !self
            .repository
            .books
            .decrement_available(&mut tx, book_id)
            .await?
        {
            return Err(LedgerError::BookUnavailable.into());
        }
        let borrowing = self
            .repository
            .borrowings
            .insert(&mut tx, user_id, book_id, as_of, policy.due_date_from(as_of))
            .await?;
        let claimed = self
            .repository
            .reservations
            .claim_hold(&mut tx, user_id, book_id, as_of)
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id = borrowing.id,
            user_id,
            book_id,
            due_date = %borrowing.due_date,
            claimed_hold = claimed > 0,
            "Book borrowed"
        );

        self.notifier
            .emit(
                user_id,
                LedgerEvent::LoanCreated {
                    borrowing_id: borrowing.id,
                    book_id,
                    due_date: borrowing.due_date,
                },
            )
            .await;

        Ok(borrowing)
    }

    /// Close a loan, snapshot its fine and hand the copy to the queue
    pub async fn return_book(
        &self,
        borrowing_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<ReturnOutcome> {
        let mut tx = self.repository.begin().await?;

        let borrowing = self.repository.borrowings.lock(&mut tx, borrowing_id).await?;
        if !borrowing.is_active() {
            return Err(LedgerError::NotActive.into());
        }
        let policy = self
            .subscriptions
            .policy_in(&mut tx, borrowing.user_id, as_of)
            .await?;
        let fine = accrued_fine(
            borrowing.due_date,
            BorrowingStatus::Returned,
            as_of,
            policy.fine_rate(),
        );

        let borrowing = self
            .repository
            .borrowings
            .close(&mut tx, borrowing_id, BorrowingStatus::Returned, as_of, fine)
            .await?;
        self.repository
            .books
            .increment_available(&mut tx, borrowing.book_id)
            .await?;
        let reservation_fulfilled = self
            .reservations
            .hand_off(&mut tx, borrowing.book_id, as_of)
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            user_id = borrowing.user_id,
            book_id = borrowing.book_id,
            fine = %fine,
            reservation_id = ?reservation_fulfilled.as_ref().map(|r| r.id),
            "Book returned"
        );

        self.notifier
            .emit(
                borrowing.user_id,
                LedgerEvent::Returned {
                    borrowing_id,
                    book_id: borrowing.book_id,
                    fine,
                },
            )
            .await;
        if let Some(reservation) = &reservation_fulfilled {
            self.reservations.announce(reservation).await;
        }

        Ok(ReturnOutcome {
            borrowing,
            fine,
            reservation_fulfilled,
        })
    }

    /// Void an open loan. No fine is charged; the copy goes back on the
    /// shelf or to the head of the queue.
    pub async fn cancel(&self, borrowing_id: i32, as_of: DateTime<Utc>) -> AppResult<Borrowing> {
        let mut tx = self.repository.begin().await?;

        let borrowing = self.repository.borrowings.lock(&mut tx, borrowing_id).await?;
        if !borrowing.is_active() {
            return Err(LedgerError::NotActive.into());
        }
        let fine = accrued_fine(
            borrowing.due_date,
            BorrowingStatus::Cancelled,
            as_of,
            Decimal::ZERO,
        );

        let borrowing = self
            .repository
            .borrowings
            .close(&mut tx, borrowing_id, BorrowingStatus::Cancelled, as_of, fine)
            .await?;
        self.repository
            .books
            .increment_available(&mut tx, borrowing.book_id)
            .await?;
        let reservation_fulfilled = self
            .reservations
            .hand_off(&mut tx, borrowing.book_id, as_of)
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            user_id = borrowing.user_id,
            book_id = borrowing.book_id,
            reservation_id = ?reservation_fulfilled.as_ref().map(|r| r.id),
            "Loan cancelled"
        );

        self.notifier
            .emit(
                borrowing.user_id,
                LedgerEvent::Cancelled {
                    borrowing_id,
                    book_id: borrowing.book_id,
                },
            )
            .await;
        if let Some(reservation) = &reservation_fulfilled {
            self.reservations.announce(reservation).await;
        }

        Ok(borrowing)
    }

    /// Extend an open loan from its current due date
    pub async fn renew(&self, borrowing_id: i32, as_of: DateTime<Utc>) -> AppResult<RenewOutcome> {
        let mut tx = self.repository.begin().await?;

        let borrowing = self.repository.borrowings.lock(&mut tx, borrowing_id).await?;
        let policy = self
            .subscriptions
            .policy_in(&mut tx, borrowing.user_id, as_of)
            .await?;
        borrowing.check_renewal(as_of, policy.max_renewals)?;

        let renewed = self
            .repository
            .borrowings
            .renew(
                &mut tx,
                borrowing_id,
                borrowing.renewed_due_date(policy.renewal_days),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            user_id = renewed.user_id,
            new_due_date = %renewed.due_date,
            renewed_count = renewed.renewed_count,
            "Loan renewed"
        );

        self.notifier
            .emit(
                renewed.user_id,
                LedgerEvent::Renewed {
                    borrowing_id,
                    book_id: renewed.book_id,
                    new_due_date: renewed.due_date,
                    renewed_count: renewed.renewed_count,
                },
            )
            .await;

        Ok(RenewOutcome {
            borrowing_id,
            new_due_date: renewed.due_date,
            renewed_count: renewed.renewed_count,
        })
    }

    /// Pay what a loan owes as of `as_of`. When `amount` is given it must
    /// match the amount due exactly.
    ///
    /// The charge happens between two short database steps: a pending
    /// payment record before it, and one transaction applying it after. If
    /// another payment settled the fine in between, this charge is refunded
    /// and `NothingDue` is returned.
    pub async fn pay_fine(
        &self,
        borrowing_id: i32,
        amount: Option<Decimal>,
        method: PaymentMethod,
        as_of: DateTime<Utc>,
    ) -> AppResult<FineReceipt> {
        let borrowing = self.repository.borrowings.get_by_id(borrowing_id).await?;
        let policy = self
            .subscriptions
            .policy_for(borrowing.user_id, as_of)
            .await?;
        let rate = policy.fine_rate();

        let due = borrowing.amount_due(as_of, rate);
        if due <= Decimal::ZERO {
            return Err(LedgerError::NothingDue.into());
        }
        if let Some(offered) = amount {
            if offered != due {
                return Err(LedgerError::AmountMismatch { due, offered }.into());
            }
        }

        let transaction_id = Uuid::new_v4().to_string();
        self.repository
            .payments
            .insert_pending(
                borrowing.user_id,
                &transaction_id,
                due,
                &self.currency,
                method.as_str(),
                PaymentPurpose::Fine,
                borrowing_id,
            )
            .await?;

        let request = ChargeRequest {
            transaction_id: transaction_id.clone(),
            user_id: borrowing.user_id,
            amount: due,
            currency: self.currency.clone(),
            purpose: PaymentPurpose::Fine,
            reference_id: borrowing_id,
            method,
        };
        let outcome = match charge_or_decline(self.processor.as_ref(), &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.repository
                    .payments
                    .set_status(&transaction_id, PaymentStatus::Failed, None)
                    .await?;
                return Err(e);
            }
        };

        let mut tx = self.repository.begin().await?;
        let locked = self.repository.borrowings.lock(&mut tx, borrowing_id).await?;
        let applied = if locked.amount_due(as_of, rate) < due {
            None
        } else {
            self.repository
                .borrowings
                .mark_fine_paid(
                    &mut tx,
                    borrowing_id,
                    locked.current_fine(as_of, rate),
                    due,
                    borrowing.fine_paid_amount,
                )
                .await?
        };

        if applied.is_none() {
            drop(tx);
            self.refund_unapplied(&transaction_id, due).await?;
            return Err(LedgerError::NothingDue.into());
        }

        self.repository
            .payments
            .set_status_in(
                &mut tx,
                &transaction_id,
                PaymentStatus::Success,
                outcome.gateway_reference.as_deref(),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            user_id = borrowing.user_id,
            amount = %due,
            transaction_id = %transaction_id,
            "Fine paid"
        );

        self.notifier
            .emit(
                borrowing.user_id,
                LedgerEvent::FinePaid {
                    borrowing_id,
                    amount: due,
                    transaction_id: transaction_id.clone(),
                },
            )
            .await;

        Ok(FineReceipt {
            borrowing_id,
            transaction_id,
            amount: due,
            method,
            paid_at: as_of,
        })
    }

    /// A charge that lost the race to another payment goes back to the payer
    async fn refund_unapplied(&self, transaction_id: &str, amount: Decimal) -> AppResult<()> {
        tracing::warn!(transaction_id, "Fine already settled, refunding charge");
        match self.processor.refund(transaction_id, Some(amount)).await {
            Ok(status) => {
                self.repository
                    .payments
                    .set_status(transaction_id, status, None)
                    .await
            }
            Err(e) => {
                // Left as pending for manual reconciliation
                tracing::error!(transaction_id, error = %e, "Refund failed");
                Ok(())
            }
        }
    }

    /// Pay every outstanding fine of a user, oldest due date first
    pub async fn pay_all_fines(
        &self,
        user_id: i32,
        method: PaymentMethod,
        as_of: DateTime<Utc>,
    ) -> AppResult<FineSettlement> {
        self.repository.users.get_by_id(user_id).await?;
        let borrowings = {
            let mut conn = self.repository.pool.acquire().await?;
            self.repository
                .borrowings
                .with_unpaid_fines(&mut conn, user_id, as_of)
                .await?
        };

        let mut receipts = Vec::new();
        let mut declined = None;
        for borrowing in borrowings {
            match self.pay_fine(borrowing.id, None, method, as_of).await {
                Ok(receipt) => receipts.push(receipt),
                Err(AppError::Ledger(LedgerError::NothingDue)) => continue,
                Err(AppError::Ledger(LedgerError::ProcessorDeclined(reason))) => {
                    if receipts.is_empty() {
                        return Err(LedgerError::ProcessorDeclined(reason).into());
                    }
                    declined = Some(reason);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if receipts.is_empty() {
            return Err(LedgerError::NothingDue.into());
        }
        let total_paid = receipts.iter().map(|r| r.amount).sum();
        Ok(FineSettlement {
            receipts,
            total_paid,
            declined,
        })
    }
}

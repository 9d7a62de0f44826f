//! Reservation queue: FIFO holds per book and the hand-off of free copies

use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppResult, LedgerError},
    models::{
        notification::LedgerEvent,
        reservation::{next_in_line, ExpiryReport, Reservation},
    },
    repository::Repository,
};

use super::notifier::Notifier;

#[derive(Clone)]
pub struct ReservationService {
    repository: Repository,
    notifier: Notifier,
    hold_days: i64,
}

impl ReservationService {
    pub fn new(repository: Repository, notifier: Notifier, hold_days: i64) -> Self {
        Self {
            repository,
            notifier,
            hold_days,
        }
    }

    /// Queue a request for a book
    pub async fn reserve(
        &self,
        user_id: i32,
        book_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let mut tx = self.repository.begin().await?;

        let user = self.repository.users.lock(&mut tx, user_id).await?;
        if !user.is_active {
            return Err(LedgerError::AccountInactive.into());
        }
        let book = self.repository.books.get_by_id(book_id).await?;
        if !book.is_active {
            return Err(LedgerError::BookUnavailable.into());
        }
        if self
            .repository
            .reservations
            .has_pending(&mut tx, user_id, book_id)
            .await?
        {
            return Err(LedgerError::AlreadyReserved.into());
        }

        let reservation = self
            .repository
            .reservations
            .insert(&mut tx, user_id, book_id, as_of)
            .await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            user_id,
            book_id,
            "Reservation queued"
        );
        Ok(reservation)
    }

    pub async fn cancel(&self, reservation_id: i32) -> AppResult<Reservation> {
        let mut tx = self.repository.begin().await?;
        let reservation = self
            .repository
            .reservations
            .lock(&mut tx, reservation_id)
            .await?;
        reservation.check_cancellable()?;
        let reservation = self
            .repository
            .reservations
            .cancel(&mut tx, reservation_id)
            .await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id,
            user_id = reservation.user_id,
            book_id = reservation.book_id,
            "Reservation cancelled"
        );
        Ok(reservation)
    }

    pub async fn get(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.repository.reservations.get_by_id(reservation_id).await
    }

    /// Pending queue of a book, first in line first
    pub async fn queue(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reservations.pending_for_book(book_id).await
    }

    /// Who gets the next free copy of a book. Read only.
    pub async fn next_pending(&self, book_id: i32) -> AppResult<Option<Reservation>> {
        let queue = self.repository.reservations.pending_for_book(book_id).await?;
        Ok(next_in_line(&queue).cloned())
    }

    /// Promote the next pending request if a copy is free for it. A copy is
    /// free while available copies outnumber the open holds on the book.
    /// Runs inside the caller's transaction, which must not hold locks on
    /// this book's reservations before the book row.
    pub async fn hand_off(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let book = self.repository.books.lock(conn, book_id).await?;
        if !book.is_active {
            return Ok(None);
        }
        let holds = self
            .repository
            .reservations
            .count_open_holds(conn, book_id, as_of, None)
            .await?;
        if i64::from(book.available_copies) <= holds {
            return Ok(None);
        }

        let Some(next) = self.repository.reservations.next_pending(conn, book_id).await? else {
            return Ok(None);
        };
        let fulfilled = self
            .repository
            .reservations
            .fulfill(conn, next.id, as_of + Duration::days(self.hold_days))
            .await?;
        Ok(Some(fulfilled))
    }

    /// Tell the holder their copy is waiting
    pub async fn announce(&self, reservation: &Reservation) {
        let Some(expiry_date) = reservation.expiry_date else {
            return;
        };
        self.notifier
            .emit(
                reservation.user_id,
                LedgerEvent::BookAvailable {
                    reservation_id: reservation.id,
                    book_id: reservation.book_id,
                    expiry_date,
                },
            )
            .await;
    }

    /// Expire unclaimed holds past their window and pass each freed copy to
    /// the next pending request. Safe to run concurrently with itself and
    /// with ledger traffic; a second run with nothing new is a no-op.
    pub async fn expire_stale(&self, as_of: DateTime<Utc>) -> AppResult<ExpiryReport> {
        let mut report = ExpiryReport::default();

        for book_id in self.repository.reservations.lapsed_hold_books(as_of).await? {
            let mut tx = self.repository.begin().await?;
            self.repository.books.lock(&mut tx, book_id).await?;

            let lapsed = self
                .repository
                .reservations
                .lock_lapsed_holds(&mut tx, book_id, as_of)
                .await?;
            let mut expired = 0;
            for reservation in &lapsed {
                if self.repository.reservations.expire(&mut tx, reservation.id).await? {
                    expired += 1;
                }
            }
            if expired == 0 {
                continue;
            }

            let mut handoffs = Vec::new();
            while let Some(reservation) = self.hand_off(&mut tx, book_id, as_of).await? {
                handoffs.push(reservation);
            }
            tx.commit().await?;

            tracing::info!(
                book_id,
                expired,
                handed_off = handoffs.len(),
                "Lapsed holds expired"
            );
            report.expired_count += expired;
            for reservation in &handoffs {
                self.announce(reservation).await;
            }
            report.fulfilled_handoffs.extend(handoffs);
        }

        Ok(report)
    }
}

//! Reservation queue storage

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{is_unique_violation, AppError, AppResult, LedgerError},
    models::reservation::Reservation,
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Reservations of a user, newest first
    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    /// Pending queue of a book in hand-off order
    pub async fn pending_for_book(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    pub async fn has_pending(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        created_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, book_id, created_at, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyReserved.into()
            } else {
                e.into()
            }
        })
    }

    /// First pending reservation for a book: oldest, then lowest id
    pub async fn next_pending(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(reservation)
    }

    /// Unclaimed fulfilled holds still inside their window, optionally
    /// leaving out the holds of one user
    pub async fn count_open_holds(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        as_of: DateTime<Utc>,
        except_user: Option<i32>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE book_id = $1
              AND status = 'fulfilled'
              AND claimed_at IS NULL
              AND expiry_date >= $2
              AND ($3::int IS NULL OR user_id <> $3)
            "#,
        )
        .bind(book_id)
        .bind(as_of)
        .bind(except_user)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    pub async fn fulfill(
        &self,
        conn: &mut PgConnection,
        id: i32,
        expiry_date: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = 'fulfilled', expiry_date = $2, notified = TRUE
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expiry_date)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::NotPending.into())
    }

    pub async fn cancel(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET status = 'cancelled'
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::NotPending.into())
    }

    /// Mark the borrower's open reservation on a book as used. A pending
    /// request is closed too, since the borrower no longer waits for a copy.
    pub async fn claim_hold(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'fulfilled',
                claimed_at = $3,
                expiry_date = COALESCE(expiry_date, $3)
            WHERE user_id = $1 AND book_id = $2
              AND status IN ('pending', 'fulfilled')
              AND claimed_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(at)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(rows)
    }

    /// Books that have at least one lapsed hold
    pub async fn lapsed_hold_books(&self, as_of: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let books: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT book_id FROM reservations
            WHERE status = 'fulfilled' AND claimed_at IS NULL AND expiry_date < $1
            ORDER BY book_id
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Lapsed holds of one book, locked. Rows held by a concurrent sweep are
    /// skipped. Callers lock the book row first.
    pub async fn lock_lapsed_holds(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = $1
              AND status = 'fulfilled'
              AND claimed_at IS NULL
              AND expiry_date < $2
            ORDER BY expiry_date, id
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(book_id)
        .bind(as_of)
        .fetch_all(&mut *conn)
        .await?;
        Ok(reservations)
    }

    pub async fn expire(&self, conn: &mut PgConnection, id: i32) -> AppResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE reservations SET status = 'expired'
            WHERE id = $1 AND status = 'fulfilled' AND claimed_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }
}

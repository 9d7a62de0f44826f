//! Borrowing ledger storage

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{is_unique_violation, AppError, AppResult, LedgerError},
    models::borrowing::{Borrowing, BorrowingDetails, BorrowingStatus},
};

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrowing by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    /// Lock a borrowing row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    /// Borrowings of a user with their titles, newest first
    pub async fn list_for_user(
        &self,
        user_id: i32,
        active_only: bool,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let borrowings = sqlx::query_as::<_, BorrowingDetails>(
            r#"
            SELECT br.*, b.title AS book_title, b.isbn AS book_isbn
            FROM borrowings br
            JOIN books b ON b.id = br.book_id
            WHERE br.user_id = $1 AND (NOT $2 OR br.status = 'borrowed')
            ORDER BY br.borrow_date DESC, br.id DESC
            "#,
        )
        .bind(user_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(borrowings)
    }

    pub async fn has_active(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrowings
                WHERE user_id = $1 AND book_id = $2 AND status = 'borrowed'
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    pub async fn count_active(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND status = 'borrowed'",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Borrowings that may carry an unpaid fine as of `as_of`: open overdue
    /// loans plus closed loans with an unpaid snapshot
    pub async fn with_unpaid_fines(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<Borrowing>> {
        let borrowings = sqlx::query_as::<_, Borrowing>(
            r#"
            SELECT * FROM borrowings
            WHERE user_id = $1
              AND ((status = 'borrowed' AND due_date < $2)
                   OR (status <> 'borrowed' AND fine_amount > fine_paid_amount))
            ORDER BY due_date, id
            "#,
        )
        .bind(user_id)
        .bind(as_of)
        .fetch_all(&mut *conn)
        .await?;
        Ok(borrowings)
    }

    /// Total of fines already paid by a user
    pub async fn paid_fines_total(&self, user_id: i32) -> AppResult<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(fine_paid_amount) FROM borrowings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Open loans due before `limit`, oldest due date first
    pub async fn active_due_before(&self, limit: DateTime<Utc>) -> AppResult<Vec<Borrowing>> {
        let borrowings = sqlx::query_as::<_, Borrowing>(
            r#"
            SELECT * FROM borrowings
            WHERE status = 'borrowed' AND due_date < $1
            ORDER BY due_date, id
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(borrowings)
    }

    /// Record a new loan
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (user_id, book_id, borrow_date, due_date, status)
            VALUES ($1, $2, $3, $4, 'borrowed')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(borrow_date)
        .bind(due_date)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateLoan.into()
            } else {
                e.into()
            }
        })
    }

    /// Close an open loan with its final fine snapshot. The loan stays
    /// marked paid only if earlier payments cover the final fine.
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: BorrowingStatus,
        return_date: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings
            SET status = $2,
                return_date = $3,
                fine_amount = $4,
                fine_paid = fine_paid_amount >= $4 AND fine_paid_amount > 0
            WHERE id = $1 AND status = 'borrowed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(return_date)
        .bind(fine)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::NotActive.into())
    }

    pub async fn renew(
        &self,
        conn: &mut PgConnection,
        id: i32,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings
            SET due_date = $2, renewed_count = renewed_count + 1
            WHERE id = $1 AND status = 'borrowed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_due_date)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::NotActive.into())
    }

    /// Record a collected fine. `fine` is the snapshot the payment settles,
    /// `paid_before` the collected total the caller computed the amount from;
    /// returns `None` if another payment landed in between.
    pub async fn mark_fine_paid(
        &self,
        conn: &mut PgConnection,
        id: i32,
        fine: Decimal,
        amount: Decimal,
        paid_before: Decimal,
    ) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings
            SET fine_paid = fine_paid_amount + $3 >= $2,
                fine_amount = $2,
                fine_paid_amount = fine_paid_amount + $3
            WHERE id = $1 AND fine_paid_amount = $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fine)
        .bind(amount)
        .bind(paid_before)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(borrowing)
    }
}

//! Payment transaction records

use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::payment::{Payment, PaymentPurpose, PaymentStatus},
};

#[derive(Clone)]
pub struct PaymentsRepository {
    pool: Pool<Postgres>,
}

impl PaymentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_transaction(&self, transaction_id: &str) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Payment {} not found", transaction_id))
            })
    }

    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Record an attempt before the processor is called; committed on its own
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending(
        &self,
        user_id: i32,
        transaction_id: &str,
        amount: Decimal,
        currency: &str,
        method: &str,
        purpose: PaymentPurpose,
        reference_id: i32,
    ) -> AppResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                user_id, transaction_id, amount, currency, payment_method,
                purpose, reference_id, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(transaction_id)
        .bind(amount)
        .bind(currency)
        .bind(method)
        .bind(purpose)
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    /// Update outside any ledger transaction
    pub async fn set_status(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
        gateway_reference: Option<&str>,
    ) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.set_status_in(&mut conn, transaction_id, status, gateway_reference)
            .await
    }

    /// Update as part of the transaction that applies the payment
    pub async fn set_status_in(
        &self,
        conn: &mut PgConnection,
        transaction_id: &str,
        status: PaymentStatus,
        gateway_reference: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                gateway_reference = COALESCE($3, gateway_reference),
                updated_at = NOW()
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(status)
        .bind(gateway_reference)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

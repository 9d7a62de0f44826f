//! Subscription plans and member subscriptions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::subscription::{CreatePlan, Subscription, SubscriptionPlan},
};

#[derive(Clone)]
pub struct SubscriptionsRepository {
    pool: Pool<Postgres>,
}

impl SubscriptionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let plans = sqlx::query_as::<_, SubscriptionPlan>(
            "SELECT * FROM subscription_plans WHERE is_active ORDER BY price_monthly, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn get_plan(&self, id: i32) -> AppResult<SubscriptionPlan> {
        sqlx::query_as::<_, SubscriptionPlan>("SELECT * FROM subscription_plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan with id {} not found", id)))
    }

    pub async fn create_plan(&self, plan: &CreatePlan) -> AppResult<SubscriptionPlan> {
        sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            INSERT INTO subscription_plans (
                name, description, price_monthly, price_yearly, max_books,
                max_renewals, priority_reservation, no_late_fees
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_monthly)
        .bind(plan.price_yearly)
        .bind(plan.max_books)
        .bind(plan.max_renewals)
        .bind(plan.priority_reservation)
        .bind(plan.no_late_fees)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Plan {} already exists", plan.name))
            } else {
                e.into()
            }
        })
    }

    /// Plan of the user's subscription in force at `as_of`, if any
    pub async fn active_plan(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionPlan>> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT p.* FROM subscriptions s
            JOIN subscription_plans p ON p.id = s.plan_id
            WHERE s.user_id = $1 AND s.status = 'active' AND s.end_date >= $2
            "#,
        )
        .bind(user_id)
        .bind(as_of)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(plan)
    }

    pub async fn current(&self, user_id: i32) -> AppResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    pub async fn lock_current(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
    ) -> AppResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'active' FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(subscription)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        plan_id: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        months: i32,
        amount: Decimal,
        payment_id: &str,
    ) -> AppResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                user_id, plan_id, start_date, end_date, duration_months,
                amount_paid, payment_id, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(start_date)
        .bind(end_date)
        .bind(months)
        .bind(amount)
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(subscription)
    }

    /// Extend an active subscription, switching it to `plan_id`
    #[allow(clippy::too_many_arguments)]
    pub async fn extend(
        &self,
        conn: &mut PgConnection,
        id: i32,
        plan_id: i32,
        end_date: DateTime<Utc>,
        months: i32,
        amount: Decimal,
        payment_id: &str,
    ) -> AppResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET plan_id = $2,
                end_date = $3,
                duration_months = duration_months + $4,
                amount_paid = amount_paid + $5,
                payment_id = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(plan_id)
        .bind(end_date)
        .bind(months)
        .bind(amount)
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(subscription)
    }

    pub async fn cancel(&self, user_id: i32) -> AppResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions SET status = 'cancelled'
            WHERE user_id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    /// Move subscriptions past their end date to `expired`
    pub async fn expire_lapsed(&self, as_of: DateTime<Utc>) -> AppResult<u64> {
        let rows = sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE status = 'active' AND end_date < $1",
        )
        .bind(as_of)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }
}

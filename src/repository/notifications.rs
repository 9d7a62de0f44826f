//! In-app notification records

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::notification::{Notification, NotificationKind},
};

#[derive(Clone)]
pub struct NotificationsRepository {
    pool: Pool<Postgres>,
}

impl NotificationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        user_id: i32,
        kind: NotificationKind,
        related_id: i32,
        payload: &serde_json::Value,
    ) -> AppResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, kind, related_id, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(related_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(notification)
    }

    /// Whether a reminder of this kind was already recorded for `notice_date`
    pub async fn notice_sent(
        &self,
        user_id: i32,
        kind: NotificationKind,
        related_id: i32,
        notice_date: NaiveDate,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM notifications
                WHERE user_id = $1 AND kind = $2 AND related_id = $3
                  AND payload->>'notice_date' = $4
            )
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(related_id)
        .bind(notice_date.format("%Y-%m-%d").to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn list_for_user(&self, user_id: i32, unread_only: bool) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
            ORDER BY created_at DESC, id DESC
            LIMIT 200
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn mark_read(&self, user_id: i32, id: i32) -> AppResult<bool> {
        let rows = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows == 1)
    }
}

//! Domain events delivered to members and their in-app records

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LoanCreated,
    Returned,
    Renewed,
    BookAvailable,
    FinePaid,
    SubscriptionActivated,
    DueSoon,
    Overdue,
    LoanCancelled,
}

/// Event emitted after a ledger transaction commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    LoanCreated {
        borrowing_id: i32,
        book_id: i32,
        due_date: DateTime<Utc>,
    },
    Returned {
        borrowing_id: i32,
        book_id: i32,
        fine: Decimal,
    },
    Cancelled {
        borrowing_id: i32,
        book_id: i32,
    },
    Renewed {
        borrowing_id: i32,
        book_id: i32,
        new_due_date: DateTime<Utc>,
        renewed_count: i32,
    },
    BookAvailable {
        reservation_id: i32,
        book_id: i32,
        expiry_date: DateTime<Utc>,
    },
    FinePaid {
        borrowing_id: i32,
        amount: Decimal,
        transaction_id: String,
    },
    SubscriptionActivated {
        subscription_id: i32,
        plan_id: i32,
        end_date: DateTime<Utc>,
    },
    DueSoon {
        borrowing_id: i32,
        book_id: i32,
        due_date: DateTime<Utc>,
        /// Day the reminder run was for
        notice_date: NaiveDate,
    },
    Overdue {
        borrowing_id: i32,
        book_id: i32,
        days_overdue: i64,
        fine: Decimal,
        notice_date: NaiveDate,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            LedgerEvent::LoanCreated { .. } => NotificationKind::LoanCreated,
            LedgerEvent::Returned { .. } => NotificationKind::Returned,
            LedgerEvent::Cancelled { .. } => NotificationKind::LoanCancelled,
            LedgerEvent::Renewed { .. } => NotificationKind::Renewed,
            LedgerEvent::BookAvailable { .. } => NotificationKind::BookAvailable,
            LedgerEvent::FinePaid { .. } => NotificationKind::FinePaid,
            LedgerEvent::SubscriptionActivated { .. } => NotificationKind::SubscriptionActivated,
            LedgerEvent::DueSoon { .. } => NotificationKind::DueSoon,
            LedgerEvent::Overdue { .. } => NotificationKind::Overdue,
        }
    }

    /// Id of the borrowing, reservation or subscription the event is about
    pub fn related_id(&self) -> i32 {
        match self {
            LedgerEvent::LoanCreated { borrowing_id, .. }
            | LedgerEvent::Returned { borrowing_id, .. }
            | LedgerEvent::Cancelled { borrowing_id, .. }
            | LedgerEvent::Renewed { borrowing_id, .. }
            | LedgerEvent::FinePaid { borrowing_id, .. }
            | LedgerEvent::DueSoon { borrowing_id, .. }
            | LedgerEvent::Overdue { borrowing_id, .. } => *borrowing_id,
            LedgerEvent::BookAvailable { reservation_id, .. } => *reservation_id,
            LedgerEvent::SubscriptionActivated { subscription_id, .. } => *subscription_id,
        }
    }
}

/// Stored in-app notification
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub kind: NotificationKind,
    pub related_id: Option<i32>,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_is_tagged() {
        let event = LedgerEvent::Returned {
            borrowing_id: 4,
            book_id: 2,
            fine: Decimal::from(15),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "returned");
        assert_eq!(event.kind(), NotificationKind::Returned);
        assert_eq!(event.related_id(), 4);
    }
}

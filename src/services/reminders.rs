//! Daily due-date reminders and overdue notices

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        borrowing::{days_overdue, Borrowing},
        notification::LedgerEvent,
    },
    repository::Repository,
};

use super::{notifier::Notifier, subscriptions::SubscriptionService};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReminderReport {
    pub due_soon: u32,
    pub overdue: u32,
}

/// Which notice, if any, a loan gets on `today`
pub fn reminder_for(
    borrowing: &Borrowing,
    today: NaiveDate,
    due_soon_days: i64,
    as_of: DateTime<Utc>,
) -> Option<ReminderKind> {
    let due_day = borrowing.due_date.date_naive();
    if due_day == today + Duration::days(due_soon_days) {
        Some(ReminderKind::DueSoon)
    } else if due_day < today {
        Some(ReminderKind::Overdue {
            days: days_overdue(borrowing.due_date, as_of).max(1),
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    DueSoon,
    Overdue { days: i64 },
}

#[derive(Clone)]
pub struct ReminderService {
    repository: Repository,
    subscriptions: SubscriptionService,
    notifier: Notifier,
    due_soon_days: i64,
}

impl ReminderService {
    pub fn new(
        repository: Repository,
        subscriptions: SubscriptionService,
        notifier: Notifier,
        due_soon_days: i64,
    ) -> Self {
        Self {
            repository,
            subscriptions,
            notifier,
            due_soon_days,
        }
    }

    /// Notify members of loans due in exactly `due_soon_days` days and of
    /// overdue loans. Each loan gets at most one notice of each kind per
    /// calendar day of `as_of`, however often this runs.
    pub async fn send_due_reminders(&self, as_of: DateTime<Utc>) -> AppResult<ReminderReport> {
        let today = as_of.date_naive();
        let start_of_day = today.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let horizon = start_of_day + Duration::days(self.due_soon_days + 1);

        let mut report = ReminderReport::default();
        for borrowing in self.repository.borrowings.active_due_before(horizon).await? {
            let Some(kind) = reminder_for(&borrowing, today, self.due_soon_days, as_of) else {
                continue;
            };

            let event = match kind {
                ReminderKind::DueSoon => LedgerEvent::DueSoon {
                    borrowing_id: borrowing.id,
                    book_id: borrowing.book_id,
                    due_date: borrowing.due_date,
                    notice_date: today,
                },
                ReminderKind::Overdue { days } => {
                    let rate = self
                        .subscriptions
                        .policy_for(borrowing.user_id, as_of)
                        .await?
                        .fine_rate();
                    LedgerEvent::Overdue {
                        borrowing_id: borrowing.id,
                        book_id: borrowing.book_id,
                        days_overdue: days,
                        fine: borrowing.current_fine(as_of, rate),
                        notice_date: today,
                    }
                }
            };

            if self
                .repository
                .notifications
                .notice_sent(borrowing.user_id, event.kind(), borrowing.id, today)
                .await?
            {
                continue;
            }

            match kind {
                ReminderKind::DueSoon => report.due_soon += 1,
                ReminderKind::Overdue { .. } => report.overdue += 1,
            }
            self.notifier.emit(borrowing.user_id, event).await;
        }

        if report.due_soon + report.overdue > 0 {
            tracing::info!(
                due_soon = report.due_soon,
                overdue = report.overdue,
                "Due reminders sent"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::borrowing::BorrowingStatus;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn loan_due(due: DateTime<Utc>) -> Borrowing {
        Borrowing {
            id: 1,
            user_id: 1,
            book_id: 1,
            borrow_date: due - Duration::days(14),
            due_date: due,
            return_date: None,
            renewed_count: 0,
            fine_amount: Decimal::ZERO,
            fine_paid: false,
            fine_paid_amount: Decimal::ZERO,
            status: BorrowingStatus::Borrowed,
            notes: None,
            created_at: due - Duration::days(14),
        }
    }

    #[test]
    fn due_soon_matches_the_exact_day() {
        let now = Utc.with_ymd_and_hms(2024, 4, 10, 8, 0, 0).unwrap();
        let today = now.date_naive();

        let in_three = loan_due(Utc.with_ymd_and_hms(2024, 4, 13, 23, 0, 0).unwrap());
        assert_eq!(reminder_for(&in_three, today, 3, now), Some(ReminderKind::DueSoon));

        let in_two = loan_due(Utc.with_ymd_and_hms(2024, 4, 12, 9, 0, 0).unwrap());
        assert_eq!(reminder_for(&in_two, today, 3, now), None);
    }

    #[test]
    fn overdue_starts_the_day_after_due() {
        let now = Utc.with_ymd_and_hms(2024, 4, 10, 8, 0, 0).unwrap();
        let today = now.date_naive();

        let due_today = loan_due(Utc.with_ymd_and_hms(2024, 4, 10, 6, 0, 0).unwrap());
        assert_eq!(reminder_for(&due_today, today, 3, now), None);

        let due_last_week = loan_due(Utc.with_ymd_and_hms(2024, 4, 3, 8, 0, 0).unwrap());
        assert_eq!(
            reminder_for(&due_last_week, today, 3, now),
            Some(ReminderKind::Overdue { days: 7 })
        );
    }
}

//! Due-date reminders recorded as in-app notifications

use std::sync::Arc;

use chrono::Duration;

use campus_library::{
    models::notification::{LedgerEvent, Notification, NotificationKind},
    repository::Repository,
    services::{
        notifier::{InAppNotifier, Notifier},
        Services,
    },
};

use crate::common::{day, setup, test_config};

async fn overdue_notices(repository: &Repository, user_id: i32, borrowing_id: i32) -> Vec<Notification> {
    repository
        .notifications
        .list_for_user(user_id, false)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Overdue && n.related_id == Some(borrowing_id))
        .collect()
}

#[tokio::test]
#[ignore]
async fn test_overdue_notice_sent_once_per_reminder_day() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;
    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();

    let in_app = Services::new(
        ctx.repository.clone(),
        &test_config(),
        ctx.processor.clone(),
        Notifier::new(Arc::new(InAppNotifier::new(ctx.repository.clone()))),
    );

    // Runs dated in the past are deduplicated by the day they were for
    in_app.maintenance.send_reminders(day(17)).await.unwrap();
    in_app
        .maintenance
        .send_reminders(day(17) + Duration::hours(6))
        .await
        .unwrap();
    let notices = overdue_notices(&ctx.repository, user.id, borrowing.id).await;
    assert_eq!(notices.len(), 1);

    let event: LedgerEvent = serde_json::from_value(notices[0].payload.clone()).unwrap();
    match event {
        LedgerEvent::Overdue {
            days_overdue,
            notice_date,
            ..
        } => {
            assert_eq!(days_overdue, 3);
            assert_eq!(notice_date, day(17).date_naive());
        }
        other => panic!("unexpected payload {:?}", other),
    }

    in_app.maintenance.send_reminders(day(18)).await.unwrap();
    assert_eq!(overdue_notices(&ctx.repository, user.id, borrowing.id).await.len(), 2);
}

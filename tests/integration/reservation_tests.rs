//! Reservation queue and hold hand-off against a real database

use chrono::Duration;

use campus_library::{
    error::{AppError, LedgerError},
    models::{notification::LedgerEvent, reservation::ReservationStatus},
};

use crate::common::{day, setup};

#[tokio::test]
#[ignore]
async fn test_return_fulfils_first_pending_reservation_only() {
    let ctx = setup().await;
    let borrower = ctx.new_user().await;
    let first = ctx.new_user().await;
    let second = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(borrower.id, book.id, day(0)).await.unwrap();
    let r1 = ctx.services.reservations.reserve(first.id, book.id, day(1)).await.unwrap();
    let r2 = ctx.services.reservations.reserve(second.id, book.id, day(2)).await.unwrap();
    assert_eq!(r1.status, ReservationStatus::Pending);

    let next = ctx.services.reservations.next_pending(book.id).await.unwrap();
    assert_eq!(next.map(|r| r.id), Some(r1.id));

    let outcome = ctx
        .services
        .ledger
        .return_book(borrowing.id, day(5))
        .await
        .unwrap();
    let fulfilled = outcome.reservation_fulfilled.expect("a hold should be fulfilled");
    assert_eq!(fulfilled.id, r1.id);
    assert_eq!(fulfilled.status, ReservationStatus::Fulfilled);
    assert_eq!(fulfilled.expiry_date, Some(day(5) + Duration::days(3)));
    assert!(fulfilled.notified);

    let still_waiting = ctx.services.reservations.get(r2.id).await.unwrap();
    assert_eq!(still_waiting.status, ReservationStatus::Pending);

    assert!(ctx
        .sink
        .events_for(first.id)
        .iter()
        .any(|e| matches!(e, LedgerEvent::BookAvailable { reservation_id, .. } if *reservation_id == r1.id)));
}

#[tokio::test]
#[ignore]
async fn test_held_copy_is_kept_for_the_holder() {
    let ctx = setup().await;
    let borrower = ctx.new_user().await;
    let holder = ctx.new_user().await;
    let walk_in = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(borrower.id, book.id, day(0)).await.unwrap();
    let hold = ctx.services.reservations.reserve(holder.id, book.id, day(1)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(4)).await.unwrap();
    assert_eq!(ctx.available(book.id).await, 1);

    let refused = ctx.services.ledger.borrow(walk_in.id, book.id, day(5)).await;
    assert!(matches!(
        refused,
        Err(AppError::Ledger(LedgerError::BookUnavailable))
    ));

    ctx.services.ledger.borrow(holder.id, book.id, day(5)).await.unwrap();
    let claimed = ctx.services.reservations.get(hold.id).await.unwrap();
    assert_eq!(claimed.status, ReservationStatus::Fulfilled);
    assert_eq!(claimed.claimed_at, Some(day(5)));
    assert_eq!(ctx.available(book.id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_reserve_twice_is_refused() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    ctx.services.reservations.reserve(user.id, book.id, day(0)).await.unwrap();
    let again = ctx.services.reservations.reserve(user.id, book.id, day(1)).await;
    assert!(matches!(
        again,
        Err(AppError::Ledger(LedgerError::AlreadyReserved))
    ));
}

#[tokio::test]
#[ignore]
async fn test_cancel_only_while_pending() {
    let ctx = setup().await;
    let borrower = ctx.new_user().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let pending = ctx.services.reservations.reserve(user.id, book.id, day(0)).await.unwrap();
    let cancelled = ctx.services.reservations.cancel(pending.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    let again = ctx.services.reservations.cancel(pending.id).await;
    assert!(matches!(again, Err(AppError::Ledger(LedgerError::NotPending))));

    // A fulfilled hold can no longer be cancelled
    let borrowing = ctx.services.ledger.borrow(borrower.id, book.id, day(1)).await.unwrap();
    let hold = ctx.services.reservations.reserve(user.id, book.id, day(2)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(3)).await.unwrap();
    let refused = ctx.services.reservations.cancel(hold.id).await;
    assert!(matches!(refused, Err(AppError::Ledger(LedgerError::NotPending))));
}

#[tokio::test]
#[ignore]
async fn test_expiry_hands_off_and_is_idempotent() {
    let ctx = setup().await;
    // Sweeps touch every book, so run on a calendar no other test uses
    let day = |n: i64| day(n - 400);
    let borrower = ctx.new_user().await;
    let first = ctx.new_user().await;
    let second = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(borrower.id, book.id, day(0)).await.unwrap();
    let r1 = ctx.services.reservations.reserve(first.id, book.id, day(1)).await.unwrap();
    let r2 = ctx.services.reservations.reserve(second.id, book.id, day(2)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(5)).await.unwrap();

    // The hold on r1 runs until day 8
    let sweep = ctx.services.reservations.expire_stale(day(9)).await.unwrap();
    let handed_here: Vec<_> = sweep
        .fulfilled_handoffs
        .iter()
        .filter(|r| r.book_id == book.id)
        .collect();
    assert_eq!(handed_here.len(), 1);
    assert_eq!(handed_here[0].id, r2.id);
    assert_eq!(handed_here[0].expiry_date, Some(day(9) + Duration::days(3)));

    let lapsed = ctx.services.reservations.get(r1.id).await.unwrap();
    assert_eq!(lapsed.status, ReservationStatus::Expired);

    let second_sweep = ctx.services.reservations.expire_stale(day(9)).await.unwrap();
    assert!(second_sweep
        .fulfilled_handoffs
        .iter()
        .all(|r| r.book_id != book.id));
    assert_eq!(
        ctx.services.reservations.get(r1.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(
        ctx.services.reservations.get(r2.id).await.unwrap().status,
        ReservationStatus::Fulfilled
    );
    assert_eq!(ctx.available(book.id).await, 1);
}

//! Borrow, return, renew and fine payment against a real database

use std::sync::atomic::Ordering;

use rust_decimal_macros::dec;

use campus_library::{
    error::{AppError, LedgerError},
    models::{
        borrowing::BorrowingStatus,
        notification::LedgerEvent,
        payment::{PaymentMethod, PaymentStatus},
        reservation::ReservationStatus,
    },
};

use crate::common::{day, setup};

fn ledger_error(result: Result<impl std::fmt::Debug, AppError>) -> LedgerError {
    match result {
        Err(AppError::Ledger(e)) => e,
        other => panic!("expected a ledger refusal, got {:?}", other),
    }
}

#[tokio::test]
#[ignore]
async fn test_same_day_return_has_no_fine() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    assert_eq!(ctx.available(book.id).await, 0);

    let outcome = ctx
        .services
        .ledger
        .return_book(borrowing.id, day(0))
        .await
        .unwrap();
    assert_eq!(outcome.fine, dec!(0));
    assert!(outcome.reservation_fulfilled.is_none());
    assert_eq!(ctx.available(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_return_three_days_late_costs_fifteen() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    assert_eq!(borrowing.due_date, day(14));

    let outcome = ctx
        .services
        .ledger
        .return_book(borrowing.id, day(17))
        .await
        .unwrap();
    assert_eq!(outcome.fine, dec!(15));
    assert_eq!(outcome.borrowing.fine_amount, dec!(15));
    assert!(!outcome.borrowing.fine_paid);
}

#[tokio::test]
#[ignore]
async fn test_return_on_day_twenty() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(2).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    assert_eq!(ctx.available(book.id).await, 1);

    let outcome = ctx
        .services
        .ledger
        .return_book(borrowing.id, day(20))
        .await
        .unwrap();
    assert_eq!(outcome.borrowing.fine_amount, dec!(30));
    assert_eq!(outcome.borrowing.status, BorrowingStatus::Returned);
    assert_eq!(outcome.borrowing.return_date, Some(day(20)));
    assert_eq!(ctx.available(book.id).await, 2);

    let events = ctx.sink.events_for(user.id);
    assert!(matches!(events[0], LedgerEvent::LoanCreated { .. }));
    assert!(matches!(
        events.last(),
        Some(LedgerEvent::Returned { fine, .. }) if *fine == dec!(30)
    ));
}

#[tokio::test]
#[ignore]
async fn test_return_twice_is_refused() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(1)).await.unwrap();

    let again = ctx.services.ledger.return_book(borrowing.id, day(2)).await;
    assert_eq!(ledger_error(again), LedgerError::NotActive);
    assert_eq!(ctx.available(book.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_borrow_preconditions() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let other = ctx.new_user().await;
    let book = ctx.new_book(2).await;
    let empty = ctx.new_book(0).await;

    let refused = ctx.services.ledger.borrow(user.id, empty.id, day(0)).await;
    assert_eq!(ledger_error(refused), LedgerError::BookUnavailable);

    ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    let duplicate = ctx.services.ledger.borrow(user.id, book.id, day(0)).await;
    assert_eq!(ledger_error(duplicate), LedgerError::DuplicateLoan);

    // A different member may still take the second copy
    ctx.services.ledger.borrow(other.id, book.id, day(0)).await.unwrap();
    assert_eq!(ctx.available(book.id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_borrow_limit() {
    let ctx = setup().await;
    let user = ctx.new_user().await;

    for _ in 0..5 {
        let book = ctx.new_book(1).await;
        ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    }

    let sixth = ctx.new_book(1).await;
    let refused = ctx.services.ledger.borrow(user.id, sixth.id, day(0)).await;
    assert_eq!(
        ledger_error(refused),
        LedgerError::BorrowLimitExceeded { current: 5, max: 5 }
    );
    assert_eq!(ctx.available(sixth.id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_outstanding_fine_blocks_borrowing_until_paid() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let first = ctx.new_book(1).await;
    let second = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, first.id, day(0)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(16)).await.unwrap();

    let refused = ctx.services.ledger.borrow(user.id, second.id, day(16)).await;
    assert_eq!(
        ledger_error(refused),
        LedgerError::OutstandingFine { amount: dec!(10) }
    );

    let receipt = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, Some(dec!(10)), PaymentMethod::Cash, day(16))
        .await
        .unwrap();
    assert_eq!(receipt.amount, dec!(10));

    let paid = ctx.services.ledger.get(borrowing.id).await.unwrap();
    assert!(paid.fine_paid);
    assert_eq!(paid.fine_amount, dec!(10));
    assert_eq!(paid.status, BorrowingStatus::Returned);

    ctx.services.ledger.borrow(user.id, second.id, day(16)).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_renew_twice_then_limit() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();

    let first = ctx.services.ledger.renew(borrowing.id, day(10)).await.unwrap();
    assert_eq!(first.new_due_date, day(28));
    assert_eq!(first.renewed_count, 1);

    let second = ctx.services.ledger.renew(borrowing.id, day(11)).await.unwrap();
    assert_eq!(second.new_due_date, day(42));
    assert_eq!(second.renewed_count, 2);

    let third = ctx.services.ledger.renew(borrowing.id, day(12)).await;
    assert_eq!(
        ledger_error(third),
        LedgerError::RenewalLimitReached { current: 2, max: 2 }
    );

    let stored = ctx.services.ledger.get(borrowing.id).await.unwrap();
    assert_eq!(stored.due_date, day(42));
    assert_eq!(stored.renewed_count, 2);
}

#[tokio::test]
#[ignore]
async fn test_renew_overdue_loan_is_refused() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();

    let refused = ctx.services.ledger.renew(borrowing.id, day(15)).await;
    assert_eq!(ledger_error(refused), LedgerError::AlreadyOverdue);

    let stored = ctx.services.ledger.get(borrowing.id).await.unwrap();
    assert_eq!(stored.due_date, day(14));
    assert_eq!(stored.renewed_count, 0);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrow_of_last_copy() {
    let ctx = setup().await;
    let first = ctx.new_user().await;
    let second = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let (first_id, second_id, book_id) = (first.id, second.id, book.id);
    let ledger_a = ctx.services.ledger.clone();
    let ledger_b = ctx.services.ledger.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { ledger_a.borrow(first_id, book_id, day(0)).await }),
        tokio::spawn(async move { ledger_b.borrow(second_id, book_id, day(0)).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let refusal = results.into_iter().find(|r| r.is_err()).unwrap();
    assert_eq!(ledger_error(refusal), LedgerError::BookUnavailable);
    assert_eq!(ctx.available(book.id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_declined_payment_leaves_fine_unpaid() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();
    ctx.services.ledger.return_book(borrowing.id, day(18)).await.unwrap();

    ctx.processor.decline.store(true, Ordering::SeqCst);
    let declined = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, None, PaymentMethod::Card, day(18))
        .await;
    assert!(matches!(
        ledger_error(declined),
        LedgerError::ProcessorDeclined(_)
    ));

    let stored = ctx.services.ledger.get(borrowing.id).await.unwrap();
    assert!(!stored.fine_paid);
    assert_eq!(stored.fine_amount, dec!(20));

    let payments = ctx.services.users.user_payments(user.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);

    ctx.processor.decline.store(false, Ordering::SeqCst);
    let receipt = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, None, PaymentMethod::Card, day(18))
        .await
        .unwrap();
    assert_eq!(receipt.amount, dec!(20));
    assert!(ctx.services.ledger.get(borrowing.id).await.unwrap().fine_paid);
}

#[tokio::test]
#[ignore]
async fn test_pay_fine_edge_cases() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(user.id, book.id, day(0)).await.unwrap();

    let nothing = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, None, PaymentMethod::Cash, day(3))
        .await;
    assert_eq!(ledger_error(nothing), LedgerError::NothingDue);

    let mismatch = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, Some(dec!(5)), PaymentMethod::Cash, day(16))
        .await;
    assert_eq!(
        ledger_error(mismatch),
        LedgerError::AmountMismatch {
            due: dec!(10),
            offered: dec!(5)
        }
    );
    assert_eq!(ctx.processor.charges.load(Ordering::SeqCst), 0);

    // Paying an open loan settles what has accrued so far
    let receipt = ctx
        .services
        .ledger
        .pay_fine(borrowing.id, None, PaymentMethod::Cash, day(16))
        .await
        .unwrap();
    let payment = ctx
        .repository
        .payments
        .get_by_transaction(&receipt.transaction_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.amount, dec!(10));
    let stored = ctx.services.ledger.get(borrowing.id).await.unwrap();
    assert_eq!(stored.status, BorrowingStatus::Borrowed);
    assert_eq!(stored.fine_paid_amount, dec!(10));
    assert_eq!(ctx.available(book.id).await, 0);

    let outcome = ctx
        .services
        .ledger
        .return_book(borrowing.id, day(18))
        .await
        .unwrap();
    assert_eq!(outcome.fine, dec!(20));
    assert!(!outcome.borrowing.fine_paid);

    let summary = ctx.services.users.fine_summary(user.id, day(18)).await.unwrap();
    assert_eq!(summary.total_outstanding, dec!(10));
    assert_eq!(summary.total_paid, dec!(10));
}

#[tokio::test]
#[ignore]
async fn test_pay_all_fines() {
    let ctx = setup().await;
    let user = ctx.new_user().await;
    let first = ctx.new_book(1).await;
    let second = ctx.new_book(1).await;

    let a = ctx.services.ledger.borrow(user.id, first.id, day(0)).await.unwrap();
    let b = ctx.services.ledger.borrow(user.id, second.id, day(0)).await.unwrap();
    ctx.services.ledger.return_book(a.id, day(15)).await.unwrap();
    ctx.services.ledger.return_book(b.id, day(17)).await.unwrap();

    let settlement = ctx
        .services
        .ledger
        .pay_all_fines(user.id, PaymentMethod::Upi, day(17))
        .await
        .unwrap();
    assert_eq!(settlement.receipts.len(), 2);
    assert_eq!(settlement.total_paid, dec!(20));
    assert!(settlement.declined.is_none());

    let again = ctx
        .services
        .ledger
        .pay_all_fines(user.id, PaymentMethod::Upi, day(17))
        .await;
    assert_eq!(ledger_error(again), LedgerError::NothingDue);
}

#[tokio::test]
#[ignore]
async fn test_cancel_frees_the_copy_for_the_queue() {
    let ctx = setup().await;
    let borrower = ctx.new_user().await;
    let waiting = ctx.new_user().await;
    let book = ctx.new_book(1).await;

    let borrowing = ctx.services.ledger.borrow(borrower.id, book.id, day(0)).await.unwrap();
    let hold = ctx.services.reservations.reserve(waiting.id, book.id, day(1)).await.unwrap();
    assert_eq!(ctx.available(book.id).await, 0);

    // Cancelled well past the due date: still no fine
    let cancelled = ctx.services.ledger.cancel(borrowing.id, day(20)).await.unwrap();
    assert_eq!(cancelled.status, BorrowingStatus::Cancelled);
    assert_eq!(cancelled.fine_amount, dec!(0));
    assert_eq!(cancelled.return_date, Some(day(20)));
    assert_eq!(ctx.available(book.id).await, 1);

    let hold = ctx.services.reservations.get(hold.id).await.unwrap();
    assert_eq!(hold.status, ReservationStatus::Fulfilled);

    assert!(ctx
        .sink
        .events_for(borrower.id)
        .iter()
        .any(|e| matches!(e, LedgerEvent::Cancelled { borrowing_id, .. } if *borrowing_id == borrowing.id)));
    assert!(ctx
        .sink
        .events_for(waiting.id)
        .iter()
        .any(|e| matches!(e, LedgerEvent::BookAvailable { .. })));

    assert_eq!(
        ledger_error(ctx.services.ledger.cancel(borrowing.id, day(21)).await),
        LedgerError::NotActive
    );
    assert_eq!(
        ledger_error(ctx.services.ledger.return_book(borrowing.id, day(21)).await),
        LedgerError::NotActive
    );
    assert_eq!(ctx.available(book.id).await, 1);
}

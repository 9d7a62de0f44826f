//! Repository layer for database operations
//!
//! Read-only queries run against the pool. Anything that takes part in a
//! ledger transaction takes an explicit `&mut PgConnection`, normally the
//! connection behind a `Transaction` opened with [`Repository::begin`].

pub mod books;
pub mod borrowings;
pub mod notifications;
pub mod payments;
pub mod reservations;
pub mod subscriptions;
pub mod users;

use sqlx::{Pool, Postgres, Transaction};

use crate::error::AppResult;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
    pub borrowings: borrowings::BorrowingsRepository,
    pub reservations: reservations::ReservationsRepository,
    pub subscriptions: subscriptions::SubscriptionsRepository,
    pub payments: payments::PaymentsRepository,
    pub notifications: notifications::NotificationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            borrowings: borrowings::BorrowingsRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            subscriptions: subscriptions::SubscriptionsRepository::new(pool.clone()),
            payments: payments::PaymentsRepository::new(pool.clone()),
            notifications: notifications::NotificationsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Open a transaction; dropping it without `commit` rolls back
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Cheap connectivity probe for readiness checks
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

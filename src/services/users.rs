//! Member accounts and the views of a member's loans, holds and fines

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::BorrowingDetails,
        notification::Notification,
        payment::Payment,
        reservation::Reservation,
        user::{CreateUser, FineSummary, User, UserQuery},
    },
    repository::Repository,
};

use super::subscriptions::SubscriptionService;

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    subscriptions: SubscriptionService,
}

impl UsersService {
    pub fn new(repository: Repository, subscriptions: SubscriptionService) -> Self {
        Self {
            repository,
            subscriptions,
        }
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Register a member
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;
        if self.repository.users.get_by_email(&user.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            )));
        }

        let password_hash = self.hash_password(&user.password)?;
        let created = self.repository.users.create(&user, &password_hash).await?;
        tracing::info!(user_id = created.id, role = %created.role, "User created");
        Ok(created)
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn list_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository
            .users
            .list(query.limit(), query.offset())
            .await
    }

    /// Suspend or reactivate an account. Suspended members keep their
    /// open loans but cannot borrow or reserve.
    pub async fn set_user_active(&self, id: i32, active: bool) -> AppResult<User> {
        let user = self.repository.users.set_active(id, active).await?;
        tracing::info!(user_id = id, is_active = active, "User status changed");
        Ok(user)
    }

    pub async fn user_borrowings(
        &self,
        user_id: i32,
        active_only: bool,
    ) -> AppResult<Vec<BorrowingDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository
            .borrowings
            .list_for_user(user_id, active_only)
            .await
    }

    pub async fn user_reservations(&self, user_id: i32) -> AppResult<Vec<Reservation>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.reservations.list_for_user(user_id).await
    }

    pub async fn user_payments(&self, user_id: i32) -> AppResult<Vec<Payment>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.payments.list_for_user(user_id).await
    }

    /// Outstanding fines as of `as_of` and the total paid so far
    pub async fn fine_summary(&self, user_id: i32, as_of: DateTime<Utc>) -> AppResult<FineSummary> {
        self.repository.users.get_by_id(user_id).await?;
        let rate = self.subscriptions.policy_for(user_id, as_of).await?.fine_rate();

        let borrowings = {
            let mut conn = self.repository.pool.acquire().await?;
            self.repository
                .borrowings
                .with_unpaid_fines(&mut conn, user_id, as_of)
                .await?
        };
        let outstanding: Vec<_> = borrowings
            .iter()
            .filter_map(|b| b.outstanding(as_of, rate))
            .collect();
        let total_outstanding: Decimal = outstanding.iter().map(|f| f.amount).sum();

        Ok(FineSummary {
            user_id,
            outstanding,
            total_outstanding,
            total_paid: self.repository.borrowings.paid_fines_total(user_id).await?,
        })
    }

    pub async fn notifications(&self, user_id: i32, unread_only: bool) -> AppResult<Vec<Notification>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository
            .notifications
            .list_for_user(user_id, unread_only)
            .await
    }

    pub async fn mark_notification_read(&self, user_id: i32, notification_id: i32) -> AppResult<()> {
        if !self
            .repository
            .notifications
            .mark_read(user_id, notification_id)
            .await?
        {
            return Err(AppError::NotFound(format!(
                "Notification {} not found for user {}",
                notification_id, user_id
            )));
        }
        Ok(())
    }
}

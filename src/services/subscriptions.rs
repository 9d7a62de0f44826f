//! Subscription plans, purchases and the loan policy they imply

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LibraryConfig,
    error::{AppError, AppResult, LedgerError},
    models::{
        borrowing::LoanPolicy,
        notification::LedgerEvent,
        payment::{PaymentMethod, PaymentPurpose, PaymentStatus},
        subscription::{extend_by_months, BillingPeriod, CreatePlan, Subscription, SubscriptionPlan},
    },
    repository::Repository,
};

use super::{
    notifier::Notifier,
    payment::{charge_or_decline, ChargeRequest, PaymentProcessor},
};

#[derive(Clone)]
pub struct SubscriptionService {
    repository: Repository,
    library: LibraryConfig,
    processor: Arc<dyn PaymentProcessor>,
    notifier: Notifier,
    currency: String,
}

impl SubscriptionService {
    pub fn new(
        repository: Repository,
        library: LibraryConfig,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Notifier,
        currency: String,
    ) -> Self {
        Self {
            repository,
            library,
            processor,
            notifier,
            currency,
        }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        self.repository.subscriptions.list_plans().await
    }

    pub async fn create_plan(&self, plan: CreatePlan) -> AppResult<SubscriptionPlan> {
        plan.validate()?;
        let plan = self.repository.subscriptions.create_plan(&plan).await?;
        tracing::info!(plan_id = plan.id, name = %plan.name, "Subscription plan created");
        Ok(plan)
    }

    pub async fn current(&self, user_id: i32) -> AppResult<Option<Subscription>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.subscriptions.current(user_id).await
    }

    /// Effective policy inside an open transaction
    pub async fn policy_in(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        as_of: DateTime<Utc>,
    ) -> AppResult<LoanPolicy> {
        let policy = LoanPolicy::from_config(&self.library);
        let plan = self
            .repository
            .subscriptions
            .active_plan(conn, user_id, as_of)
            .await?;
        Ok(match plan {
            Some(plan) => policy.with_plan(&plan),
            None => policy,
        })
    }

    /// Library defaults overridden by the user's active plan
    pub async fn policy_for(&self, user_id: i32, as_of: DateTime<Utc>) -> AppResult<LoanPolicy> {
        let mut conn = self.repository.pool.acquire().await?;
        self.policy_in(&mut conn, user_id, as_of).await
    }

    /// Charge for a plan, then start a subscription or extend the active one
    pub async fn purchase(
        &self,
        user_id: i32,
        plan_id: i32,
        billing: BillingPeriod,
        method: PaymentMethod,
        as_of: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        let user = self.repository.users.get_by_id(user_id).await?;
        if !user.is_active {
            return Err(LedgerError::AccountInactive.into());
        }
        let plan = self.repository.subscriptions.get_plan(plan_id).await?;
        if !plan.is_active {
            return Err(AppError::Validation(format!(
                "Plan {} is no longer offered",
                plan.name
            )));
        }
        let amount = billing.price(&plan);
        let months = billing.months();

        let transaction_id = Uuid::new_v4().to_string();
        self.repository
            .payments
            .insert_pending(
                user_id,
                &transaction_id,
                amount,
                &self.currency,
                method.as_str(),
                PaymentPurpose::Subscription,
                plan.id,
            )
            .await?;

        let request = ChargeRequest {
            transaction_id: transaction_id.clone(),
            user_id,
            amount,
            currency: self.currency.clone(),
            purpose: PaymentPurpose::Subscription,
            reference_id: plan.id,
            method,
        };
        let outcome = match charge_or_decline(self.processor.as_ref(), &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.repository
                    .payments
                    .set_status(&transaction_id, PaymentStatus::Failed, None)
                    .await?;
                return Err(e);
            }
        };

        let mut tx = self.repository.begin().await?;
        let current = self
            .repository
            .subscriptions
            .lock_current(&mut tx, user_id)
            .await?;
        let subscription = match current {
            Some(current) => {
                let from = current.end_date.max(as_of);
                self.repository
                    .subscriptions
                    .extend(
                        &mut tx,
                        current.id,
                        plan.id,
                        extend_by_months(from, months),
                        months as i32,
                        amount,
                        &transaction_id,
                    )
                    .await?
            }
            None => {
                self.repository
                    .subscriptions
                    .insert(
                        &mut tx,
                        user_id,
                        plan.id,
                        as_of,
                        extend_by_months(as_of, months),
                        months as i32,
                        amount,
                        &transaction_id,
                    )
                    .await?
            }
        };
        self.repository
            .payments
            .set_status_in(
                &mut tx,
                &transaction_id,
                PaymentStatus::Success,
                outcome.gateway_reference.as_deref(),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            user_id,
            plan_id = plan.id,
            subscription_id = subscription.id,
            end_date = %subscription.end_date,
            "Subscription activated"
        );

        self.notifier
            .emit(
                user_id,
                LedgerEvent::SubscriptionActivated {
                    subscription_id: subscription.id,
                    plan_id: plan.id,
                    end_date: subscription.end_date,
                },
            )
            .await;

        Ok(subscription)
    }

    pub async fn cancel(&self, user_id: i32) -> AppResult<Subscription> {
        let subscription = self
            .repository
            .subscriptions
            .cancel(user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "User {} has no active subscription",
                    user_id
                ))
            })?;
        tracing::info!(user_id, subscription_id = subscription.id, "Subscription cancelled");
        Ok(subscription)
    }

    /// Idempotent: only subscriptions still marked active are touched
    pub async fn expire_lapsed(&self, as_of: DateTime<Utc>) -> AppResult<u64> {
        let expired = self.repository.subscriptions.expire_lapsed(as_of).await?;
        if expired > 0 {
            tracing::info!(expired, "Lapsed subscriptions expired");
        }
        Ok(expired)
    }
}

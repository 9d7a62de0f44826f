//! Subscription plans and member subscriptions

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SubscriptionPlan {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub max_books: i32,
    pub max_renewals: i32,
    pub priority_reservation: bool,
    /// Members on this plan accrue no late fees
    pub no_late_fees: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePlan {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub description: Option<String>,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    #[validate(range(min = 1))]
    pub max_books: i32,
    #[validate(range(min = 0))]
    pub max_renewals: i32,
    #[serde(default)]
    pub priority_reservation: bool,
    #[serde(default)]
    pub no_late_fees: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Yearly => 12,
        }
    }

    pub fn price(&self, plan: &SubscriptionPlan) -> Decimal {
        match self {
            BillingPeriod::Monthly => plan.price_monthly,
            BillingPeriod::Yearly => plan.price_yearly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Subscription {
    pub id: i32,
    pub user_id: i32,
    pub plan_id: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_months: i32,
    pub amount_paid: Decimal,
    pub payment_id: Option<String>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, as_of: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && as_of <= self.end_date
    }

    pub fn days_remaining(&self, as_of: DateTime<Utc>) -> i64 {
        if self.is_active(as_of) {
            (self.end_date - as_of).num_days()
        } else {
            0
        }
    }
}

/// End date of a purchase of `months` starting from `from`
pub fn extend_by_months(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    from.checked_add_months(Months::new(months)).unwrap_or(from)
}

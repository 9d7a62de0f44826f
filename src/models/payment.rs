//! Payment transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "payment_purpose", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentPurpose {
    Fine,
    Subscription,
}

/// How the member paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Gateway => "gateway",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i32,
    pub user_id: i32,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub purpose: PaymentPurpose,
    /// Borrowing id for fines, plan id for subscriptions
    pub reference_id: Option<i32>,
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the caller receives once a fine is settled
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FineReceipt {
    pub borrowing_id: i32,
    pub transaction_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

/// Result of settling every outstanding fine of a user in one go
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FineSettlement {
    pub receipts: Vec<FineReceipt>,
    pub total_paid: Decimal,
    /// Set when the processor declined a charge and the run stopped early
    pub declined: Option<String>,
}

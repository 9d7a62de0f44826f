//! User (member account) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Member role
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    /// External identifier (student or staff number)
    pub external_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create user request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 50))]
    pub external_id: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub department: Option<String>,
}

/// Member listing parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl UserQuery {
    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.limit())
    }
}

/// Suspend or reactivate request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetActive {
    pub is_active: bool,
}

/// Fines owed and paid by one user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FineSummary {
    pub user_id: i32,
    pub outstanding: Vec<OutstandingFine>,
    pub total_outstanding: rust_decimal::Decimal,
    pub total_paid: rust_decimal::Decimal,
}

/// One unpaid fine
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutstandingFine {
    pub borrowing_id: i32,
    pub book_id: i32,
    pub days_overdue: i64,
    pub amount: rust_decimal::Decimal,
    /// True while the loan is still open and the amount keeps growing
    pub accruing: bool,
}

//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Catalog entry with its per-title availability counter
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub language: Option<String>,
    pub shelf_location: Option<String>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub is_active: bool,
    pub added_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on loan
    pub fn loaned_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// New availability after resizing the stock to `new_total`, keeping the
    /// number of loaned copies constant. `None` when the new stock is smaller
    /// than what is currently on loan.
    pub fn resized_availability(&self, new_total: i32) -> Option<i32> {
        let available = self.available_copies + (new_total - self.total_copies);
        (new_total >= 0 && available >= 0 && available <= new_total).then_some(available)
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 10, max = 20))]
    pub isbn: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub author: String,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub language: Option<String>,
    pub shelf_location: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub total_copies: i32,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub language: Option<String>,
    pub shelf_location: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub total_copies: Option<i32>,
}

/// Catalog search parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Substring matched against title, author and ISBN
    pub q: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
    /// Only books with at least one available copy
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(12).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.limit())
    }
}

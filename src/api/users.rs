//! Member endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{
        borrowing::BorrowingDetails,
        notification::Notification,
        payment::Payment,
        reservation::Reservation,
        user::{CreateUser, FineSummary, SetActive, User, UserQuery},
    },
    AppState,
};

#[derive(Serialize, ToSchema)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Deserialize, IntoParams)]
pub struct BorrowingsQuery {
    /// Only loans that are still out
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// List members
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(UserQuery),
    responses(
        (status = 200, description = "Members", body = UserPage)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<UserPage>> {
    let (users, total) = state.services.users.list_users(&query).await?;
    Ok(Json(UserPage {
        users,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.limit(),
    }))
}

/// Get a member
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Member", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<User>> {
    Ok(Json(state.services.users.get_user(id).await?))
}

/// Register a member
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "Member created", body = User),
        (status = 400, description = "Invalid data"),
        (status = 409, description = "Identifier or email already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Suspend or reactivate a member
#[utoipa::path(
    put,
    path = "/users/{id}/status",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    request_body = SetActive,
    responses(
        (status = 200, description = "Status changed", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn set_user_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<SetActive>,
) -> AppResult<Json<User>> {
    Ok(Json(
        state
            .services
            .users
            .set_user_active(id, request.is_active)
            .await?,
    ))
}

/// Loans of a member, newest first
#[utoipa::path(
    get,
    path = "/users/{id}/borrowings",
    tag = "users",
    params(("id" = i32, Path, description = "User ID"), BorrowingsQuery),
    responses(
        (status = 200, description = "Loans", body = Vec<BorrowingDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_borrowings(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<BorrowingsQuery>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    Ok(Json(
        state
            .services
            .users
            .user_borrowings(id, query.active_only)
            .await?,
    ))
}

/// Reservations of a member
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Reservations", body = Vec<Reservation>),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_reservations(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    Ok(Json(state.services.users.user_reservations(id).await?))
}

/// Outstanding and paid fines of a member
#[utoipa::path(
    get,
    path = "/users/{id}/fines",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Fine summary", body = FineSummary),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_fines(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<FineSummary>> {
    Ok(Json(state.services.users.fine_summary(id, Utc::now()).await?))
}

/// Payments made by a member
#[utoipa::path(
    get,
    path = "/users/{id}/payments",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Payments", body = Vec<Payment>),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_payments(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.services.users.user_payments(id).await?))
}

/// In-app notifications of a member
#[utoipa::path(
    get,
    path = "/users/{id}/notifications",
    tag = "users",
    params(("id" = i32, Path, description = "User ID"), NotificationsQuery),
    responses(
        (status = 200, description = "Notifications", body = Vec<Notification>),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_notifications(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<NotificationsQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(
        state
            .services
            .users
            .notifications(id, query.unread_only)
            .await?,
    ))
}

/// Mark a notification read
#[utoipa::path(
    post,
    path = "/users/{id}/notifications/{notification_id}/read",
    tag = "users",
    params(
        ("id" = i32, Path, description = "User ID"),
        ("notification_id" = i32, Path, description = "Notification ID")
    ),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path((id, notification_id)): Path<(i32, i32)>,
) -> AppResult<StatusCode> {
    state
        .services
        .users
        .mark_notification_read(id, notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

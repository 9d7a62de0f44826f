//! Reservation queue endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::reservation::{ExpiryReport, Reservation},
    AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    pub user_id: i32,
    pub book_id: i32,
}

#[derive(Deserialize, IntoParams)]
pub struct ExpireQuery {
    /// Cut-off time; defaults to now
    pub as_of: Option<DateTime<Utc>>,
}

/// Reserve a book
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation queued", body = Reservation),
        (status = 403, description = "Account suspended", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "Already reserved", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let reservation = state
        .services
        .reservations
        .reserve(request.user_id, request.book_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Get a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    Ok(Json(state.services.reservations.get(id).await?))
}

/// Cancel a pending reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation is not pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    Ok(Json(state.services.reservations.cancel(id).await?))
}

/// Next reservation in line for a book
#[utoipa::path(
    get,
    path = "/books/{id}/reservations/next",
    tag = "reservations",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "First pending reservation, or null", body = Reservation)
    )
)]
pub async fn next_pending(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Option<Reservation>>> {
    Ok(Json(state.services.reservations.next_pending(book_id).await?))
}

/// Expire lapsed holds and pass freed copies down each queue
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    params(ExpireQuery),
    responses(
        (status = 200, description = "Expiry sweep result", body = ExpiryReport)
    )
)]
pub async fn expire_reservations(
    State(state): State<AppState>,
    Query(query): Query<ExpireQuery>,
) -> AppResult<Json<ExpiryReport>> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    Ok(Json(state.services.reservations.expire_stale(as_of).await?))
}

//! Borrowing ledger endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        borrowing::{Borrowing, RenewOutcome, ReturnOutcome},
        payment::{FineReceipt, FineSettlement, PaymentMethod},
    },
    AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct CreateBorrowingRequest {
    pub user_id: i32,
    pub book_id: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct PayFineRequest {
    /// Must equal the amount due when given
    pub amount: Option<Decimal>,
    pub method: PaymentMethod,
}

#[derive(Deserialize, ToSchema)]
pub struct PayAllFinesRequest {
    pub method: PaymentMethod,
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    request_body = CreateBorrowingRequest,
    responses(
        (status = 201, description = "Loan created", body = Borrowing),
        (status = 403, description = "Account suspended", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "Book unavailable, duplicate loan, borrow limit or outstanding fine", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_borrowing(
    State(state): State<AppState>,
    Json(request): Json<CreateBorrowingRequest>,
) -> AppResult<(StatusCode, Json<Borrowing>)> {
    let borrowing = state
        .services
        .ledger
        .borrow(request.user_id, request.book_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Get a borrowing
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing", body = Borrowing),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrowing>> {
    Ok(Json(state.services.ledger.get(id).await?))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Book returned", body = ReturnOutcome),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Borrowing is not active", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_borrowing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ReturnOutcome>> {
    Ok(Json(state.services.ledger.return_book(id, Utc::now()).await?))
}

/// Cancel an open loan without charging a fine
#[utoipa::path(
    post,
    path = "/borrowings/{id}/cancel",
    tag = "borrowings",
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Loan cancelled", body = Borrowing),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Borrowing is not active", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_borrowing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrowing>> {
    Ok(Json(state.services.ledger.cancel(id, Utc::now()).await?))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/borrowings/{id}/renew",
    tag = "borrowings",
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Loan renewed", body = RenewOutcome),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Overdue, renewal limit reached or not active", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew_borrowing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<RenewOutcome>> {
    Ok(Json(state.services.ledger.renew(id, Utc::now()).await?))
}

/// Pay the fine of a loan
#[utoipa::path(
    post,
    path = "/borrowings/{id}/pay-fine",
    tag = "borrowings",
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body = PayFineRequest,
    responses(
        (status = 200, description = "Fine paid", body = FineReceipt),
        (status = 400, description = "Amount does not match the fine", body = crate::error::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Nothing due", body = crate::error::ErrorResponse)
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<PayFineRequest>,
) -> AppResult<Json<FineReceipt>> {
    let receipt = state
        .services
        .ledger
        .pay_fine(id, request.amount, request.method, Utc::now())
        .await?;
    Ok(Json(receipt))
}

/// Pay every outstanding fine of a user
#[utoipa::path(
    post,
    path = "/users/{id}/fines/pay-all",
    tag = "borrowings",
    params(("id" = i32, Path, description = "User ID")),
    request_body = PayAllFinesRequest,
    responses(
        (status = 200, description = "Fines paid; `declined` is set if the run stopped early", body = FineSettlement),
        (status = 402, description = "First payment declined", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found"),
        (status = 409, description = "Nothing due", body = crate::error::ErrorResponse)
    )
)]
pub async fn pay_all_fines(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<PayAllFinesRequest>,
) -> AppResult<Json<FineSettlement>> {
    let settlement = state
        .services
        .ledger
        .pay_all_fines(user_id, request.method, Utc::now())
        .await?;
    Ok(Json(settlement))
}

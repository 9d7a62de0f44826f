//! Subscription plan and membership endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::LoanPolicy,
        payment::PaymentMethod,
        subscription::{BillingPeriod, CreatePlan, Subscription, SubscriptionPlan},
    },
    AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct PurchaseRequest {
    pub plan_id: i32,
    pub billing: BillingPeriod,
    pub method: PaymentMethod,
}

/// Plans on offer
#[utoipa::path(
    get,
    path = "/plans",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Active plans", body = Vec<SubscriptionPlan>)
    )
)]
pub async fn list_plans(State(state): State<AppState>) -> AppResult<Json<Vec<SubscriptionPlan>>> {
    Ok(Json(state.services.subscriptions.list_plans().await?))
}

/// Create a plan
#[utoipa::path(
    post,
    path = "/plans",
    tag = "subscriptions",
    request_body = CreatePlan,
    responses(
        (status = 201, description = "Plan created", body = SubscriptionPlan),
        (status = 400, description = "Invalid plan"),
        (status = 409, description = "Plan name taken")
    )
)]
pub async fn create_plan(
    State(state): State<AppState>,
    Json(plan): Json<CreatePlan>,
) -> AppResult<(StatusCode, Json<SubscriptionPlan>)> {
    let plan = state.services.subscriptions.create_plan(plan).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Active subscription of a member
#[utoipa::path(
    get,
    path = "/users/{id}/subscription",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Active subscription", body = Subscription),
        (status = 404, description = "User not found or no active subscription")
    )
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Subscription>> {
    state
        .services
        .subscriptions
        .current(user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} has no active subscription", user_id)))
}

/// Lending rules currently in force for a member
#[utoipa::path(
    get,
    path = "/users/{id}/policy",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Effective loan policy", body = LoanPolicy),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_policy(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<LoanPolicy>> {
    state.services.users.get_user(user_id).await?;
    Ok(Json(
        state
            .services
            .subscriptions
            .policy_for(user_id, Utc::now())
            .await?,
    ))
}

/// Buy or extend a subscription
#[utoipa::path(
    post,
    path = "/users/{id}/subscription",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "User ID")),
    request_body = PurchaseRequest,
    responses(
        (status = 201, description = "Subscription active", body = Subscription),
        (status = 402, description = "Payment declined", body = crate::error::ErrorResponse),
        (status = 404, description = "User or plan not found")
    )
)]
pub async fn purchase_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<PurchaseRequest>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    let subscription = state
        .services
        .subscriptions
        .purchase(
            user_id,
            request.plan_id,
            request.billing,
            request.method,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Cancel the active subscription
#[utoipa::path(
    delete,
    path = "/users/{id}/subscription",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Subscription cancelled", body = Subscription),
        (status = 404, description = "No active subscription")
    )
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(state.services.subscriptions.cancel(user_id).await?))
}

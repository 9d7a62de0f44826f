//! Manual triggers for the housekeeping jobs

use axum::{extract::State, Json};
use chrono::Utc;

use crate::{
    error::AppResult,
    services::{maintenance::SweepReport, reminders::ReminderReport},
    AppState,
};

/// Send today's due-soon and overdue notices
#[utoipa::path(
    post,
    path = "/maintenance/reminders",
    tag = "maintenance",
    responses(
        (status = 200, description = "Notices sent", body = ReminderReport)
    )
)]
pub async fn send_reminders(State(state): State<AppState>) -> AppResult<Json<ReminderReport>> {
    Ok(Json(state.services.maintenance.send_reminders(Utc::now()).await?))
}

/// Run every housekeeping step once
#[utoipa::path(
    post,
    path = "/maintenance/sweep",
    tag = "maintenance",
    responses(
        (status = 200, description = "Sweep result", body = SweepReport)
    )
)]
pub async fn run_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    Json(state.services.maintenance.run_sweep(Utc::now()).await)
}

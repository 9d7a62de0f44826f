//! API handlers for the campus library REST endpoints

pub mod books;
pub mod borrowings;
pub mod health;
pub mod maintenance;
pub mod openapi;
pub mod reservations;
pub mod subscriptions;
pub mod users;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/reservations", get(books::book_queue))
        .route("/books/:id/reservations/next", get(reservations::next_pending))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/status", put(users::set_user_status))
        .route("/users/:id/borrowings", get(users::user_borrowings))
        .route("/users/:id/reservations", get(users::user_reservations))
        .route("/users/:id/fines", get(users::user_fines))
        .route("/users/:id/fines/pay-all", post(borrowings::pay_all_fines))
        .route("/users/:id/payments", get(users::user_payments))
        .route("/users/:id/notifications", get(users::user_notifications))
        .route(
            "/users/:id/notifications/:notification_id/read",
            post(users::mark_notification_read),
        )
        .route("/users/:id/policy", get(subscriptions::get_policy))
        .route(
            "/users/:id/subscription",
            get(subscriptions::get_subscription)
                .post(subscriptions::purchase_subscription)
                .delete(subscriptions::cancel_subscription),
        )
        // Borrowings
        .route("/borrowings", post(borrowings::create_borrowing))
        .route("/borrowings/:id", get(borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(borrowings::return_borrowing))
        .route("/borrowings/:id/cancel", post(borrowings::cancel_borrowing))
        .route("/borrowings/:id/renew", post(borrowings::renew_borrowing))
        .route("/borrowings/:id/pay-fine", post(borrowings::pay_fine))
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route("/reservations/expire", post(reservations::expire_reservations))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel_reservation))
        // Subscription plans
        .route("/plans", get(subscriptions::list_plans).post(subscriptions::create_plan))
        // Housekeeping
        .route("/maintenance/reminders", post(maintenance::send_reminders))
        .route("/maintenance/sweep", post(maintenance::run_sweep))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

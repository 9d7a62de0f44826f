//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrowings, health, maintenance, reservations, subscriptions, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Library API",
        version = "1.0.0",
        description = "Borrowing, reservation and subscription REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::book_queue,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::set_user_status,
        users::user_borrowings,
        users::user_reservations,
        users::user_fines,
        users::user_payments,
        users::user_notifications,
        users::mark_notification_read,
        // Borrowings
        borrowings::create_borrowing,
        borrowings::get_borrowing,
        borrowings::return_borrowing,
        borrowings::cancel_borrowing,
        borrowings::renew_borrowing,
        borrowings::pay_fine,
        borrowings::pay_all_fines,
        // Reservations
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::next_pending,
        reservations::expire_reservations,
        // Subscriptions
        subscriptions::list_plans,
        subscriptions::create_plan,
        subscriptions::get_subscription,
        subscriptions::get_policy,
        subscriptions::purchase_subscription,
        subscriptions::cancel_subscription,
        // Maintenance
        maintenance::send_reminders,
        maintenance::run_sweep,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::BookQuery,
            books::BookPage,
            books::DeleteBookResponse,
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::CreateUser,
            crate::models::user::UserQuery,
            crate::models::user::SetActive,
            crate::models::user::FineSummary,
            crate::models::user::OutstandingFine,
            users::UserPage,
            // Borrowings
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::LoanPolicy,
            crate::models::borrowing::ReturnOutcome,
            crate::models::borrowing::RenewOutcome,
            borrowings::CreateBorrowingRequest,
            borrowings::PayFineRequest,
            borrowings::PayAllFinesRequest,
            // Payments
            crate::models::payment::Payment,
            crate::models::payment::PaymentStatus,
            crate::models::payment::PaymentPurpose,
            crate::models::payment::PaymentMethod,
            crate::models::payment::FineReceipt,
            crate::models::payment::FineSettlement,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::ExpiryReport,
            reservations::CreateReservationRequest,
            // Subscriptions
            crate::models::subscription::SubscriptionPlan,
            crate::models::subscription::CreatePlan,
            crate::models::subscription::Subscription,
            crate::models::subscription::SubscriptionStatus,
            crate::models::subscription::BillingPeriod,
            subscriptions::PurchaseRequest,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            // Maintenance
            crate::services::maintenance::SweepReport,
            crate::services::reminders::ReminderReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "Member management"),
        (name = "borrowings", description = "Loans, returns, renewals and fines"),
        (name = "reservations", description = "Reservation queues"),
        (name = "subscriptions", description = "Plans and memberships"),
        (name = "maintenance", description = "Housekeeping jobs")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

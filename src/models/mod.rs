//! Data models for the campus library

pub mod book;
pub mod borrowing;
pub mod notification;
pub mod payment;
pub mod reservation;
pub mod subscription;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use borrowing::{Borrowing, BorrowingStatus, LoanPolicy};
pub use notification::{LedgerEvent, NotificationKind};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use reservation::{Reservation, ReservationStatus};
pub use subscription::{Subscription, SubscriptionPlan};
pub use user::{Role, User};

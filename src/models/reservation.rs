//! Reservation (hold request) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Fulfilled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub created_at: DateTime<Utc>,
    /// Set when the hold is fulfilled; the holder must borrow before it
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: ReservationStatus,
    pub notified: bool,
    /// Set when the holder borrowed the book while the hold was open
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn check_cancellable(&self) -> Result<(), LedgerError> {
        match self.status {
            ReservationStatus::Pending => Ok(()),
            _ => Err(LedgerError::NotPending),
        }
    }

    /// An unclaimed fulfilled hold whose window has closed
    pub fn is_lapsed_hold(&self, as_of: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Fulfilled
            && self.claimed_at.is_none()
            && self.expiry_date.is_some_and(|expiry| expiry < as_of)
    }
}

/// Picks the reservation first in line: oldest `created_at`, then lowest id
pub fn next_in_line(reservations: &[Reservation]) -> Option<&Reservation> {
    reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .min_by_key(|r| (r.created_at, r.id))
}

/// Counts returned by a reservation expiry sweep
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ExpiryReport {
    pub expired_count: u64,
    /// Reservations promoted to `fulfilled` after an earlier hold lapsed
    pub fulfilled_handoffs: Vec<Reservation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn pending(id: i32, created: i64) -> Reservation {
        Reservation {
            id,
            user_id: id * 10,
            book_id: 7,
            created_at: at(created),
            expiry_date: None,
            status: ReservationStatus::Pending,
            notified: false,
            claimed_at: None,
        }
    }

    #[test]
    fn oldest_pending_goes_first() {
        let queue = vec![pending(3, 5), pending(1, 10), pending(2, 1)];
        assert_eq!(next_in_line(&queue).map(|r| r.id), Some(2));
    }

    #[test]
    fn equal_timestamps_fall_back_to_lowest_id() {
        let queue = vec![pending(9, 0), pending(4, 0), pending(6, 0)];
        assert_eq!(next_in_line(&queue).map(|r| r.id), Some(4));
    }

    #[test]
    fn only_pending_reservations_are_eligible() {
        let mut first = pending(1, 0);
        first.status = ReservationStatus::Cancelled;
        let queue = vec![first, pending(2, 3)];
        assert_eq!(next_in_line(&queue).map(|r| r.id), Some(2));
        assert!(next_in_line(&[]).is_none());
    }

    #[test]
    fn lapsed_hold_detection() {
        let mut r = pending(1, 0);
        r.status = ReservationStatus::Fulfilled;
        r.expiry_date = Some(at(60));
        assert!(!r.is_lapsed_hold(at(30)));
        assert!(r.is_lapsed_hold(at(61)));

        r.claimed_at = Some(at(20));
        assert!(!r.is_lapsed_hold(at(61)));
    }

    #[test]
    fn only_pending_can_be_cancelled() {
        let mut r = pending(1, 0);
        assert!(r.check_cancellable().is_ok());
        r.status = ReservationStatus::Fulfilled;
        assert_eq!(r.check_cancellable(), Err(LedgerError::NotPending));
    }
}

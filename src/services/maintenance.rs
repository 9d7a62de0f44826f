//! Periodic housekeeping: hold expiry, subscription expiry, reminders

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::error::AppResult;

use super::{
    reminders::{ReminderReport, ReminderService},
    reservations::ReservationService,
    subscriptions::SubscriptionService,
};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub expired_holds: u64,
    pub handed_off: usize,
    pub expired_subscriptions: u64,
    pub reminders: ReminderReport,
}

#[derive(Clone)]
pub struct MaintenanceService {
    reservations: ReservationService,
    subscriptions: SubscriptionService,
    reminders: ReminderService,
}

impl MaintenanceService {
    pub fn new(
        reservations: ReservationService,
        subscriptions: SubscriptionService,
        reminders: ReminderService,
    ) -> Self {
        Self {
            reservations,
            subscriptions,
            reminders,
        }
    }

    /// One pass of every housekeeping step. A failing step is logged and
    /// does not stop the others.
    pub async fn run_sweep(&self, as_of: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.reservations.expire_stale(as_of).await {
            Ok(expiry) => {
                report.expired_holds = expiry.expired_count;
                report.handed_off = expiry.fulfilled_handoffs.len();
            }
            Err(e) => tracing::error!(error = %e, "Reservation expiry failed"),
        }
        match self.subscriptions.expire_lapsed(as_of).await {
            Ok(expired) => report.expired_subscriptions = expired,
            Err(e) => tracing::error!(error = %e, "Subscription expiry failed"),
        }
        match self.reminders.send_due_reminders(as_of).await {
            Ok(reminders) => report.reminders = reminders,
            Err(e) => tracing::error!(error = %e, "Due reminders failed"),
        }

        tracing::debug!(?report, "Maintenance sweep finished");
        report
    }

    pub async fn send_reminders(&self, as_of: DateTime<Utc>) -> AppResult<ReminderReport> {
        self.reminders.send_due_reminders(as_of).await
    }

    /// Run the sweep on a fixed interval until the task is aborted
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.run_sweep(Utc::now()).await;
            }
        })
    }
}

//! Business logic services

pub mod catalog;
pub mod ledger;
pub mod maintenance;
pub mod notifier;
pub mod payment;
pub mod reminders;
pub mod reservations;
pub mod subscriptions;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

use self::{notifier::Notifier, payment::PaymentProcessor};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub ledger: ledger::LedgerService,
    pub reservations: reservations::ReservationService,
    pub subscriptions: subscriptions::SubscriptionService,
    pub maintenance: maintenance::MaintenanceService,
}

impl Services {
    /// Wire all services around one repository and the two collaborators
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Notifier,
    ) -> Self {
        let currency = config.payment.currency.clone();

        let subscriptions = subscriptions::SubscriptionService::new(
            repository.clone(),
            config.library.clone(),
            processor.clone(),
            notifier.clone(),
            currency.clone(),
        );
        let reservations = reservations::ReservationService::new(
            repository.clone(),
            notifier.clone(),
            config.library.reservation_hold_days,
        );
        let ledger = ledger::LedgerService::new(
            repository.clone(),
            subscriptions.clone(),
            reservations.clone(),
            processor,
            notifier.clone(),
            currency,
        );
        let reminders = reminders::ReminderService::new(
            repository.clone(),
            subscriptions.clone(),
            notifier,
            config.library.due_soon_days,
        );

        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            users: users::UsersService::new(repository, subscriptions.clone()),
            maintenance: maintenance::MaintenanceService::new(
                reservations.clone(),
                subscriptions.clone(),
                reminders,
            ),
            ledger,
            reservations,
            subscriptions,
        }
    }
}

//! Out-of-band delivery of ledger events: in-app records and email

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::notification::LedgerEvent,
    repository::Repository,
};

/// Receives events after the owning transaction has committed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: i32, event: &LedgerEvent) -> AppResult<()>;
}

/// Best-effort front for a sink: failures are logged and dropped
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn emit(&self, user_id: i32, event: LedgerEvent) {
        if let Err(e) = self.sink.notify(user_id, &event).await {
            tracing::warn!(
                user_id,
                kind = ?event.kind(),
                related_id = event.related_id(),
                error = %e,
                "Notification delivery failed"
            );
        }
    }
}

/// Stores each event as a row in `notifications`
#[derive(Clone)]
pub struct InAppNotifier {
    repository: Repository,
}

impl InAppNotifier {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl NotificationSink for InAppNotifier {
    async fn notify(&self, user_id: i32, event: &LedgerEvent) -> AppResult<()> {
        let payload = serde_json::to_value(event)
            .map_err(|e| AppError::Internal(format!("Failed to encode event: {}", e)))?;
        self.repository
            .notifications
            .insert(user_id, event.kind(), event.related_id(), &payload)
            .await?;
        Ok(())
    }
}

/// Subject and plain-text body for an event
pub fn render(event: &LedgerEvent) -> (String, String) {
    match event {
        LedgerEvent::LoanCreated { due_date, .. } => (
            "Book borrowed".to_string(),
            format!(
                "You borrowed a book. Please return it by {}.",
                due_date.format("%B %d, %Y")
            ),
        ),
        LedgerEvent::Returned { fine, .. } if fine.is_zero() => (
            "Book returned".to_string(),
            "Thank you for returning your book on time.".to_string(),
        ),
        LedgerEvent::Returned { fine, .. } => (
            "Book returned late".to_string(),
            format!("Your book was returned late. A fine of {} is due.", fine),
        ),
        LedgerEvent::Cancelled { .. } => (
            "Loan cancelled".to_string(),
            "Your loan was cancelled by the library. No fine is due for it.".to_string(),
        ),
        LedgerEvent::Renewed {
            new_due_date,
            renewed_count,
            ..
        } => (
            "Loan renewed".to_string(),
            format!(
                "Your loan was renewed (renewal {}). The new due date is {}.",
                renewed_count,
                new_due_date.format("%B %d, %Y")
            ),
        ),
        LedgerEvent::BookAvailable { expiry_date, .. } => (
            "Reserved book available".to_string(),
            format!(
                "A book you reserved is now available. It is held for you until {}.",
                expiry_date.format("%B %d, %Y %H:%M UTC")
            ),
        ),
        LedgerEvent::FinePaid {
            amount,
            transaction_id,
            ..
        } => (
            "Fine paid".to_string(),
            format!(
                "We received your payment of {} (transaction {}).",
                amount, transaction_id
            ),
        ),
        LedgerEvent::SubscriptionActivated { end_date, .. } => (
            "Subscription active".to_string(),
            format!(
                "Your subscription is active until {}.",
                end_date.format("%B %d, %Y")
            ),
        ),
        LedgerEvent::DueSoon { due_date, .. } => (
            "Book due soon".to_string(),
            format!(
                "Your book is due on {}. Please return or renew it on time.",
                due_date.format("%B %d, %Y")
            ),
        ),
        LedgerEvent::Overdue {
            days_overdue, fine, ..
        } => (
            "Book overdue".to_string(),
            format!(
                "Your book is {} day(s) overdue. Current fine: {}. Please return it immediately.",
                days_overdue, fine
            ),
        ),
    }
}

/// Sends events to the member's email address over SMTP
#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
    repository: Repository,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, repository: Repository) -> Self {
        Self { config, repository }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Campus Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;
        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!("<html><body><p>{}</p></body></html>", body)),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host).map_err(|e| {
                AppError::Internal(format!("Failed to create SMTP transport: {}", e))
            })?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationSink for EmailNotifier {
    async fn notify(&self, user_id: i32, event: &LedgerEvent) -> AppResult<()> {
        let user = self.repository.users.get_by_id(user_id).await?;
        let (subject, body) = render(event);
        let message = self.build_message(&user.email, &subject, &body)?;
        let mailer = self.mailer()?;

        // SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::debug!(user_id, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Delivers to every sink; reports the last failure after trying them all
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    async fn notify(&self, user_id: i32, event: &LedgerEvent) -> AppResult<()> {
        let mut result = Ok(());
        for sink in &self.sinks {
            if let Err(e) = sink.notify(user_id, event).await {
                result = Err(e);
            }
        }
        result
    }
}

/// In-app records always, email when enabled
pub fn notifier_from_config(config: &EmailConfig, repository: &Repository) -> Notifier {
    let mut fanout = FanoutNotifier::new().with(Arc::new(InAppNotifier::new(repository.clone())));
    if config.enabled {
        fanout = fanout.with(Arc::new(EmailNotifier::new(
            config.clone(),
            repository.clone(),
        )));
    }
    Notifier::new(Arc::new(fanout))
}

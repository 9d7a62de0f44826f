//! Payment processors: counter payments and a remote HTTP gateway

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{PaymentConfig, PaymentProvider},
    error::{AppError, AppResult, LedgerError},
    models::payment::{PaymentMethod, PaymentPurpose, PaymentStatus},
};

/// One charge, identified by the transaction id recorded before the call
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub transaction_id: String,
    pub user_id: i32,
    pub amount: Decimal,
    pub currency: String,
    pub purpose: PaymentPurpose,
    pub reference_id: i32,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub status: PaymentStatus,
    /// Identifier assigned by the gateway, if any
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
}

impl ChargeOutcome {
    pub fn success(gateway_reference: Option<String>) -> Self {
        Self {
            status: PaymentStatus::Success,
            gateway_reference,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Failed,
            gateway_reference: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Moves money for fines and subscriptions. Never called while a ledger
/// transaction is open.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeOutcome>;

    /// Refund a settled charge; `None` refunds the full amount
    async fn refund(&self, transaction_id: &str, amount: Option<Decimal>) -> AppResult<PaymentStatus>;
}

/// Charge and turn anything but `success` into a `ProcessorDeclined` refusal
pub async fn charge_or_decline(
    processor: &dyn PaymentProcessor,
    request: &ChargeRequest,
) -> AppResult<ChargeOutcome> {
    match processor.charge(request).await {
        Ok(outcome) if outcome.status == PaymentStatus::Success => Ok(outcome),
        Ok(outcome) => {
            let reason = outcome
                .failure_reason
                .unwrap_or_else(|| format!("payment {:?}", outcome.status).to_lowercase());
            tracing::warn!(
                transaction_id = %request.transaction_id,
                reason = %reason,
                "Payment declined"
            );
            Err(LedgerError::ProcessorDeclined(reason).into())
        }
        Err(e) => {
            tracing::warn!(
                transaction_id = %request.transaction_id,
                error = %e,
                "Payment processor failed"
            );
            Err(LedgerError::ProcessorDeclined(e.to_string()).into())
        }
    }
}

/// Cash, card or UPI taken at the desk by staff
#[derive(Debug, Clone, Default)]
pub struct ManualProcessor;

#[async_trait]
impl PaymentProcessor for ManualProcessor {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeOutcome> {
        Ok(ChargeOutcome::success(Some(format!(
            "{}-{}",
            request.method.as_str(),
            Uuid::new_v4().simple()
        ))))
    }

    async fn refund(&self, _transaction_id: &str, _amount: Option<Decimal>) -> AppResult<PaymentStatus> {
        Ok(PaymentStatus::Refunded)
    }
}

#[derive(Debug, Serialize)]
struct GatewayCharge<'a> {
    /// Minor currency units
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: GatewayNotes<'a>,
}

#[derive(Debug, Serialize)]
struct GatewayNotes<'a> {
    user_id: i32,
    purpose: PaymentPurpose,
    reference_id: i32,
    method: &'a str,
}

#[derive(Debug, Serialize)]
struct GatewayRefund<'a> {
    receipt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    id: Option<String>,
    status: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Remote payment gateway spoken to over JSON/HTTP
#[derive(Debug, Clone)]
pub struct GatewayProcessor {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl GatewayProcessor {
    pub fn new(config: &PaymentConfig) -> AppResult<Self> {
        let (Some(key_id), Some(key_secret)) = (&config.key_id, &config.key_secret) else {
            return Err(AppError::Internal(
                "payment gateway requires key_id and key_secret".to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            key_id: key_id.clone(),
            key_secret: key_secret.clone(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<GatewayReply, String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "gateway timed out".to_string()
                } else {
                    format!("gateway unreachable: {}", e)
                }
            })?;

        let status = response.status();
        let reply = response
            .json::<GatewayReply>()
            .await
            .map_err(|e| format!("gateway returned {}: {}", status, e))?;
        Ok(reply)
    }
}

/// Convert to the smallest currency unit (paise, cents)
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("amount {} out of range", amount)))
}

fn is_settled(status: &str) -> bool {
    matches!(status, "captured" | "paid" | "success" | "processed")
}

#[async_trait]
impl PaymentProcessor for GatewayProcessor {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeOutcome> {
        let body = GatewayCharge {
            amount: to_minor_units(request.amount)?,
            currency: &request.currency,
            receipt: &request.transaction_id,
            notes: GatewayNotes {
                user_id: request.user_id,
                purpose: request.purpose,
                reference_id: request.reference_id,
                method: request.method.as_str(),
            },
        };

        match self.post("/payments", &body).await {
            Ok(reply) if is_settled(&reply.status) => Ok(ChargeOutcome::success(reply.id)),
            Ok(reply) => Ok(ChargeOutcome::failed(
                reply.error_description.unwrap_or(reply.status),
            )),
            Err(reason) => Ok(ChargeOutcome::failed(reason)),
        }
    }

    async fn refund(&self, transaction_id: &str, amount: Option<Decimal>) -> AppResult<PaymentStatus> {
        let body = GatewayRefund {
            receipt: transaction_id,
            amount: amount.map(to_minor_units).transpose()?,
        };

        let reply = self
            .post("/refunds", &body)
            .await
            .map_err(AppError::Internal)?;
        if is_settled(&reply.status) {
            Ok(PaymentStatus::Refunded)
        } else {
            Err(AppError::Internal(format!(
                "refund of {} not accepted: {}",
                transaction_id, reply.status
            )))
        }
    }
}

/// Build the processor selected in configuration
pub fn processor_from_config(config: &PaymentConfig) -> AppResult<std::sync::Arc<dyn PaymentProcessor>> {
    Ok(match config.provider {
        PaymentProvider::Manual => std::sync::Arc::new(ManualProcessor),
        PaymentProvider::Gateway => std::sync::Arc::new(GatewayProcessor::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> ChargeRequest {
        ChargeRequest {
            transaction_id: "tx-1".into(),
            user_id: 3,
            amount: dec!(15),
            currency: "INR".into(),
            purpose: PaymentPurpose::Fine,
            reference_id: 11,
            method: PaymentMethod::Cash,
        }
    }

    #[test]
    fn minor_units_round_half_to_even() {
        assert_eq!(to_minor_units(dec!(15)).unwrap(), 1500);
        assert_eq!(to_minor_units(dec!(12.345)).unwrap(), 1234);
        assert_eq!(to_minor_units(dec!(0.5)).unwrap(), 50);
    }

    #[tokio::test]
    async fn manual_payments_always_settle() {
        let outcome = ManualProcessor.charge(&request()).await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Success);
        assert!(outcome.gateway_reference.unwrap().starts_with("cash-"));
    }

    #[tokio::test]
    async fn failed_outcome_becomes_declined() {
        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_charge()
            .times(1)
            .returning(|_| Ok(ChargeOutcome::failed("card expired")));

        let err = charge_or_decline(&processor, &request()).await.unwrap_err();
        assert_eq!(
            err.ledger(),
            Some(&LedgerError::ProcessorDeclined("card expired".into()))
        );
    }

    #[tokio::test]
    async fn processor_error_becomes_declined() {
        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_charge()
            .returning(|_| Err(AppError::Internal("timeout".into())));

        let err = charge_or_decline(&processor, &request()).await.unwrap_err();
        assert!(matches!(err.ledger(), Some(LedgerError::ProcessorDeclined(_))));
    }

    #[tokio::test]
    async fn pending_is_not_success() {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_charge().returning(|_| {
            Ok(ChargeOutcome {
                status: PaymentStatus::Pending,
                gateway_reference: Some("gw".into()),
                failure_reason: None,
            })
        });

        let err = charge_or_decline(&processor, &request()).await.unwrap_err();
        assert_eq!(
            err.ledger(),
            Some(&LedgerError::ProcessorDeclined("payment pending".into()))
        );
    }

    #[tokio::test]
    async fn gateway_needs_credentials() {
        let config = PaymentConfig {
            provider: PaymentProvider::Gateway,
            ..PaymentConfig::default()
        };
        assert!(GatewayProcessor::new(&config).is_err());
        assert!(processor_from_config(&PaymentConfig::default()).is_ok());
    }
}

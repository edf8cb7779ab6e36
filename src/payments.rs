// src/payments.rs
//
// Thin adapter over the external payment processor's REST API: checkout
// sessions for appointments and subscriptions, connect onboarding for
// professionals, and webhook verification. The appointment row stays the
// single source of truth for payment state; the processor only reaches
// it through the webhook route.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::SubscriptionType;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        ApiError::Upstream("CONNECTION_ERROR", e.to_string())
    }
}

/// Advance payments take a fixed 20% deposit; the rest is settled on
/// completion. Amounts are integer cents throughout.
pub fn advance_amount(price_cents: i32) -> i32 {
    price_cents / 5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Advance,
    Full,
}

impl CheckoutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutMode::Advance => "advance",
            CheckoutMode::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "advance" => Some(CheckoutMode::Advance),
            "full" => Some(CheckoutMode::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_ref: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct OnboardingLink {
    pub account_ref: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectAccountStatus {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Hosted checkout for an appointment; metadata carries the
    /// appointment id and mode so the webhook can route the result back.
    async fn create_appointment_checkout(
        &self,
        appointment_id: Uuid,
        amount_cents: i32,
        mode: CheckoutMode,
        customer_email: &str,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        tier: SubscriptionType,
        customer_email: &str,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn update_subscription(
        &self,
        subscription_ref: &str,
        tier: SubscriptionType,
    ) -> Result<(), ProviderError>;

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<(), ProviderError>;

    /// Onboarding link for a professional's connect account; creates the
    /// account on first call.
    async fn create_onboarding_link(
        &self,
        existing_account_ref: Option<&str>,
        user_id: Uuid,
    ) -> Result<OnboardingLink, ProviderError>;

    async fn account_status(&self, account_ref: &str)
        -> Result<ConnectAccountStatus, ProviderError>;

    /// Shared-secret check on the raw webhook payload.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool;
}

/* ============================================================
   Webhook payloads
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub invoice_url: Option<String>,
    pub payment_method: Option<String>,
}

/// Signature scheme: hex(sha256("{secret}.{payload}")), sent by the
/// processor in the X-Payment-Signature header.
pub fn webhook_digest(secret: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/* ============================================================
   HTTPS implementation
   ============================================================ */

pub struct HttpPaymentProvider {
    http: reqwest::Client,
    base: String,
    secret_key: String,
    webhook_secret: String,
    return_url: String,
}

impl HttpPaymentProvider {
    pub fn new(
        base: &str,
        secret_key: &str,
        webhook_secret: &str,
        return_url: &str,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
            return_url: return_url.to_string(),
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>().await.map_err(ProviderError::from)
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    url: String,
}

fn tier_price_key(tier: SubscriptionType) -> &'static str {
    match tier {
        SubscriptionType::Basic => "equibook_basic_monthly",
        SubscriptionType::Premium => "equibook_premium_monthly",
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_appointment_checkout(
        &self,
        appointment_id: Uuid,
        amount_cents: i32,
        mode: CheckoutMode,
        customer_email: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), customer_email.to_string()),
            ("success_url".to_string(), self.return_url.clone()),
            ("cancel_url".to_string(), self.return_url.clone()),
            ("line_items[0][price_data][currency]".to_string(), "eur".to_string()),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                "EquiBook appointment".to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "metadata[appointment_id]".to_string(),
                appointment_id.to_string(),
            ),
            ("metadata[checkout_mode]".to_string(), mode.as_str().to_string()),
        ];
        let s: SessionResponse = self.post_form("/v1/checkout/sessions", &form).await?;
        Ok(CheckoutSession {
            session_ref: s.id,
            url: s.url,
        })
    }

    async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        tier: SubscriptionType,
        customer_email: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer_email".to_string(), customer_email.to_string()),
            ("success_url".to_string(), self.return_url.clone()),
            ("cancel_url".to_string(), self.return_url.clone()),
            (
                "line_items[0][price]".to_string(),
                tier_price_key(tier).to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
            (
                "metadata[tier]".to_string(),
                match tier {
                    SubscriptionType::Basic => "basic".to_string(),
                    SubscriptionType::Premium => "premium".to_string(),
                },
            ),
        ];
        let s: SessionResponse = self.post_form("/v1/checkout/sessions", &form).await?;
        Ok(CheckoutSession {
            session_ref: s.id,
            url: s.url,
        })
    }

    async fn update_subscription(
        &self,
        subscription_ref: &str,
        tier: SubscriptionType,
    ) -> Result<(), ProviderError> {
        #[derive(Debug, Deserialize)]
        struct SubscriptionUpdateResponse {
            #[allow(dead_code)]
            id: String,
        }

        let form = vec![(
            "items[0][price]".to_string(),
            tier_price_key(tier).to_string(),
        )];
        let _: SubscriptionUpdateResponse = self
            .post_form(&format!("/v1/subscriptions/{subscription_ref}"), &form)
            .await?;
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<(), ProviderError> {
        let resp = self
            .http
            .delete(format!("{}/v1/subscriptions/{subscription_ref}", self.base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn create_onboarding_link(
        &self,
        existing_account_ref: Option<&str>,
        user_id: Uuid,
    ) -> Result<OnboardingLink, ProviderError> {
        let account_ref = match existing_account_ref {
            Some(r) => r.to_string(),
            None => {
                let form = vec![
                    ("type".to_string(), "express".to_string()),
                    ("metadata[user_id]".to_string(), user_id.to_string()),
                ];
                let a: AccountResponse = self.post_form("/v1/accounts", &form).await?;
                a.id
            }
        };

        let form = vec![
            ("account".to_string(), account_ref.clone()),
            ("refresh_url".to_string(), self.return_url.clone()),
            ("return_url".to_string(), self.return_url.clone()),
            ("type".to_string(), "account_onboarding".to_string()),
        ];
        let l: LinkResponse = self.post_form("/v1/account_links", &form).await?;

        Ok(OnboardingLink {
            account_ref,
            url: l.url,
        })
    }

    async fn account_status(
        &self,
        account_ref: &str,
    ) -> Result<ConnectAccountStatus, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/v1/accounts/{account_ref}", self.base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<ConnectAccountStatus>()
            .await
            .map_err(ProviderError::from)
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
        let expected = webhook_digest(&self.webhook_secret, payload);
        // hex compare; signatures are not secret material once received
        expected.eq_ignore_ascii_case(signature.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_amount_is_a_fifth() {
        assert_eq!(advance_amount(10000), 2000);
        assert_eq!(advance_amount(99), 19);
    }

    #[test]
    fn test_checkout_mode_roundtrip() {
        assert_eq!(CheckoutMode::parse("advance"), Some(CheckoutMode::Advance));
        assert_eq!(CheckoutMode::parse("full"), Some(CheckoutMode::Full));
        assert_eq!(CheckoutMode::parse("refund"), None);
        assert_eq!(CheckoutMode::Advance.as_str(), "advance");
    }

    #[test]
    fn test_webhook_digest_matches_known_value() {
        let d1 = webhook_digest("whsec_test", b"{\"type\":\"x\"}");
        let d2 = webhook_digest("whsec_test", b"{\"type\":\"x\"}");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        // tampering with the payload breaks the digest
        assert_ne!(d1, webhook_digest("whsec_test", b"{\"type\":\"y\"}"));
        assert_ne!(d1, webhook_digest("whsec_other", b"{\"type\":\"x\"}"));
    }

    #[test]
    fn test_webhook_event_parsing() {
        let payload = r#"{
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_123",
                    "metadata": {
                        "appointment_id": "7f0c6e0a-4a54-4f53-9a54-0a54e7a54f53",
                        "checkout_mode": "full"
                    },
                    "customer": "cus_9",
                    "subscription": null,
                    "invoice_url": "https://pay.example/inv/123",
                    "payment_method": "card"
                }
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object.id, "cs_test_123");
        assert_eq!(
            event.data.object.metadata.get("checkout_mode").map(String::as_str),
            Some("full")
        );
        assert_eq!(event.data.object.subscription, None);
    }

    #[test]
    fn test_webhook_event_parsing_without_metadata() {
        let payload = r#"{
            "type": "transfer.created",
            "data": { "object": { "id": "tr_1" } }
        }"#;
        let event: WebhookEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.event_type, "transfer.created");
        assert!(event.data.object.metadata.is_empty());
    }
}

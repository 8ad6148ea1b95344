//! NabooPay integration: hosted checkout creation, transaction lookup and
//! webhook authentication.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

use crate::config::NabooPayConfig;

pub const SIGNATURE_HEADER: &str = "x-signature";

const CREATE_PATH: &str = "/api/v1/transaction/create-transaction";
const FETCH_PATH: &str = "/api/v1/transaction/get-one-transaction";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected the request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Remote transaction state as reported by NabooPay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Done,
    PartPaid,
    Cancel,
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Paid | TransactionStatus::Done)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransactionStatus::Cancel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutProduct {
    pub name: String,
    pub category: String,
    pub amount: i64,
    pub quantity: i32,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_external_id: Uuid,
    pub products: Vec<CheckoutProduct>,
    pub success_url: String,
    pub error_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub reference: String,
    pub checkout_url: String,
    pub status: TransactionStatus,
}

/// Transaction state, either fetched from the API or pushed by the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentNotification {
    #[serde(rename = "order_id")]
    pub reference: String,
    #[serde(rename = "transaction_status")]
    pub status: TransactionStatus,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError>;
    async fn fetch_transaction(&self, reference: &str)
    -> Result<PaymentNotification, GatewayError>;
}

#[derive(Serialize)]
struct CreateTransactionBody<'a> {
    method_of_payment: &'a [String],
    products: &'a [CheckoutProduct],
    success_url: &'a str,
    error_url: &'a str,
    is_escrow: bool,
    is_merchant: bool,
}

#[derive(Deserialize)]
struct CreateTransactionResponse {
    order_id: String,
    checkout_url: Option<String>,
    transaction_status: Option<TransactionStatus>,
}

pub struct NabooPayClient {
    http: Client,
    base_url: String,
    api_key: String,
    payment_methods: Vec<String>,
}

impl NabooPayClient {
    pub fn new(config: &NabooPayConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("confhub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            payment_methods: config.payment_methods.clone(),
        })
    }

    async fn read_error(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        GatewayError::Rejected { status, body }
    }
}

#[async_trait]
impl PaymentGateway for NabooPayClient {
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let body = CreateTransactionBody {
            method_of_payment: &self.payment_methods,
            products: &req.products,
            success_url: &req.success_url,
            error_url: &req.error_url,
            is_escrow: false,
            is_merchant: false,
        };

        let response = self
            .http
            .put(format!("{}{}", self.base_url, CREATE_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let created: CreateTransactionResponse = response.json().await?;
        let checkout_url = created
            .checkout_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing checkout_url".to_string()))?;

        tracing::info!(
            order = %req.order_external_id,
            reference = %created.order_id,
            "naboopay transaction created"
        );

        Ok(CheckoutSession {
            reference: created.order_id,
            checkout_url,
            status: created
                .transaction_status
                .unwrap_or(TransactionStatus::Pending),
        })
    }

    async fn fetch_transaction(
        &self,
        reference: &str,
    ) -> Result<PaymentNotification, GatewayError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, FETCH_PATH))
            .bearer_auth(&self.api_key)
            .query(&[("order_id", reference)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        Ok(response.json().await?)
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks the `X-Signature` header against the raw request body. The
/// comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Int(v)) => Some(v),
        Some(Raw::Float(v)) if v.fract() == 0.0 => Some(v as i64),
        Some(Raw::Float(v)) => {
            return Err(serde::de::Error::custom(format!("fractional amount {v}")));
        }
        Some(Raw::Text(s)) => Some(s.trim().parse().map_err(serde::de::Error::custom)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"order_id":"abc","transaction_status":"paid"}"#;
        let signature = sign_payload("whsec", body);

        assert!(verify_signature("whsec", body, &signature));
        assert!(verify_signature("whsec", body, &signature.to_uppercase()));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", b"{}", &signature));
        assert!(!verify_signature("whsec", body, "not-hex"));
        assert!(!verify_signature("whsec", body, ""));
    }

    #[test_case("paid", TransactionStatus::Paid, true ; "paid")]
    #[test_case("done", TransactionStatus::Done, true ; "done")]
    #[test_case("pending", TransactionStatus::Pending, false ; "pending")]
    #[test_case("part_paid", TransactionStatus::PartPaid, false ; "part paid")]
    #[test_case("cancel", TransactionStatus::Cancel, false ; "cancel")]
    #[test_case("refunded", TransactionStatus::Unknown, false ; "unknown")]
    fn test_transaction_status(raw: &str, expected: TransactionStatus, settled: bool) {
        let status: TransactionStatus = serde_json::from_value(serde_json::json!(raw)).unwrap();
        assert_eq!(status, expected);
        assert_eq!(status.is_settled(), settled);
    }

    #[test]
    fn test_notification_amount_formats() {
        let n: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"r1","transaction_status":"paid","amount":25000}"#,
        )
        .unwrap();
        assert_eq!(n.amount, Some(25_000));

        let n: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"r1","transaction_status":"paid","amount":"25000"}"#,
        )
        .unwrap();
        assert_eq!(n.amount, Some(25_000));

        let n: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"r1","transaction_status":"done","amount":25000.0,"currency":"XOF"}"#,
        )
        .unwrap();
        assert_eq!(n.amount, Some(25_000));

        let n: PaymentNotification =
            serde_json::from_str(r#"{"order_id":"r1","transaction_status":"cancel"}"#).unwrap();
        assert_eq!(n.amount, None);
        assert!(n.status.is_cancelled());
    }
}

use super::gateway_trait::PaymentGateway;
use crate::config::phonepe::CHECKOUT_EXPIRE_AFTER_SECS;
use crate::config::PhonePeConfig;
use crate::core::{AppError, Paise, Result};
use crate::modules::gateways::models::{ChargeMetadata, ChargeSession, ChargeState, ChargeStatus};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

/// Refresh the token this many seconds before PhonePe says it expires
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// PhonePe Standard Checkout (v2) client
///
/// Authenticates with an OAuth client-credentials token, cached until shortly
/// before expiry. API Documentation: https://developer.phonepe.com/v1/reference/pay-api-1
pub struct PhonePeClient {
    client: Client,
    config: PhonePeConfig,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: i64,
}

impl AccessToken {
    fn is_fresh(&self, now: i64) -> bool {
        now + TOKEN_REFRESH_MARGIN_SECS < self.expires_at
    }
}

#[derive(Deserialize)]
struct OAuthResponse {
    access_token: String,
    expires_at: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayRequest<'a> {
    merchant_order_id: &'a str,
    amount: i64,
    expire_after: u64,
    meta_info: MetaInfo<'a>,
    payment_flow: PaymentFlow<'a>,
}

#[derive(Serialize)]
struct MetaInfo<'a> {
    udf1: &'a str,
    udf2: &'a str,
    udf3: &'a str,
    udf4: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentFlow<'a> {
    #[serde(rename = "type")]
    flow_type: &'static str,
    message: String,
    merchant_urls: MerchantUrls<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantUrls<'a> {
    redirect_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResponse {
    order_id: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    state: String,
    amount: i64,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentDetail {
    pub transaction_id: Option<String>,
    pub state: Option<String>,
}

/// Pick the transaction id of the settled attempt, if PhonePe reported one
pub(crate) fn settled_transaction_id(details: &[PaymentDetail]) -> Option<String> {
    details
        .iter()
        .rev()
        .find(|d| {
            d.state
                .as_deref()
                .map(|s| ChargeState::from_gateway(s) == ChargeState::Completed)
                .unwrap_or(false)
        })
        .and_then(|d| d.transaction_id.clone())
}

fn map_send_error(context: &str, e: reqwest::Error) -> AppError {
    if e.is_connect() || e.is_timeout() {
        AppError::GatewayUnreachable(format!(
            "PhonePe {} unavailable: {} ({})",
            context,
            if e.is_timeout() { "timeout" } else { "connection failed" },
            e
        ))
    } else {
        AppError::GatewayRequest(format!("PhonePe {} request failed: {}", context, e))
    }
}

impl PhonePeClient {
    /// Create a new PhonePe client with the configured request timeout
    pub fn new(config: PhonePeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    /// Return a cached token or fetch a new one
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let url = format!("{}/v1/oauth/token", self.config.auth_base_url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_version", self.config.client_version.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| match map_send_error("auth", e) {
                AppError::GatewayRequest(msg) => AppError::GatewayAuth(msg),
                other => other,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayAuth(format!(
                "PhonePe token request rejected ({}): {}",
                status, body
            )));
        }

        let token: OAuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::GatewayAuth(format!("Invalid PhonePe token response: {}", e)))?;

        tracing::debug!(expires_at = token.expires_at, "Fetched PhonePe access token");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: token.expires_at,
        })
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    fn authorization(token: &str) -> String {
        format!("O-Bearer {}", token)
    }
}

#[async_trait]
impl PaymentGateway for PhonePeClient {
    async fn initiate_charge(
        &self,
        amount: Paise,
        merchant_order_id: &str,
        metadata: &ChargeMetadata,
        redirect_url: &str,
    ) -> Result<ChargeSession> {
        if amount.value() <= 0 {
            return Err(AppError::validation("Charge amount must be positive"));
        }

        let token = self.access_token().await?;
        let url = format!("{}/checkout/v2/pay", self.config.api_base_url);

        let request = PayRequest {
            merchant_order_id,
            amount: amount.value(),
            expire_after: CHECKOUT_EXPIRE_AFTER_SECS,
            meta_info: MetaInfo {
                udf1: &metadata.user_id,
                udf2: &metadata.course_id,
                udf3: &metadata.plan_transaction_id,
                udf4: metadata.installment_number.to_string(),
            },
            payment_flow: PaymentFlow {
                flow_type: "PG_CHECKOUT",
                message: format!("EMI installment {}", metadata.installment_number),
                merchant_urls: MerchantUrls { redirect_url },
            },
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::authorization(&token))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error("pay", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_token().await;
            return Err(AppError::GatewayAuth(format!(
                "PhonePe rejected access token ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayRequest(format!(
                "PhonePe pay error {}: {}",
                status, body
            )));
        }

        let pay: PayResponse = response
            .json()
            .await
            .map_err(|e| AppError::GatewayRequest(format!("Invalid PhonePe pay response: {}", e)))?;

        let redirect_url = pay
            .redirect_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::GatewayRequest("PhonePe returned no redirect URL".to_string()))?;

        Ok(ChargeSession {
            gateway_order_id: pay.order_id.unwrap_or_else(|| merchant_order_id.to_string()),
            redirect_url,
        })
    }

    async fn check_status(&self, merchant_order_id: &str) -> Result<ChargeStatus> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/checkout/v2/order/{}/status",
            self.config.api_base_url, merchant_order_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("details", "false")])
            .header("Authorization", Self::authorization(&token))
            .send()
            .await
            .map_err(|e| map_send_error("order status", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_token().await;
            return Err(AppError::GatewayAuth(format!(
                "PhonePe rejected access token ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayRequest(format!(
                "PhonePe order status error {}: {}",
                status, body
            )));
        }

        let order: OrderStatusResponse = response.json().await.map_err(|e| {
            AppError::GatewayRequest(format!("Invalid PhonePe order status response: {}", e))
        })?;

        Ok(ChargeStatus {
            state: ChargeState::from_gateway(&order.state),
            amount: Paise::new(order.amount),
            gateway_transaction_id: settled_transaction_id(&order.payment_details),
        })
    }

    fn name(&self) -> &str {
        "phonepe"
    }
}

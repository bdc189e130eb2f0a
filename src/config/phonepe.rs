use crate::core::{AppError, Result};
use serde::Deserialize;

use super::{env_or, env_parse, env_required};

/// Checkout sessions stay open for this long at PhonePe
pub const CHECKOUT_EXPIRE_AFTER_SECS: u64 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonePeEnvironment {
    Sandbox,
    Production,
}

impl PhonePeEnvironment {
    pub fn auth_base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-preprod.phonepe.com/apis/pg-sandbox",
            Self::Production => "https://api.phonepe.com/apis/identity-manager",
        }
    }

    pub fn api_base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-preprod.phonepe.com/apis/pg-sandbox",
            Self::Production => "https://api.phonepe.com/apis/pg",
        }
    }
}

impl std::str::FromStr for PhonePeEnvironment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "uat" | "preprod" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(AppError::Configuration(format!(
                "Unknown PHONEPE_ENV '{}'",
                other
            ))),
        }
    }
}

/// PhonePe Standard Checkout credentials and endpoints
#[derive(Clone, Deserialize)]
pub struct PhonePeConfig {
    pub environment: PhonePeEnvironment,
    pub client_id: String,
    pub client_secret: String,
    pub client_version: String,
    pub auth_base_url: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
    /// Credentials configured on the PhonePe dashboard for S2S callbacks
    pub webhook_username: String,
    pub webhook_password: String,
}

// Secrets stay out of logs
impl std::fmt::Debug for PhonePeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonePeConfig")
            .field("environment", &self.environment)
            .field("client_id", &self.client_id)
            .field("client_version", &self.client_version)
            .field("auth_base_url", &self.auth_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl PhonePeConfig {
    pub fn from_env() -> Result<Self> {
        let environment: PhonePeEnvironment = env_or("PHONEPE_ENV", "sandbox").parse()?;

        Ok(Self {
            environment,
            client_id: env_required("PHONEPE_CLIENT_ID")?,
            client_secret: env_required("PHONEPE_CLIENT_SECRET")?,
            client_version: env_or("PHONEPE_CLIENT_VERSION", "1"),
            auth_base_url: env_or("PHONEPE_AUTH_BASE_URL", environment.auth_base_url()),
            api_base_url: env_or("PHONEPE_BASE_URL", environment.api_base_url()),
            timeout_secs: env_parse("PHONEPE_TIMEOUT_SECS", "5")?,
            webhook_username: env_or("PHONEPE_WEBHOOK_USERNAME", ""),
            webhook_password: env_or("PHONEPE_WEBHOOK_PASSWORD", ""),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(AppError::Configuration(
                "PhonePe client credentials are empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(AppError::Configuration(
                "PHONEPE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn webhook_enabled(&self) -> bool {
        !self.webhook_username.is_empty() && !self.webhook_password.is_empty()
    }
}

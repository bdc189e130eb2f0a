use crate::core::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod phonepe;
pub mod server;

pub use database::DatabaseConfig;
pub use phonepe::{PhonePeConfig, PhonePeEnvironment, CHECKOUT_EXPIRE_AFTER_SECS};
pub use server::ServerConfig;

use crate::modules::taxes::HomeState;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub phonepe: PhonePeConfig,
    pub tax: TaxConfig,
    pub emi: EmiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// Externally reachable base URL of this service, used for gateway callbacks
    pub public_base_url: String,
    pub payment_success_url: String,
    pub payment_failure_url: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxConfig {
    pub gst_rate: Decimal,
    /// Comma separated codes/names of the seller's home state
    pub home_state: String,
}

impl TaxConfig {
    pub fn home_state(&self) -> HomeState {
        HomeState::parse(&self.home_state)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmiConfig {
    /// Minutes an initiated payment attempt stays valid
    pub attempt_ttl_minutes: u32,
    pub expiry_sweep_interval_secs: u64,
}

impl EmiConfig {
    /// An attempt must not stay reusable after its gateway checkout closes
    pub fn validate(&self) -> Result<()> {
        if self.attempt_ttl_minutes == 0 {
            return Err(AppError::Configuration(
                "EMI_ATTEMPT_TTL_MINUTES must be greater than 0".to_string(),
            ));
        }

        if u64::from(self.attempt_ttl_minutes) * 60 > CHECKOUT_EXPIRE_AFTER_SECS {
            return Err(AppError::Configuration(format!(
                "EMI_ATTEMPT_TTL_MINUTES must not exceed the {} minute checkout lifetime",
                CHECKOUT_EXPIRE_AFTER_SECS / 60
            )));
        }

        if self.expiry_sweep_interval_secs == 0 {
            return Err(AppError::Configuration(
                "EMI_EXPIRY_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read an environment variable, falling back to `default`
pub(crate) fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a required environment variable
pub(crate) fn env_required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::Configuration(format!("{} not set", key)))
}

/// Read and parse an environment variable, falling back to `default`
pub(crate) fn env_parse<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| AppError::Configuration(format!("Invalid {}", key)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let public_base_url = env_or("PUBLIC_BASE_URL", "http://localhost:8080");

        let config = Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                log_level: env_or("LOG_LEVEL", "info"),
                payment_success_url: env_or(
                    "PAYMENT_SUCCESS_URL",
                    &format!("{}/payment/success", public_base_url),
                ),
                payment_failure_url: env_or(
                    "PAYMENT_FAILURE_URL",
                    &format!("{}/payment/failure", public_base_url),
                ),
                public_base_url,
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            phonepe: PhonePeConfig::from_env()?,
            tax: TaxConfig {
                gst_rate: env_parse("GST_RATE", "0.18")?,
                home_state: env_or("HOME_STATE", "UP,Uttar Pradesh"),
            },
            emi: EmiConfig {
                attempt_ttl_minutes: env_parse("EMI_ATTEMPT_TTL_MINUTES", "20")?,
                expiry_sweep_interval_secs: env_parse("EMI_EXPIRY_SWEEP_INTERVAL_SECS", "60")?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tax.gst_rate < Decimal::ZERO || self.tax.gst_rate > Decimal::ONE {
            return Err(AppError::Configuration(
                "GST_RATE must be between 0 and 1".to_string(),
            ));
        }

        if self.tax.home_state().is_empty() {
            return Err(AppError::Configuration("HOME_STATE is empty".to_string()));
        }

        self.emi.validate()?;

        for (name, url) in [
            ("PUBLIC_BASE_URL", &self.app.public_base_url),
            ("PAYMENT_SUCCESS_URL", &self.app.payment_success_url),
            ("PAYMENT_FAILURE_URL", &self.app.payment_failure_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| AppError::Configuration(format!("Invalid {}: {}", name, e)))?;
        }

        self.phonepe.validate()?;

        Ok(())
    }
}

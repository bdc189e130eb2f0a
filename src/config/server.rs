use crate::core::Result;
use serde::Deserialize;

use super::{env_or, env_parse};

/// Server configuration for HTTP server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            host,
            port,
            workers: cores * 2, // I/O-bound: database and gateway calls
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(env_or("SERVER_HOST", "0.0.0.0"), env_parse("SERVER_PORT", "8080")?);

        if let Ok(workers) = std::env::var("SERVER_WORKERS") {
            config.workers = workers.trim().parse().map_err(|_| {
                crate::core::AppError::Configuration("Invalid SERVER_WORKERS".to_string())
            })?;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
    pub ipfs_api_url: String,
    pub ipfs_gateway_url: String,
    pub ledger_endpoint: Option<String>,
    pub ledger_contract: Option<String>,
    pub ledger_api_key: Option<String>,
    pub ledger_poll_interval_ms: u64,
    pub ledger_confirmation_timeout_secs: u64,
    pub mail_relay_url: Option<String>,
    pub mail_relay_api_key: Option<String>,
    pub mail_from: String,
    pub embedded_worker: bool,
    pub worker_poll_interval_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "docshare".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "docshare-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .context("MAX_UPLOAD_BYTES must be an integer")?;
        let ipfs_api_url =
            env::var("IPFS_API_URL").unwrap_or_else(|_| "http://127.0.0.1:5001".to_string());
        let ipfs_gateway_url =
            env::var("IPFS_GATEWAY_URL").unwrap_or_else(|_| "https://ipfs.io".to_string());
        let ledger_endpoint = non_empty_var("LEDGER_ENDPOINT");
        let ledger_contract = non_empty_var("LEDGER_CONTRACT");
        let ledger_api_key = non_empty_var("LEDGER_API_KEY");
        let ledger_poll_interval_ms = env::var("LEDGER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("LEDGER_POLL_INTERVAL_MS must be an integer")?;
        let ledger_confirmation_timeout_secs = env::var("LEDGER_CONFIRMATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .context("LEDGER_CONFIRMATION_TIMEOUT_SECS must be an integer")?;
        let mail_relay_url = non_empty_var("MAIL_RELAY_URL");
        let mail_relay_api_key = non_empty_var("MAIL_RELAY_API_KEY");
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@docshare.local".to_string());
        let embedded_worker = env::var("EMBEDDED_WORKER")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        let worker_poll_interval_ms = env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .context("WORKER_POLL_INTERVAL_MS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            max_upload_bytes,
            ipfs_api_url,
            ipfs_gateway_url,
            ledger_endpoint,
            ledger_contract,
            ledger_api_key,
            ledger_poll_interval_ms,
            ledger_confirmation_timeout_secs,
            mail_relay_url,
            mail_relay_api_key,
            mail_from,
            embedded_worker,
            worker_poll_interval_ms,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    /// Anchoring needs both a gateway and a contract address.
    pub fn ledger_enabled(&self) -> bool {
        self.ledger_endpoint.is_some() && self.ledger_contract.is_some()
    }

    pub fn ledger_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_poll_interval_ms.max(1))
    }

    pub fn ledger_confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_confirmation_timeout_secs)
    }

    /// How long an idle notification worker sleeps between polls.
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms.max(10))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

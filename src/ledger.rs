use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::AppConfig;

pub const STORE_DOCUMENT_FUNCTION: &str = "storeDocument";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ledger rejected call with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("ledger transaction {0} failed")]
    Reverted(String),
    #[error("ledger transaction {0} was not confirmed in time")]
    Timeout(String),
    #[error("unexpected ledger transaction status '{0}'")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Records a document under its owner's identity number and waits for
    /// the transaction to be confirmed.
    async fn store_document(
        &self,
        aadhar: &str,
        file_name: &str,
        ipfs_path: &str,
    ) -> Result<LedgerReceipt, LedgerError>;
}

/// Talks to an HTTP contract gateway that exposes `storeDocument`.
pub struct HttpLedger {
    client: Client,
    endpoint: String,
    contract: String,
    api_key: Option<String>,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl HttpLedger {
    pub fn new(
        endpoint: impl Into<String>,
        contract: impl Into<String>,
        api_key: Option<String>,
        poll_interval: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            contract: contract.into(),
            api_key,
            poll_interval,
            confirmation_timeout,
        }
    }

    /// Returns `None` when anchoring is not configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        match (&config.ledger_endpoint, &config.ledger_contract) {
            (Some(endpoint), Some(contract)) => Some(Self::new(
                endpoint.clone(),
                contract.clone(),
                config.ledger_api_key.clone(),
                config.ledger_poll_interval(),
                config.ledger_confirmation_timeout(),
            )),
            _ => None,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn submit(
        &self,
        aadhar: &str,
        file_name: &str,
        ipfs_path: &str,
    ) -> Result<String, LedgerError> {
        let url = format!("{}/v1/contracts/{}/calls", self.endpoint, self.contract);
        let payload = json!({
            "function": STORE_DOCUMENT_FUNCTION,
            "args": [aadhar, file_name, ipfs_path],
        });

        debug!(%url, "submitting ledger call");
        let response = self
            .authorized(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected { status, body });
        }

        let submitted: SubmitResponse = response.json().await?;
        Ok(submitted.transaction_hash)
    }

    async fn await_confirmation(&self, hash: &str) -> Result<LedgerReceipt, LedgerError> {
        let url = format!("{}/v1/transactions/{}", self.endpoint, hash);
        loop {
            let response = self.authorized(self.client.get(&url)).send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(LedgerError::Rejected { status, body });
            }

            let tx: TransactionStatus = response.json().await?;
            match parse_state(&tx.status)? {
                TxState::Pending => sleep(self.poll_interval).await,
                TxState::Confirmed => {
                    return Ok(LedgerReceipt {
                        transaction_hash: hash.to_string(),
                        block_number: tx.block_number,
                    })
                }
                TxState::Failed => return Err(LedgerError::Reverted(hash.to_string())),
            }
        }
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn store_document(
        &self,
        aadhar: &str,
        file_name: &str,
        ipfs_path: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let hash = self.submit(aadhar, file_name, ipfs_path).await?;
        info!(transaction_hash = %hash, "ledger call submitted; awaiting confirmation");

        match timeout(self.confirmation_timeout, self.await_confirmation(&hash)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(transaction_hash = %hash, "ledger confirmation timed out");
                Err(LedgerError::Timeout(hash))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    status: String,
    #[serde(default)]
    block_number: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
enum TxState {
    Pending,
    Confirmed,
    Failed,
}

fn parse_state(raw: &str) -> Result<TxState, LedgerError> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" | "submitted" => Ok(TxState::Pending),
        "confirmed" | "success" => Ok(TxState::Confirmed),
        "failed" | "reverted" => Ok(TxState::Failed),
        _ => Err(LedgerError::UnknownStatus(raw.to_string())),
    }
}

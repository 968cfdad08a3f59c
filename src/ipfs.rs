use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

/// Name the uploaded bytes get inside their wrapping directory.
pub const UPLOADED_FILE_NAME: &str = "uploadedFile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub cid: String,
    pub path: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    async fn add(&self, bytes: Vec<u8>) -> Result<StoredContent>;
}

/// Pins content through the IPFS (Kubo) HTTP RPC API.
pub struct IpfsStore {
    client: Client,
    api_url: String,
    gateway_url: String,
}

impl IpfsStore {
    pub fn new(api_url: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            gateway_url: gateway_url.into(),
        }
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn add(&self, bytes: Vec<u8>) -> Result<StoredContent> {
        let url = format!("{}/api/v0/add", self.api_url.trim_end_matches('/'));
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(UPLOADED_FILE_NAME);
        let form = Form::new().part("file", part);

        debug!(%url, size, "pinning content to ipfs");
        let response = self
            .client
            .post(&url)
            .query(&[("pin", "true"), ("wrap-with-directory", "true")])
            .multipart(form)
            .send()
            .await
            .context("failed to reach ipfs api")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "ipfs add request failed");
            return Err(anyhow!("ipfs add failed with status {status}: {body}"));
        }

        let body = response
            .text()
            .await
            .context("failed to read ipfs add response")?;
        let cid = parse_add_response(&body)?;
        let path = gateway_path(&self.gateway_url, &cid);

        Ok(StoredContent { cid, path })
    }
}

#[derive(Debug, Deserialize)]
struct AddEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
}

/// Returns the CID of the wrapping directory from a newline-delimited add response.
fn parse_add_response(body: &str) -> Result<String> {
    let mut directory = None;
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let entry: AddEntry =
            serde_json::from_str(line).context("malformed ipfs add response line")?;
        if entry.name.is_empty() {
            directory = Some(entry.hash);
        }
    }

    directory.ok_or_else(|| anyhow!("ipfs add response did not include a wrapping directory"))
}

fn gateway_path(gateway_url: &str, directory_cid: &str) -> String {
    format!(
        "{}/ipfs/{}/{}",
        gateway_url.trim_end_matches('/'),
        directory_cid,
        UPLOADED_FILE_NAME
    )
}

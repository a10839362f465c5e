//! Publishing block roots to an external anchor service.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use minechain::Block;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const PLACEHOLDER_SIGNATURE: &str = "placeholder_signature";

const ANCHOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Records a block's Merkle root somewhere outside the ledger and returns
/// the external transaction signature.
#[async_trait]
pub trait RootAnchor: Send + Sync {
    async fn anchor(&self, block: &Block) -> Result<String>;
}

/// Anchor that publishes nothing
pub struct PlaceholderAnchor;

#[async_trait]
impl RootAnchor for PlaceholderAnchor {
    async fn anchor(&self, _block: &Block) -> Result<String> {
        Ok(PLACEHOLDER_SIGNATURE.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnchorRequest<'a> {
    block_height: u64,
    block_hash: &'a str,
    merkle_root: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnchorResponse {
    signature: String,
}

/// Posts the root to an HTTP anchor, signed with HMAC-SHA256 over
/// `"{timestamp}.{body}"`.
pub struct HttpAnchor {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl HttpAnchor {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(ANCHOR_TIMEOUT)
            .build()
            .context("building anchor http client")?;
        Ok(Self {
            client,
            url: url.into(),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl RootAnchor for HttpAnchor {
    async fn anchor(&self, block: &Block) -> Result<String> {
        let body = serde_json::to_string(&AnchorRequest {
            block_height: block.block_height,
            block_hash: &block.block_hash,
            merkle_root: &block.merkle_root,
        })?;
        let ts = Utc::now().timestamp();
        let signature = sign_payload(&self.secret, ts, &body)?;

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Timestamp", ts.to_string())
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await
            .context("anchor request failed")?;

        let status = resp.status();
        if !status.is_success() {
            warn!(height = block.block_height, status = %status, "anchor: rejected");
            bail!("anchor returned HTTP {status}");
        }

        let parsed: AnchorResponse = resp.json().await.context("anchor response")?;
        info!(height = block.block_height, "anchor: root published");
        Ok(parsed.signature)
    }
}

pub fn sign_payload(secret: &str, ts: i64, body: &str) -> Result<String> {
    let payload = format!("{ts}.{body}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| anyhow!("hmac key: {e}"))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hmac_of_timestamp_dot_body() {
        let sig = sign_payload("Jefe", 1700000000, r#"{"blockHeight":0}"#).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(br#"1700000000.{"blockHeight":0}"#);
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn signature_covers_timestamp_and_body() {
        let a = sign_payload("k", 1, "{}").unwrap();
        assert_ne!(a, sign_payload("k", 2, "{}").unwrap());
        assert_ne!(a, sign_payload("k", 1, "{ }").unwrap());
        assert_ne!(a, sign_payload("other", 1, "{}").unwrap());
        assert_eq!(a, sign_payload("k", 1, "{}").unwrap());
    }

    #[tokio::test]
    async fn placeholder_signs_everything() {
        let block = minechain::chain::link_block(None, "root", &[], 0).unwrap();
        let sig = PlaceholderAnchor.anchor(&block).await.unwrap();
        assert_eq!(sig, PLACEHOLDER_SIGNATURE);
    }
}
